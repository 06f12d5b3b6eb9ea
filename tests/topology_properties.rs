mod util;
use proptest::prelude::*;
use sieve_plex::algs::build_topology::{BuildOptions, ManifoldPolicy, build_topology};
use sieve_plex::mesh_error::MeshSieveError;
use sieve_plex::topology::point::PointId;
use sieve_plex::topology::sieve::{InMemorySieve, Sieve, SieveQueryExt};
use std::collections::BTreeSet;
use util::*;

const NV: usize = 8;

/// Random triangle soups over `NV` vertices, no repeated corner.
fn triangles() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(
        (0..NV, 0..NV, 0..NV).prop_filter("distinct corners", |(a, b, c)| {
            a != b && b != c && a != c
        }),
        1..12,
    )
    .prop_map(|ts| ts.into_iter().flat_map(|(a, b, c)| [a, b, c]).collect())
}

fn build(cells: &[usize], interpolate: bool) -> InMemorySieve {
    build_topology(
        cells,
        NV,
        3,
        &BuildOptions {
            interpolate,
            manifold: ManifoldPolicy::Flag,
        },
    )
    .unwrap()
    .sieve
}

proptest! {
    #[test]
    fn depth_and_height_are_monotone_along_arrows(cells in triangles(), interp in any::<bool>()) {
        let s = build(&cells, interp);
        for a in s.arrows() {
            prop_assert!(s.depth(a.src).unwrap() < s.depth(a.dst).unwrap());
            prop_assert!(s.height(a.dst).unwrap() < s.height(a.src).unwrap());
        }
    }

    #[test]
    fn strata_partition_the_points(cells in triangles(), interp in any::<bool>()) {
        let s = build(&cells, interp);
        let max = s.max_depth().unwrap();
        let mut seen = BTreeSet::new();
        for k in 0..=max {
            let stratum = s.depth_stratum(k).unwrap();
            prop_assert!(stratum.windows(2).all(|w| w[0] < w[1]));
            for p in stratum {
                prop_assert!(seen.insert(p));
            }
        }
        prop_assert_eq!(seen.len(), s.num_points());
    }

    #[test]
    fn closure_contains_cone_and_star_contains_support(cells in triangles(), interp in any::<bool>()) {
        let s = build(&cells, interp);
        for p in s.points() {
            let closure: BTreeSet<PointId> = s.closure(p).into_iter().collect();
            prop_assert!(closure.contains(&p));
            prop_assert!(s.cone_points(p).iter().all(|c| closure.contains(c)));
            let star: BTreeSet<PointId> = s.star(p).into_iter().collect();
            prop_assert!(s.support_points(p).iter().all(|c| star.contains(c)));
        }
    }

    #[test]
    fn uninterpolated_cones_reproduce_the_input(cells in triangles()) {
        let built = build_topology(&cells, NV, 3, &BuildOptions {
            interpolate: false,
            manifold: ManifoldPolicy::Flag,
        }).unwrap();
        for (c, tri) in built.cells.iter().zip(cells.chunks_exact(3)) {
            let want: Vec<PointId> = tri.iter().map(|&i| built.vertices[i]).collect();
            assert_permutation(&built.sieve.cone_points(*c), &want);
        }
    }

    #[test]
    fn interpolated_cell_vertices_match_the_input(cells in triangles()) {
        let built = build_topology(&cells, NV, 3, &BuildOptions {
            interpolate: true,
            manifold: ManifoldPolicy::Flag,
        }).unwrap();
        for (c, tri) in built.cells.iter().zip(cells.chunks_exact(3)) {
            let got: BTreeSet<PointId> = built.sieve.n_cone(*c, 2).into_iter().collect();
            let want: BTreeSet<PointId> = tri.iter().map(|&i| built.vertices[i]).collect();
            prop_assert_eq!(got, want);
            // every local edge is the unique join of its two vertices
            for (i, j) in [(0, 1), (1, 2), (2, 0)] {
                let pair = [built.vertices[tri[i]], built.vertices[tri[j]]];
                let e = built.sieve.unique_join(&pair, 1).unwrap();
                prop_assert!(built.sieve.cone_points(*c).contains(&e));
            }
        }
    }
}

#[test]
fn isolated_point_closure_is_itself() {
    let mut s = InMemorySieve::new();
    s.add_point(pid(5), 0).unwrap();
    assert_eq!(s.closure(pid(5)), vec![pid(5)]);
    assert_eq!(s.star(pid(5)), vec![pid(5)]);
    assert_eq!(s.depth(pid(5)).unwrap(), 0);
    assert_eq!(s.height(pid(5)).unwrap(), 0);
}

#[test]
fn strata_follow_mutation() -> Result<(), Box<dyn std::error::Error>> {
    let mut s = sieve_from(&[(1, 2)]);
    assert_eq!(s.max_depth()?, 1);
    s.add_arrow(pid(2), pid(3), 0)?;
    assert_eq!(s.max_depth()?, 2);
    assert_eq!(s.height(pid(1))?, 2);
    assert_eq!(s.depth_stratum(2)?, vec![pid(3)]);
    Ok(())
}

#[test]
fn cycle_is_reported() {
    let s = sieve_from(&[(1, 2), (2, 3), (3, 1)]);
    assert!(matches!(s.strata(), Err(MeshSieveError::CycleDetected)));
}

#[test]
fn cone_keeps_insertion_order() {
    let s = sieve_from(&[(9, 10), (3, 10), (7, 10)]);
    assert_eq!(s.cone_points(pid(10)), vec![pid(9), pid(3), pid(7)]);
    assert!(s.cone_points(pid(3)).is_empty());
    assert!(s.support_points(pid(10)).is_empty());
}
