mod util;
use sieve_plex::algs::build_topology::{BuildOptions, ManifoldPolicy, build_topology};
use sieve_plex::mesh_error::MeshSieveError;
use sieve_plex::topology::orientation::{apply_orientation, oriented_vertices};
use sieve_plex::topology::point::PointId;
use sieve_plex::topology::sieve::{Sieve, SieveQueryExt};
use std::collections::BTreeSet;
use util::*;

fn interpolated() -> BuildOptions {
    BuildOptions {
        interpolate: true,
        ..Default::default()
    }
}

#[test]
fn two_tetrahedra_share_one_face() {
    // second tet sees the shared face (0,1,2) reversed
    let cells = [0, 1, 2, 3, 1, 0, 2, 4];
    let built = build_topology(&cells, 5, 4, &interpolated()).unwrap();
    let s = &built.sieve;
    assert_eq!(s.depth_stratum(0).unwrap().len(), 5);
    assert_eq!(s.depth_stratum(1).unwrap().len(), 9);
    assert_eq!(s.depth_stratum(2).unwrap().len(), 7);
    assert_eq!(s.depth_stratum(3).unwrap(), built.cells);

    let [a, b] = [built.cells[0], built.cells[1]];
    let shared = s.n_meet(&[a, b], 1);
    assert_eq!(shared.len(), 1);
    let face = shared[0];
    let oa = s.orientation(face, a).unwrap();
    let ob = s.orientation(face, b).unwrap();
    assert!(oa >= 0);
    assert!(ob < 0, "shared face must be reflected in the second cell");

    for (c, simplex) in built.cells.iter().zip(cells.chunks_exact(4)) {
        let want: BTreeSet<PointId> = simplex.iter().map(|&i| built.vertices[i]).collect();
        let got: BTreeSet<PointId> = s.n_cone(*c, 3).into_iter().collect();
        assert_eq!(got, want);
        assert_permutation(&oriented_vertices(s, *c), &want.into_iter().collect::<Vec<_>>());
    }
}

#[test]
fn orientations_reproduce_local_orderings() {
    let cells = [0, 1, 2, 2, 1, 3, 0, 2, 3];
    let built = build_topology(&cells, 4, 3, &interpolated()).unwrap();
    let s = &built.sieve;
    for (c, tri) in built.cells.iter().zip(cells.chunks_exact(3)) {
        for ((edge, o), (i, j)) in s.cone(*c).zip([(0, 1), (1, 2), (2, 0)]) {
            let local = vec![built.vertices[tri[i]], built.vertices[tri[j]]];
            assert_eq!(apply_orientation(&s.cone_points(edge), o), local);
        }
    }
}

#[test]
fn joins_identify_edges_and_faces() {
    let built = build_topology(&[0, 1, 2, 3], 4, 4, &interpolated()).unwrap();
    let s = &built.sieve;
    let v = &built.vertices;
    let e01 = s.join1(&[v[0], v[1]]);
    assert_eq!(e01.len(), 1);
    assert_eq!(s.unique_join(&[v[0], v[1]], 1).unwrap(), e01[0]);
    let e12 = s.unique_join(&[v[1], v[2]], 1).unwrap();
    let e20 = s.unique_join(&[v[2], v[0]], 1).unwrap();
    let face = s.unique_join(&[e01[0], e12, e20], 1).unwrap();
    assert_eq!(s.support_points(face), vec![built.cells[0]]);
    // every face contains a vertex
    assert_eq!(s.n_join(&[v[0]], 2).len(), 3);
    assert!(matches!(
        s.unique_join(&[v[0]], 1),
        Err(MeshSieveError::AmbiguousJoin { .. })
    ));
}

#[test]
fn fan_around_an_edge_is_non_manifold() {
    let cells = [0, 1, 2, 0, 1, 3, 0, 1, 4];
    for interpolate in [false, true] {
        let opts = BuildOptions {
            interpolate,
            manifold: ManifoldPolicy::Reject,
        };
        assert!(matches!(
            build_topology(&cells, 5, 3, &opts),
            Err(MeshSieveError::NonManifold { support: 3, .. })
        ));
        let flagged = build_topology(
            &cells,
            5,
            3,
            &BuildOptions {
                interpolate,
                manifold: ManifoldPolicy::Flag,
            },
        )
        .unwrap();
        assert_eq!(flagged.non_manifold.len(), 1);
        assert_eq!(flagged.non_manifold[0].cells.len(), 3);
        assert_eq!(flagged.non_manifold[0].entity.is_some(), interpolate);
    }
}

#[test]
fn handles_follow_vertices_then_cells() {
    let built = build_topology(&[0, 1, 2, 1, 3, 2], 4, 3, &interpolated()).unwrap();
    assert_eq!(built.vertices, (1..=4).map(pid).collect::<Vec<_>>());
    assert_eq!(built.cells, vec![pid(5), pid(6)]);
    let edges = built.sieve.depth_stratum(1).unwrap();
    assert_eq!(edges, (7..=11).map(pid).collect::<Vec<_>>());
}
