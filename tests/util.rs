#![allow(dead_code)]
use sieve_plex::{
    algs::build_topology::{BuildOptions, build_coordinates, build_topology},
    algs::communicator::RayonComm,
    fragment::MeshFragment,
    topology::point::PointId,
    topology::sieve::InMemorySieve,
};

pub fn pid(u: u64) -> PointId {
    PointId::new(u).unwrap()
}

/// Build a sieve from arrows (u -> v), orientation 0.
pub fn sieve_from(arrows: &[(u64, u64)]) -> InMemorySieve {
    let mut s = InMemorySieve::new();
    for &(u, v) in arrows {
        s.add_arrow(pid(u), pid(v), 0).unwrap();
    }
    s
}

/// Runs `f` on every rank of an `n`-rank in-process world and returns the
/// results by rank.
pub fn on_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&RayonComm) -> T + Sync,
{
    let world = RayonComm::world(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|c| s.spawn(|| f(c))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Triangulated strip of `2 * quads` triangles over a `(quads + 1) x 2` grid
/// of unit squares, with coordinates.
///
/// Bottom-row vertices are `0..=quads`, top-row `quads+1..`.
pub fn strip(quads: usize, interpolate: bool) -> MeshFragment {
    let top = quads + 1;
    let mut cells = Vec::new();
    for i in 0..quads {
        let (a, b, c, d) = (i, i + 1, top + i + 1, top + i);
        cells.extend([a, b, c]);
        cells.extend([a, c, d]);
    }
    let nv = 2 * top;
    let built = build_topology(
        &cells,
        nv,
        3,
        &BuildOptions {
            interpolate,
            ..Default::default()
        },
    )
    .unwrap();
    let mut xy = Vec::with_capacity(2 * nv);
    for row in 0..2 {
        for i in 0..top {
            xy.extend([i as f64, row as f64]);
        }
    }
    let coords = build_coordinates(&built.vertices, 2, &xy).unwrap();
    let mut f = MeshFragment::new(built.sieve, 2, 2);
    f.set_coordinates(coords);
    f
}

/// Sorted global ids of the vertices in the closure of `p`.
pub fn vertex_set(f: &MeshFragment, p: PointId) -> Vec<u64> {
    use sieve_plex::topology::sieve::SieveQueryExt;
    let mut v: Vec<u64> = f
        .sieve
        .closure(p)
        .into_iter()
        .filter(|&q| f.sieve.depth(q).unwrap() == 0)
        .map(|q| f.global_id(q))
        .collect();
    v.sort_unstable();
    v
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
