//! Orientation encoding for simplicial sub-entities.
//!
//! A sub-entity (edge, triangle) is created once, with a canonical vertex
//! ordering. Every cell that uses it sees the vertices in its own local order;
//! the arrow into that cell records the dihedral element mapping canonical to
//! local ordering:
//!
//! * `r >= 0` is a rotation: `local[i] = canonical[(i + r) % n]`
//! * `-(r + 1)` is a reflection: `local[i] = reversed[(i + r) % n]`
//!
//! Edges only have the identity (`0`) and the flip (`-1`).

use crate::topology::point::PointId;
use crate::topology::sieve::Sieve;

/// Orientation taking `canonical` to `local`, or `None` if the two are not
/// orderings of the same vertex set.
pub fn relative_orientation(canonical: &[PointId], local: &[PointId]) -> Option<i32> {
    let n = canonical.len();
    if n != local.len() || n == 0 {
        return None;
    }
    // C2: the rotation by one coincides with the flip; report it as the flip.
    let rotations = if n == 2 { 1 } else { n };
    for r in 0..rotations {
        if (0..n).all(|i| local[i] == canonical[(i + r) % n]) {
            return Some(r as i32);
        }
    }
    for r in 0..n {
        if (0..n).all(|i| local[i] == canonical[n - 1 - (i + r) % n]) {
            return Some(-(r as i32) - 1);
        }
    }
    None
}

/// Applies orientation `o` to `canonical`, producing the local ordering.
pub fn apply_orientation(canonical: &[PointId], o: i32) -> Vec<PointId> {
    let n = canonical.len();
    if n == 0 {
        return Vec::new();
    }
    if o >= 0 {
        let r = o as usize;
        (0..n).map(|i| canonical[(i + r) % n]).collect()
    } else {
        let r = (-o - 1) as usize;
        (0..n).map(|i| canonical[n - 1 - (i + r) % n]).collect()
    }
}

/// Vertices of `p` in the order `p` itself traverses them.
///
/// For a cell stored directly on its vertices this is the cone order. For
/// interpolated entities the first boundary entity (with its orientation
/// applied) fixes the leading vertices; the rest follow in cone order.
pub fn oriented_vertices<S: Sieve>(sieve: &S, p: PointId) -> Vec<PointId> {
    let cone: Vec<(PointId, i32)> = sieve.cone(p).collect();
    if cone.is_empty() {
        return vec![p];
    }
    if cone.iter().all(|&(q, _)| sieve.cone(q).next().is_none()) {
        return cone.into_iter().map(|(q, _)| q).collect();
    }
    let mut out: Vec<PointId> = Vec::new();
    for (q, o) in cone {
        let local = apply_orientation(&oriented_vertices(sieve, q), o);
        for v in local {
            if !out.contains(&v) {
                out.push(v);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pids(v: &[u64]) -> Vec<PointId> {
        v.iter().map(|&u| PointId::new(u).unwrap()).collect()
    }

    #[test]
    fn edge_orientations() {
        let c = pids(&[1, 2]);
        assert_eq!(relative_orientation(&c, &pids(&[1, 2])), Some(0));
        assert_eq!(relative_orientation(&c, &pids(&[2, 1])), Some(-1));
        assert_eq!(relative_orientation(&c, &pids(&[2, 3])), None);
    }

    #[test]
    fn triangle_group_roundtrips() {
        let c = pids(&[4, 5, 6]);
        let all = [
            pids(&[4, 5, 6]),
            pids(&[5, 6, 4]),
            pids(&[6, 4, 5]),
            pids(&[6, 5, 4]),
            pids(&[5, 4, 6]),
            pids(&[4, 6, 5]),
        ];
        let mut seen = Vec::new();
        for local in &all {
            let o = relative_orientation(&c, local).unwrap();
            assert_eq!(&apply_orientation(&c, o), local);
            seen.push(o);
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 6);
        assert_eq!(relative_orientation(&c, &pids(&[5, 6, 4])), Some(1));
        assert_eq!(relative_orientation(&c, &pids(&[6, 5, 4])), Some(-1));
    }
}
