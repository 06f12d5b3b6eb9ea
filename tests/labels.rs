mod util;
use sieve_plex::topology::labels::{LABEL_UNSET, LabelSet, MARKER_LABEL};
use sieve_plex::topology::sieve::{Sieve, SieveQueryExt};
use util::*;

#[test]
fn boundary_edges_mark_their_vertices() {
    let f = strip(3, true);
    let mut labels = LabelSet::new();
    let boundary: Vec<_> = f
        .sieve
        .height_stratum(1)
        .unwrap()
        .into_iter()
        .filter(|&e| f.sieve.support_size(e) == 1)
        .collect();
    // 3 bottom, 3 top, 2 sides
    assert_eq!(boundary.len(), 8);
    for &e in &boundary {
        labels.set_value(MARKER_LABEL, e, 1);
    }
    labels.complete_label_value(&f.sieve, MARKER_LABEL, 1);
    // every vertex of the strip lies on the boundary
    for v in f.vertices().unwrap() {
        assert_eq!(labels.get_value(MARKER_LABEL, v), 1);
    }
    for c in f.cells().unwrap() {
        assert_eq!(labels.get_value(MARKER_LABEL, c), LABEL_UNSET);
    }
    assert_eq!(labels.points_with_value(MARKER_LABEL, 1).len(), 8 + 8);
}

#[test]
fn star_propagation_reaches_incident_cells() {
    let f = strip(2, true);
    let corner = f.vertices().unwrap()[0];
    let mut labels = LabelSet::new();
    labels.set_value("fixed", corner, 9);
    let written = labels.propagate_through_star(&f.sieve, "fixed", corner);
    assert_eq!(written, f.sieve.star(corner).len());
    let cells = f.cells().unwrap();
    let tagged: Vec<_> = cells
        .iter()
        .filter(|&&c| labels.get_value("fixed", c) == 9)
        .collect();
    // vertex 0 touches both triangles of the first quad
    assert_eq!(tagged.len(), 2);
}

#[test]
fn labels_are_independent_and_filterable() {
    let f = strip(1, false);
    let vs = f.vertices().unwrap();
    let mut labels = LabelSet::new();
    labels.set_value("a", vs[0], 1);
    labels.set_value("b", vs[0], 2);
    labels.set_value("b", vs[1], 3);
    assert_eq!(labels.names(), vec!["a", "b"]);
    assert_eq!(labels.stratum_values("b"), vec![2, 3]);
    let only_first = labels.filtered_to_points([vs[0]]);
    assert_eq!(only_first.len(), 2);
    assert_eq!(only_first.get_label("b", vs[1]), None);
    // unset source is a no-op
    assert_eq!(labels.propagate_through_closure(&f.sieve, "a", vs[2]), 0);
}
