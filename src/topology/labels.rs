//! Point label storage for topology metadata.
//!
//! Labels map `PointId` → integer tags, grouped by label name. Boundary
//! markers produced by the triangulation oracle live under the `"marker"`
//! label; materials or any other integer annotation can sit next to them.
//!
//! A tag of [`LABEL_UNSET`] (0) means "no tag": [`LabelSet::get_value`]
//! returns it for absent entries, matching the oracle's convention that a
//! zero marker is unmarked. Use [`LabelSet::get_label`] to tell an explicit
//! zero from a missing entry.

use crate::topology::point::PointId;
use crate::topology::sieve::{Sieve, SieveQueryExt};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Tag value reported for points without an entry.
pub const LABEL_UNSET: i32 = 0;

/// Name of the boundary-marker label written by mesh generation.
pub const MARKER_LABEL: &str = "marker";

/// Named integer labels for mesh points.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelSet {
    labels: HashMap<String, HashMap<PointId, i32>>,
}

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to `point` under label `name`, overwriting any
    /// previous tag.
    ///
    /// Returns the previous value, if any.
    pub fn set_value(&mut self, name: &str, point: PointId, value: i32) -> Option<i32> {
        self.labels
            .entry(name.to_string())
            .or_default()
            .insert(point, value)
    }

    /// Tag of `point` under `name`, or [`LABEL_UNSET`].
    pub fn get_value(&self, name: &str, point: PointId) -> i32 {
        self.get_label(name, point).unwrap_or(LABEL_UNSET)
    }

    /// Tag of `point` under `name`, if one was set.
    pub fn get_label(&self, name: &str, point: PointId) -> Option<i32> {
        self.labels
            .get(name)
            .and_then(|map| map.get(&point).copied())
    }

    /// Removes the tag of `point` under `name`.
    pub fn clear_value(&mut self, name: &str, point: PointId) -> Option<i32> {
        let map = self.labels.get_mut(name)?;
        let old = map.remove(&point);
        if map.is_empty() {
            self.labels.remove(name);
        }
        old
    }

    /// All points with `name == value`, ascending.
    pub fn points_with_value(&self, name: &str, value: i32) -> Vec<PointId> {
        let mut points: Vec<_> = self.labels.get(name).map_or_else(Vec::new, |map| {
            map.iter()
                .filter_map(|(&p, &v)| (v == value).then_some(p))
                .collect()
        });
        points.sort_unstable();
        points
    }

    /// Distinct values stored under `name`, ascending.
    pub fn stratum_values(&self, name: &str) -> Vec<i32> {
        let mut values: Vec<i32> = self
            .labels
            .get(name)
            .map_or_else(Vec::new, |map| map.values().copied().collect());
        values.sort_unstable();
        values.dedup();
        values
    }

    /// Label names, ascending.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.labels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Every `(name, point, value)` entry, sorted by name then point.
    pub fn iter(&self) -> impl Iterator<Item = (&str, PointId, i32)> + '_ {
        let ordered: BTreeMap<&str, BTreeMap<PointId, i32>> = self
            .labels
            .iter()
            .map(|(n, m)| (n.as_str(), m.iter().map(|(&p, &v)| (p, v)).collect()))
            .collect();
        ordered
            .into_iter()
            .flat_map(|(n, m)| m.into_iter().map(move |(p, v)| (n, p, v)))
    }

    /// Number of `(name, point)` entries.
    pub fn len(&self) -> usize {
        self.labels.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// A new label set holding only entries on `points`.
    pub fn filtered_to_points<I>(&self, points: I) -> Self
    where
        I: IntoIterator<Item = PointId>,
    {
        let keep: HashSet<PointId> = points.into_iter().collect();
        let mut out = LabelSet::new();
        for (name, values) in &self.labels {
            for (&point, &value) in values {
                if keep.contains(&point) {
                    out.set_value(name, point, value);
                }
            }
        }
        out
    }

    /// Copies the tag of `source` onto every point of its closure.
    ///
    /// No-op when `source` carries no tag. Returns the number of points written.
    pub fn propagate_through_closure<S: Sieve>(
        &mut self,
        sieve: &S,
        name: &str,
        source: PointId,
    ) -> usize {
        let Some(value) = self.get_label(name, source) else {
            return 0;
        };
        let targets = sieve.closure(source);
        for &p in &targets {
            self.set_value(name, p, value);
        }
        targets.len()
    }

    /// Copies the tag of `source` onto every point of its star.
    pub fn propagate_through_star<S: Sieve>(
        &mut self,
        sieve: &S,
        name: &str,
        source: PointId,
    ) -> usize {
        let Some(value) = self.get_label(name, source) else {
            return 0;
        };
        let targets = sieve.star(source);
        for &p in &targets {
            self.set_value(name, p, value);
        }
        targets.len()
    }

    /// Propagates every point tagged `name == value` through its closure.
    pub fn complete_label_value<S: Sieve>(&mut self, sieve: &S, name: &str, value: i32) -> usize {
        let seeds = self.points_with_value(name, value);
        let closure = sieve.closure_of(seeds);
        for &p in &closure {
            self.set_value(name, p, value);
        }
        closure.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::sieve::InMemorySieve;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn set_get_overwrite() {
        let mut l = LabelSet::new();
        assert_eq!(l.get_value(MARKER_LABEL, pid(1)), LABEL_UNSET);
        assert_eq!(l.set_value(MARKER_LABEL, pid(1), 3), None);
        assert_eq!(l.set_value(MARKER_LABEL, pid(1), 4), Some(3));
        assert_eq!(l.get_value(MARKER_LABEL, pid(1)), 4);
        assert_eq!(l.get_label("other", pid(1)), None);
        assert_eq!(l.clear_value(MARKER_LABEL, pid(1)), Some(4));
        assert!(l.is_empty());
    }

    #[test]
    fn strata_queries() {
        let mut l = LabelSet::new();
        l.set_value("m", pid(3), 1);
        l.set_value("m", pid(1), 1);
        l.set_value("m", pid(2), 5);
        l.set_value("a", pid(2), 7);
        assert_eq!(l.points_with_value("m", 1), vec![pid(1), pid(3)]);
        assert_eq!(l.stratum_values("m"), vec![1, 5]);
        assert_eq!(l.names(), vec!["a", "m"]);
        let entries: Vec<_> = l.iter().collect();
        assert_eq!(entries[0], ("a", pid(2), 7));
        assert_eq!(entries[1], ("m", pid(1), 1));
        assert_eq!(l.len(), 4);
        assert_eq!(l.filtered_to_points([pid(2)]).len(), 2);
    }

    #[test]
    fn closure_and_star_propagation() {
        // edge 4 = (1,2) inside triangle 5
        let s = InMemorySieve::from_arrows([
            (pid(1), pid(4), 0),
            (pid(2), pid(4), 0),
            (pid(4), pid(5), 0),
        ])
        .unwrap();
        let mut l = LabelSet::new();
        assert_eq!(l.propagate_through_closure(&s, "m", pid(4)), 0);
        l.set_value("m", pid(4), 2);
        assert_eq!(l.propagate_through_closure(&s, "m", pid(4)), 3);
        assert_eq!(l.get_value("m", pid(1)), 2);
        assert_eq!(l.get_value("m", pid(5)), LABEL_UNSET);
        l.set_value("n", pid(1), 9);
        l.propagate_through_star(&s, "n", pid(1));
        assert_eq!(l.points_with_value("n", 9), vec![pid(1), pid(4), pid(5)]);
    }
}
