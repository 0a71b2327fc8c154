//! Per-node location maps with monotonic merge protection.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::model::VersionRecord;

/// One edit's contribution to a node's location map, keyed by the
/// changeset that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEntry {
    /// (longitude, latitude). Absent when the version is a deletion.
    pub point: Option<(f64, f64)>,
    /// Seconds since epoch.
    pub timestamp: u64,
    pub changeset: u32,
    pub version: u32,
    pub uid: u32,
    pub user: String,
}

impl LocationEntry {
    /// Derives a location entry from a node's version record.
    ///
    /// Deleted versions carry no geometry, so their entries have no point.
    pub fn from_record(record: &VersionRecord) -> Self {
        Self {
            point: record.geometry,
            timestamp: record.timestamp,
            changeset: record.changeset,
            version: record.version,
            uid: record.uid,
            user: record.user.clone(),
        }
    }
}

/// A node's location history: one entry per editing changeset, mutated in
/// place as versions arrive during a build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationHistory {
    pub(crate) entries: BTreeMap<u32, LocationEntry>,
}

impl LocationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry recorded for a changeset, if any.
    pub fn get(&self, changeset: u32) -> Option<&LocationEntry> {
        self.entries.get(&changeset)
    }

    /// Entries in ascending changeset order.
    pub fn iter(&self) -> btree_map::Iter<'_, u32, LocationEntry> {
        self.entries.iter()
    }

    /// Merges an incoming entry under the monotonic rule.
    ///
    /// An entry already stored at the same changeset with an
    /// equal-or-higher version wins: the incoming entry is discarded and
    /// this returns `false`. Otherwise the entry is inserted (or replaces
    /// the older one) and this returns `true`. Replaying the same entry
    /// is therefore a no-op.
    pub fn merge(&mut self, entry: LocationEntry) -> bool {
        if let Some(stored) = self.entries.get(&entry.changeset) {
            if stored.version >= entry.version {
                return false;
            }
        }
        self.entries.insert(entry.changeset, entry);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(changeset: u32, version: u32) -> LocationEntry {
        LocationEntry {
            point: Some((13.4, 52.5)),
            timestamp: 1_500_000_000,
            changeset,
            version,
            uid: 42,
            user: "mapper".to_string(),
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut history = LocationHistory::new();
        assert!(history.merge(entry(7, 2)));
        let once = history.clone();
        assert!(!history.merge(entry(7, 2)));
        assert_eq!(history, once);
    }

    #[test]
    fn test_merge_keeps_newer_stored_version() {
        let mut history = LocationHistory::new();
        assert!(history.merge(entry(7, 5)));
        assert!(!history.merge(entry(7, 3)));
        assert_eq!(history.get(7).unwrap().version, 5);

        assert!(history.merge(entry(7, 7)));
        assert_eq!(history.get(7).unwrap().version, 7);
    }

    #[test]
    fn test_merge_distinct_changesets_coexist() {
        let mut history = LocationHistory::new();
        assert!(history.merge(entry(7, 1)));
        assert!(history.merge(entry(9, 2)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_from_record_drops_point_for_deleted() {
        let mut record = VersionRecord::new(4);
        record.deleted = true;
        record.visible = false;
        record.changeset = 11;
        let loc = LocationEntry::from_record(&record);
        assert!(loc.point.is_none());
        assert_eq!(loc.changeset, 11);
        assert_eq!(loc.version, 4);
    }
}
