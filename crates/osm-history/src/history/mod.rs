//! History reconstruction: version-ordered tag diffs for one entity.
//!
//! A scan walks versions `1..=target`, fetching each stored record and
//! emitting what changed relative to the previous stored version instead
//! of the full tag set. Versions with no record are counted and skipped
//! (sparse ingestion is normal); records that fail to decode are counted
//! and skipped too, so one damaged version never aborts an entity's
//! history.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{HistoryError, StoreError};
use crate::model::{EntityId, EntityKind, VersionRecord};
use crate::store::VersionStore;

type Tags = BTreeMap<String, String>;

/// One step of an entity's diff-compressed history.
///
/// The first entry of a sequence carries the full tag set in `new_tags`.
/// Later entries populate whichever splits are non-empty; a version whose
/// tags equal its predecessor's still appears, with all three maps empty.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDiffEntry {
    pub version: u32,
    pub timestamp: u64,
    pub changeset: u32,
    pub uid: u32,
    pub user: String,
    pub visible: bool,
    pub deleted: bool,
    /// Tags absent in the previous stored version.
    pub new_tags: Tags,
    /// Tags whose value changed: key -> (previous, current).
    pub modified_tags: BTreeMap<String, (String, String)>,
    /// Tags removed since the previous stored version: key -> prior value.
    pub deleted_tags: Tags,
}

/// Counters accumulated by a scan. Complete once the scan is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    /// Versions in range with no stored record.
    pub missing: u64,
    /// Versions whose stored record failed to decode.
    pub corrupt: u64,
}

/// An entity's reconstructed history with its scan counters.
#[derive(Debug, Clone, PartialEq)]
pub struct TagHistory {
    pub entries: Vec<HistoryDiffEntry>,
    pub stats: HistoryStats,
}

/// Splits `current` against `previous` into (new, modified, deleted).
///
/// One pass over each map; keys equal in both appear nowhere. `BTreeMap`
/// keeps the result order stable across runs.
pub fn diff_tags(
    previous: &Tags,
    current: &Tags,
) -> (Tags, BTreeMap<String, (String, String)>, Tags) {
    let mut new_tags = Tags::new();
    let mut modified_tags = BTreeMap::new();
    for (key, value) in current {
        match previous.get(key) {
            None => {
                new_tags.insert(key.clone(), value.clone());
            }
            Some(prior) if prior != value => {
                modified_tags.insert(key.clone(), (prior.clone(), value.clone()));
            }
            Some(_) => {}
        }
    }

    let mut deleted_tags = Tags::new();
    for (key, value) in previous {
        if !current.contains_key(key) {
            deleted_tags.insert(key.clone(), value.clone());
        }
    }

    (new_tags, modified_tags, deleted_tags)
}

/// Lazy scan over an entity's stored versions.
///
/// Yields `Ok` entries for stored, decodable versions; `Err` only for
/// storage-level failures. Dropping the scan early costs nothing beyond
/// the lookups already issued, and independent scans share no state.
pub struct HistoryScan<'a> {
    store: &'a VersionStore,
    kind: EntityKind,
    id: EntityId,
    next_version: u64,
    target: u32,
    previous_tags: Option<Tags>,
    stats: HistoryStats,
}

impl<'a> HistoryScan<'a> {
    /// Starts a scan over versions `1..=target`.
    pub fn new(
        store: &'a VersionStore,
        kind: EntityKind,
        id: EntityId,
        target: u32,
    ) -> Result<Self, HistoryError> {
        if target == 0 {
            return Err(HistoryError::InvalidVersion { version: target });
        }
        Ok(Self {
            store,
            kind,
            id,
            next_version: 1,
            target,
            previous_tags: None,
            stats: HistoryStats::default(),
        })
    }

    /// Counters accumulated so far; complete once the scan is exhausted.
    pub fn stats(&self) -> HistoryStats {
        self.stats
    }

    fn entry_for(&mut self, record: VersionRecord) -> HistoryDiffEntry {
        let (new_tags, modified_tags, deleted_tags) = match &self.previous_tags {
            None => (record.tags.clone(), BTreeMap::new(), Tags::new()),
            Some(previous) => diff_tags(previous, &record.tags),
        };
        self.previous_tags = Some(record.tags);

        HistoryDiffEntry {
            version: record.version,
            timestamp: record.timestamp,
            changeset: record.changeset,
            uid: record.uid,
            user: record.user,
            visible: record.visible,
            deleted: record.deleted,
            new_tags,
            modified_tags,
            deleted_tags,
        }
    }
}

impl Iterator for HistoryScan<'_> {
    type Item = Result<HistoryDiffEntry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_version <= u64::from(self.target) {
            let version = self.next_version as u32;
            self.next_version += 1;

            match self.store.get(self.kind, self.id, version) {
                Ok(Some(record)) => return Some(Ok(self.entry_for(record))),
                Ok(None) => self.stats.missing += 1,
                Err(StoreError::Decode(err)) => {
                    self.stats.corrupt += 1;
                    warn!(
                        kind = ?self.kind,
                        id = self.id,
                        version,
                        %err,
                        "skipping corrupt stored record"
                    );
                }
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

/// Eagerly reconstructs an entity's history up to and including `target`.
pub fn diff_history(
    store: &VersionStore,
    kind: EntityKind,
    id: EntityId,
    target: u32,
) -> Result<TagHistory, HistoryError> {
    let mut scan = HistoryScan::new(store, kind, id, target)?;
    let mut entries = Vec::new();
    for item in scan.by_ref() {
        entries.push(item?);
    }
    Ok(TagHistory {
        entries,
        stats: scan.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_record;
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    fn record(version: u32, tags: &[(&str, &str)]) -> VersionRecord {
        let mut record = VersionRecord::new(version);
        record.timestamp = 1_480_000_000 + u64::from(version);
        record.changeset = 1000 + version;
        record.uid = 21;
        record.user = "editor".to_string();
        for (key, value) in tags {
            record.tags.insert(key.to_string(), value.to_string());
        }
        record
    }

    fn store_with(dir: &TempDir, versions: &[VersionRecord]) -> VersionStore {
        let store =
            VersionStore::create(dir.path().join("index"), StoreOptions::default()).unwrap();
        for version in versions {
            store.put(EntityKind::Node, 500, version).unwrap();
        }
        store.flush_all().unwrap();
        store
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_diff_tags_three_way_split() {
        let previous = tags(&[("amenity", "pub"), ("name", "Old"), ("kept", "x")]);
        let current = tags(&[("amenity", "bar"), ("added", "y"), ("kept", "x")]);

        let (new_tags, modified_tags, deleted_tags) = diff_tags(&previous, &current);
        assert_eq!(new_tags, tags(&[("added", "y")]));
        assert_eq!(
            modified_tags,
            [(
                "amenity".to_string(),
                ("pub".to_string(), "bar".to_string())
            )]
            .into_iter()
            .collect::<BTreeMap<_, _>>()
        );
        assert_eq!(deleted_tags, tags(&[("name", "Old")]));
    }

    #[test]
    fn test_pub_rename_history() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[
                record(1, &[("amenity", "pub")]),
                record(2, &[("amenity", "pub"), ("name", "The Crown")]),
                record(3, &[("amenity", "bar"), ("name", "The Crown")]),
                record(4, &[("name", "The Crown")]),
            ],
        );

        let history = diff_history(&store, EntityKind::Node, 500, 4).unwrap();
        assert_eq!(history.stats, HistoryStats::default());
        assert_eq!(history.entries.len(), 4);

        let [v1, v2, v3, v4] = &history.entries[..] else {
            panic!("expected four entries");
        };

        assert_eq!(v1.version, 1);
        assert_eq!(v1.new_tags, tags(&[("amenity", "pub")]));
        assert!(v1.modified_tags.is_empty());
        assert!(v1.deleted_tags.is_empty());

        assert_eq!(v2.new_tags, tags(&[("name", "The Crown")]));
        assert!(v2.modified_tags.is_empty());
        assert!(v2.deleted_tags.is_empty());

        assert!(v3.new_tags.is_empty());
        assert_eq!(
            v3.modified_tags.get("amenity"),
            Some(&("pub".to_string(), "bar".to_string()))
        );
        assert!(v3.deleted_tags.is_empty());

        assert!(v4.new_tags.is_empty());
        assert!(v4.modified_tags.is_empty());
        assert_eq!(v4.deleted_tags, tags(&[("amenity", "bar")]));
    }

    #[test]
    fn test_sparse_versions_diff_across_the_gap() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[
                record(1, &[("amenity", "pub")]),
                record(3, &[("amenity", "bar"), ("name", "The Crown")]),
                record(4, &[("name", "The Crown")]),
            ],
        );

        let history = diff_history(&store, EntityKind::Node, 500, 4).unwrap();
        assert_eq!(history.stats.missing, 1);
        assert_eq!(history.stats.corrupt, 0);
        assert_eq!(history.entries.len(), 3);

        // v3 diffs directly against v1
        let v3 = &history.entries[1];
        assert_eq!(v3.version, 3);
        assert_eq!(v3.new_tags, tags(&[("name", "The Crown")]));
        assert_eq!(
            v3.modified_tags.get("amenity"),
            Some(&("pub".to_string(), "bar".to_string()))
        );
    }

    #[test]
    fn test_single_version_history() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[record(1, &[("amenity", "pub")])]);

        let history = diff_history(&store, EntityKind::Node, 500, 1).unwrap();
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].new_tags, tags(&[("amenity", "pub")]));
        assert!(history.entries[0].modified_tags.is_empty());
        assert!(history.entries[0].deleted_tags.is_empty());
    }

    #[test]
    fn test_nothing_stored_counts_every_version_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);

        let history = diff_history(&store, EntityKind::Node, 500, 6).unwrap();
        assert!(history.entries.is_empty());
        assert_eq!(history.stats.missing, 6);
    }

    #[test]
    fn test_zero_target_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);

        let result = diff_history(&store, EntityKind::Node, 500, 0);
        assert!(matches!(
            result,
            Err(HistoryError::InvalidVersion { version: 0 })
        ));
    }

    #[test]
    fn test_empty_tag_maps_are_ordinary() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[record(1, &[]), record(2, &[("name", "x")]), record(3, &[])],
        );

        let history = diff_history(&store, EntityKind::Node, 500, 3).unwrap();
        assert_eq!(history.entries.len(), 3);
        assert!(history.entries[0].new_tags.is_empty());
        assert_eq!(history.entries[1].new_tags, tags(&[("name", "x")]));
        assert_eq!(history.entries[2].deleted_tags, tags(&[("name", "x")]));
    }

    #[test]
    fn test_unchanged_tags_yield_an_empty_diff_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[
                record(1, &[("name", "same")]),
                record(2, &[("name", "same")]),
            ],
        );

        let history = diff_history(&store, EntityKind::Node, 500, 2).unwrap();
        let v2 = &history.entries[1];
        assert_eq!(v2.version, 2);
        assert!(v2.new_tags.is_empty());
        assert!(v2.modified_tags.is_empty());
        assert!(v2.deleted_tags.is_empty());
    }

    #[test]
    fn test_corrupt_record_is_counted_and_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[
                record(1, &[("amenity", "pub")]),
                record(3, &[("amenity", "pub"), ("name", "The Crown")]),
            ],
        );
        store
            .put_raw(EntityKind::Node, 500, 2, &[0xDE, 0xAD, 0xBE, 0xEF])
            .unwrap();

        let history = diff_history(&store, EntityKind::Node, 500, 3).unwrap();
        assert_eq!(history.stats.corrupt, 1);
        assert_eq!(history.stats.missing, 0);
        assert_eq!(history.entries.len(), 2);
        // v3 diffs against v1, the last good version
        assert_eq!(history.entries[1].new_tags, tags(&[("name", "The Crown")]));
    }

    #[test]
    fn test_scan_is_lazy_and_restartable() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[record(1, &[("a", "1")]), record(2, &[("a", "2")])],
        );

        let mut scan = HistoryScan::new(&store, EntityKind::Node, 500, 2).unwrap();
        let first = scan.next().unwrap().unwrap();
        assert_eq!(first.version, 1);
        drop(scan);

        // a fresh scan starts over from version 1
        let mut again = HistoryScan::new(&store, EntityKind::Node, 500, 2).unwrap();
        assert_eq!(again.next().unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_repeated_scans_are_byte_identical() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            &[
                record(1, &[("b", "2"), ("a", "1"), ("c", "3")]),
                record(2, &[("a", "9"), ("d", "4")]),
            ],
        );

        let first = diff_history(&store, EntityKind::Node, 500, 2).unwrap();
        let second = diff_history(&store, EntityKind::Node, 500, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    #[test]
    fn test_decode_error_outside_scan_still_fatal() {
        // the same corrupt bytes that a scan skips are an error on get
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);
        let bytes = {
            let mut good = encode_record(EntityKind::Node, &record(1, &[("k", "v")])).unwrap();
            good.truncate(good.len() - 1);
            good
        };
        store.put_raw(EntityKind::Node, 500, 1, &bytes).unwrap();

        assert!(matches!(
            store.get(EntityKind::Node, 500, 1),
            Err(StoreError::Decode(_))
        ));
        let history = diff_history(&store, EntityKind::Node, 500, 1).unwrap();
        assert!(history.entries.is_empty());
        assert_eq!(history.stats.corrupt, 1);
    }
}
