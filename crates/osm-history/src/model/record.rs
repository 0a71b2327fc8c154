//! The stored snapshot of one entity version.

use std::collections::BTreeMap;

/// Entity identifier, unique within an [`super::EntityKind`], stable
/// across versions.
pub type EntityId = i64;

/// One immutable entity-version snapshot, the unit of storage.
///
/// The tag map is always the complete tag set of the version, never a
/// diff; diffs are derived by the history scanner. `BTreeMap` keeps
/// re-encoding deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    /// Seconds since epoch.
    pub timestamp: u64,
    /// Identifier of the editing transaction that produced this version.
    pub changeset: u32,
    pub version: u32,
    /// Editor identifier.
    pub uid: u32,
    /// Editor handle.
    pub user: String,
    pub visible: bool,
    pub deleted: bool,
    /// (longitude, latitude). Node kind only; absent on deleted versions.
    pub geometry: Option<(f64, f64)>,
    /// Ordered node references. Way kind only; absent on deleted versions.
    pub noderefs: Option<Vec<EntityId>>,
    /// Complete tag set of this version.
    pub tags: BTreeMap<String, String>,
}

impl VersionRecord {
    /// Creates a visible record at the given version with everything else
    /// empty.
    pub fn new(version: u32) -> Self {
        Self {
            timestamp: 0,
            changeset: 0,
            version,
            uid: 0,
            user: String::new(),
            visible: true,
            deleted: false,
            geometry: None,
            noderefs: None,
            tags: BTreeMap::new(),
        }
    }
}
