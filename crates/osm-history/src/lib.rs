//! Versioned store and diff-compressed tag history for OSM-style entities.
//!
//! This crate maintains a compact, queryable history of versioned
//! geographic entities (nodes, ways, relations). Each entity version is
//! encoded as a minimal self-describing binary record and stored in an
//! embedded RocksDB database, partitioned by kind. From there an
//! entity's edit history can be reconstructed as a sequence of tag
//! diffs (what each version added, modified, and deleted) instead of
//! full tag sets per version.
//!
//! # Overview
//!
//! - **Write path**: an external reader feeds entity versions to
//!   [`VersionStore::put`] during index construction; node versions
//!   additionally update a per-node location map via
//!   [`VersionStore::upsert_location`], keyed by changeset with
//!   monotonic overwrite protection.
//! - **Read path**: [`diff_history`] (or the lazy [`HistoryScan`])
//!   walks an entity's stored versions and emits
//!   [`HistoryDiffEntry`] values plus miss/corruption counters.
//!
//! # Quick Start
//!
//! ```rust
//! use osm_history::{diff_history, EntityKind, StoreOptions, VersionRecord, VersionStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let store = VersionStore::create(dir.path().join("index"), StoreOptions::default())?;
//!
//! let mut v1 = VersionRecord::new(1);
//! v1.tags.insert("amenity".to_string(), "pub".to_string());
//! v1.geometry = Some((-0.1276, 51.5072));
//! store.put(EntityKind::Node, 101, &v1)?;
//!
//! let mut v2 = VersionRecord::new(2);
//! v2.tags.insert("amenity".to_string(), "pub".to_string());
//! v2.tags.insert("name".to_string(), "The Crown".to_string());
//! v2.geometry = Some((-0.1276, 51.5072));
//! store.put(EntityKind::Node, 101, &v2)?;
//!
//! store.flush_all()?;
//!
//! let history = diff_history(&store, EntityKind::Node, 101, 2)?;
//! assert_eq!(history.entries.len(), 2);
//! assert_eq!(history.entries[1].new_tags["name"], "The Crown");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`model`]: Core data types (EntityKind, VersionRecord, location maps)
//! - [`codec`]: Binary record/location encoding and lookup keys
//! - [`store`]: RocksDB-backed versioned object store
//! - [`history`]: Tag-diff history reconstruction
//! - [`error`]: Error types
//! - [`limits`]: Security limits for decoding
//!
//! # Failure model
//!
//! Absent versions are data, not errors: sparse version sequences are
//! normal under filtered ingestion, and the history scanner counts and
//! skips them. Records that fail to decode are likewise counted and
//! skipped during a scan, so one damaged version never aborts an
//! entity's history; only store-open failures and encode-time contract
//! violations are fatal.
//!
//! # Security
//!
//! The decoder is designed to safely handle damaged input:
//! - All allocations are bounded by limits
//! - Varints are limited to prevent overflow
//! - Unknown field ids are skipped, so newer encoders stay readable

pub mod codec;
pub mod error;
pub mod history;
pub mod limits;
pub mod model;
pub mod store;

// Re-export commonly used types at crate root
pub use codec::{decode_locations, decode_record, encode_locations, encode_record, location_key, record_key};
pub use error::{DecodeError, EncodeError, HistoryError, StoreError};
pub use history::{
    diff_history, diff_tags, HistoryDiffEntry, HistoryScan, HistoryStats, TagHistory,
};
pub use model::{EntityId, EntityKind, LocationEntry, LocationHistory, VersionRecord};
pub use store::{StoreCounters, StoreOptions, VersionStore, LOCATIONS_PARTITION};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
