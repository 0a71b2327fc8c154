//! Schema-aware version store over RocksDB.
//!
//! Four partitions (column families): `nodes`, `ways`, `relations` hold
//! one encoded [`VersionRecord`] per `"{id}!{version}"` key; `locations`
//! holds one encoded per-node location map per `"{id}"` key.
//!
//! Two lifecycle modes. [`VersionStore::create`] is build mode: any prior
//! database at the path is destroyed, record puts are buffered into
//! per-partition write batches, and [`VersionStore::flush_all`] /
//! [`VersionStore::compact_all`] must run before the data is read
//! elsewhere. [`VersionStore::open`] is query mode: read-only, for any
//! number of concurrent readers.
//!
//! Build mode assumes a single writer thread. The location upsert is a
//! read-modify-write with no optimistic retry; concurrent writers on one
//! node id would race it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rocksdb::{
    BlockBasedOptions, BoundColumnFamily, DBWithThreadMode, MultiThreaded, Options, WriteBatch,
};
use tracing::{debug, info};

use crate::codec::key::{location_key, record_key};
use crate::codec::location::{decode_locations, encode_locations};
use crate::codec::record::{decode_record, encode_record};
use crate::error::StoreError;
use crate::limits::DEFAULT_BATCH_CAPACITY;
use crate::model::{EntityId, EntityKind, LocationEntry, LocationHistory, VersionRecord};

type Db = DBWithThreadMode<MultiThreaded>;

/// Partition holding per-node location maps.
pub const LOCATIONS_PARTITION: &str = "locations";

const PARTITIONS: [&str; 4] = ["nodes", "ways", "relations", LOCATIONS_PARTITION];

/// Build-mode configuration.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Number of buffered records at which a partition's write batch
    /// commits. Batches commit only between whole-record puts, so a
    /// reader never observes a partial record.
    pub batch_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
        }
    }
}

/// Snapshot of the store's running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    /// Location upserts that inserted or replaced an entry.
    pub locations_applied: u64,
    /// Location upserts discarded by the monotonic rule.
    pub locations_skipped: u64,
}

impl StoreCounters {
    /// Total stored version records across the three record partitions.
    pub fn records(&self) -> u64 {
        self.nodes + self.ways + self.relations
    }
}

#[derive(Default)]
struct Counters {
    nodes: AtomicU64,
    ways: AtomicU64,
    relations: AtomicU64,
    locations_applied: AtomicU64,
    locations_skipped: AtomicU64,
}

#[derive(Default)]
struct Pending {
    batch: WriteBatch,
    len: usize,
}

#[derive(Default)]
struct Batches {
    nodes: Pending,
    ways: Pending,
    relations: Pending,
}

impl Batches {
    fn for_kind(&mut self, kind: EntityKind) -> &mut Pending {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Way => &mut self.ways,
            EntityKind::Relation => &mut self.relations,
        }
    }
}

/// The versioned object store.
pub struct VersionStore {
    db: Db,
    read_only: bool,
    batch_capacity: usize,
    batches: Mutex<Batches>,
    counters: Counters,
}

impl VersionStore {
    /// Opens the store in build mode, destroying any prior contents at
    /// `path` first. The destruction is unconditional and irreversible;
    /// choosing build mode is the acknowledgement.
    pub fn create(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();

        Db::destroy(&Options::default(), path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.prepare_for_bulk_load();

        let mut table_opts = BlockBasedOptions::default();
        table_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&table_opts);

        let db = Db::open_cf(&db_opts, path, PARTITIONS).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "created version store");
        Ok(Self {
            db,
            read_only: false,
            batch_capacity: options.batch_capacity.max(1),
            batches: Mutex::new(Batches::default()),
            counters: Counters::default(),
        })
    }

    /// Opens an existing store in query mode (read-only). A missing
    /// database or partition is fatal; there is no partial-open fallback.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db_opts = Options::default();

        let db = Db::open_cf_for_read_only(&db_opts, path, PARTITIONS, false).map_err(
            |source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            },
        )?;

        info!(path = %path.display(), "opened version store read-only");
        Ok(Self {
            db,
            read_only: true,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            batches: Mutex::new(Batches::default()),
            counters: Counters::default(),
        })
    }

    /// Point lookup of one entity-version record.
    ///
    /// Absence is `Ok(None)`: missing intermediate versions are sparse
    /// data, not corruption. A record that fails to decode is an error
    /// here; the history scanner downgrades that to a counted skip.
    pub fn get(
        &self,
        kind: EntityKind,
        id: EntityId,
        version: u32,
    ) -> Result<Option<VersionRecord>, StoreError> {
        let cf = self.cf(kind.partition())?;
        let key = record_key(id, version);
        match self.db.get_pinned_cf(&cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(kind, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Buffers one record into its partition's write batch, committing
    /// the batch once it reaches the configured capacity.
    pub fn put(
        &self,
        kind: EntityKind,
        id: EntityId,
        record: &VersionRecord,
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let encoded = encode_record(kind, record)?;
        let key = record_key(id, record.version);
        let cf = self.cf(kind.partition())?;

        let mut batches = self.batches.lock();
        let pending = batches.for_kind(kind);
        pending.batch.put_cf(&cf, key.as_bytes(), &encoded);
        pending.len += 1;
        if pending.len >= self.batch_capacity {
            let batch = std::mem::take(&mut pending.batch);
            let records = pending.len;
            pending.len = 0;
            self.db.write(batch)?;
            debug!(partition = kind.partition(), records, "committed write batch");
        }
        drop(batches);

        self.counter_for(kind).fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// The location map stored for a node, if any.
    pub fn locations(&self, id: EntityId) -> Result<Option<LocationHistory>, StoreError> {
        let cf = self.cf(LOCATIONS_PARTITION)?;
        match self.db.get_pinned_cf(&cf, location_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(decode_locations(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Merges one entry into a node's location map and persists the map.
    ///
    /// Applies the monotonic rule: an entry already stored at the same
    /// changeset with an equal-or-higher version wins and the incoming
    /// entry is discarded (counted, not an error). Unbatched
    /// read-modify-write; single-writer build semantics.
    pub fn upsert_location(&self, id: EntityId, entry: LocationEntry) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let mut history = self.locations(id)?.unwrap_or_default();
        if !history.merge(entry) {
            self.counters.locations_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let encoded = encode_locations(&history)?;
        let cf = self.cf(LOCATIONS_PARTITION)?;
        self.db.put_cf(&cf, location_key(id).as_bytes(), &encoded)?;
        self.counters.locations_applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Commits outstanding write batches and flushes every partition.
    ///
    /// Must run before the database is opened in query mode, or queries
    /// may miss records still sitting in a batch or memtable.
    pub fn flush_all(&self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.commit_pending()?;
        for name in PARTITIONS {
            let cf = self.cf(name)?;
            let start = Instant::now();
            self.db.flush_cf(&cf)?;
            debug!(partition = name, elapsed = ?start.elapsed(), "flushed partition");
        }
        Ok(())
    }

    /// Runs a full-range compaction on every partition. Intended to run
    /// once at the end of a bulk build, after [`Self::flush_all`].
    pub fn compact_all(&self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        for name in PARTITIONS {
            let cf = self.cf(name)?;
            let start = Instant::now();
            self.db.compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
            debug!(partition = name, elapsed = ?start.elapsed(), "compacted partition");
        }
        Ok(())
    }

    /// Snapshot of the running totals. Readable while a build is in
    /// progress (progress reporting lives outside this crate).
    pub fn counters(&self) -> StoreCounters {
        StoreCounters {
            nodes: self.counters.nodes.load(Ordering::Relaxed),
            ways: self.counters.ways.load(Ordering::Relaxed),
            relations: self.counters.relations.load(Ordering::Relaxed),
            locations_applied: self.counters.locations_applied.load(Ordering::Relaxed),
            locations_skipped: self.counters.locations_skipped.load(Ordering::Relaxed),
        }
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or(StoreError::MissingPartition { name })
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn counter_for(&self, kind: EntityKind) -> &AtomicU64 {
        match kind {
            EntityKind::Node => &self.counters.nodes,
            EntityKind::Way => &self.counters.ways,
            EntityKind::Relation => &self.counters.relations,
        }
    }

    fn commit_pending(&self) -> Result<(), StoreError> {
        let mut batches = self.batches.lock();
        for kind in EntityKind::ALL {
            let pending = batches.for_kind(kind);
            if pending.len == 0 {
                continue;
            }
            let batch = std::mem::take(&mut pending.batch);
            let records = pending.len;
            pending.len = 0;
            self.db.write(batch)?;
            debug!(partition = kind.partition(), records, "committed write batch");
        }
        Ok(())
    }

    /// Plants raw bytes at a record key, bypassing the codec.
    #[cfg(test)]
    pub(crate) fn put_raw(
        &self,
        kind: EntityKind,
        id: EntityId,
        version: u32,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let cf = self.cf(kind.partition())?;
        self.db
            .put_cf(&cf, record_key(id, version).as_bytes(), bytes)?;
        Ok(())
    }
}
