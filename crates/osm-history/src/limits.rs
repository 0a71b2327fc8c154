//! Security limits for decoding and store defaults.
//!
//! The decoder handles bytes read back from disk, which may have been
//! written by a newer encoder or damaged in transit. All allocations it
//! makes are bounded by the limits here.

/// Maximum bytes in a varint (64-bit value, 7 bits per byte).
pub const MAX_VARINT_BYTES: usize = 10;

/// Maximum byte length of an editor handle.
///
/// Upstream display names are capped at 255 characters, which is at most
/// 1020 bytes of UTF-8.
pub const MAX_USER_LEN: usize = 1024;

/// Maximum byte length of a tag key or value.
pub const MAX_TAG_STRING_LEN: usize = 1024;

/// Maximum number of tag pairs in one record.
pub const MAX_TAGS_PER_RECORD: usize = 64 * 1024;

/// Maximum number of node references in one way record.
///
/// The upstream API caps ways at 2000 nodes, but historical versions
/// predate that rule; the limit here only bounds allocation.
pub const MAX_NODEREFS_PER_WAY: usize = 64 * 1024;

/// Maximum number of changeset entries in one per-node location map.
pub const MAX_LOCATION_ENTRIES: usize = 64 * 1024;

/// Default number of buffered records before a write batch commits.
pub const DEFAULT_BATCH_CAPACITY: usize = 2048;
