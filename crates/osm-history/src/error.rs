//! Error types for record encoding/decoding, the version store, and
//! history reconstruction.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::EntityKind;

/// Error during binary decoding of a stored record.
///
/// Any of these means the byte string is corrupt for its partition. The
/// history scanner recovers from them by counting and skipping; a direct
/// [`crate::store::VersionStore::get`] surfaces them to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("{field} value {value} exceeds the declared 32-bit width")]
    CounterOutOfRange { field: &'static str, value: u64 },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid bool value {value} in {field} (expected 0 or 1)")]
    InvalidBool { field: &'static str, value: u64 },

    #[error("invalid wire type: {wire_type}")]
    InvalidWireType { wire_type: u8 },

    #[error("{field} declared with wrong wire type {wire_type}")]
    WireTypeMismatch { field: &'static str, wire_type: u8 },

    #[error("{field} payload not fully consumed ({actual} of {declared} bytes)")]
    PayloadLengthMismatch {
        field: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error("reserved bits are non-zero in {context}")]
    ReservedBitsSet { context: &'static str },

    #[error("only one coordinate ({present}) present; expected both or neither")]
    UnpairedCoordinate { present: &'static str },

    #[error("{field} is not valid in a {kind:?} record")]
    UnexpectedField {
        field: &'static str,
        kind: EntityKind,
    },
}

/// Error during binary encoding of a record.
///
/// These are caller contract violations; nothing is written when one is
/// raised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("a {kind:?} record cannot carry {field}")]
    FieldNotAllowed {
        kind: EntityKind,
        field: &'static str,
    },

    #[error("{field} is not allowed on a deleted version")]
    FieldOnDeleted { field: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Error raised by the version store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening (or destroy-then-create of) the database failed. Fatal;
    /// there is no partial-open fallback.
    #[error("failed to open version store at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rocksdb::Error,
    },

    #[error("missing partition `{name}`")]
    MissingPartition { name: &'static str },

    #[error("store is open read-only")]
    ReadOnly,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("stored record is corrupt: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] rocksdb::Error),
}

/// Error raised at the history scan boundary.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Versions start at 1; a zero target is a caller contract violation.
    #[error("history requested up to version {version}; versions start at 1")]
    InvalidVersion { version: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
