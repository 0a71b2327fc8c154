//! Version record encoding/decoding.
//!
//! A record is a sequence of tagged fields. Each field starts with a
//! header varint `(field_id << 3) | wire_type`; wire types are varint,
//! fixed 8-byte, and length-delimited. Decoders skip unknown field ids by
//! wire type, so newer encoders can add fields without breaking old
//! readers.
//!
//! Tag pairs live inside one length-delimited field as a count-prefixed
//! list of (key, value) strings. Node references are a count-prefixed
//! list of zigzag varints.

use std::collections::BTreeMap;

use crate::codec::primitives::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{
    MAX_NODEREFS_PER_WAY, MAX_TAGS_PER_RECORD, MAX_TAG_STRING_LEN, MAX_USER_LEN,
};
use crate::model::{EntityKind, VersionRecord};

// Wire types
const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;

// Field ids
const FIELD_TIMESTAMP: u64 = 1;
const FIELD_CHANGESET: u64 = 2;
const FIELD_VERSION: u64 = 3;
const FIELD_UID: u64 = 4;
const FIELD_USER: u64 = 5;
const FIELD_VISIBLE: u64 = 6;
const FIELD_DELETED: u64 = 7;
const FIELD_LON: u64 = 8;
const FIELD_LAT: u64 = 9;
const FIELD_NODEREFS: u64 = 10;
const FIELD_TAGS: u64 = 11;

// =============================================================================
// ENCODING
// =============================================================================

/// Encodes one version record for storage in the partition of `kind`.
///
/// Fails without writing anything when the record carries a field its
/// kind cannot have (geometry outside Node, noderefs outside Way), when a
/// deleted version carries geometry or noderefs, or when a string or list
/// exceeds its limit.
pub fn encode_record(kind: EntityKind, record: &VersionRecord) -> Result<Vec<u8>, EncodeError> {
    check_kind_fields(kind, record)?;

    if record.user.len() > MAX_USER_LEN {
        return Err(EncodeError::LengthExceedsLimit {
            field: "user",
            len: record.user.len(),
            max: MAX_USER_LEN,
        });
    }
    if record.tags.len() > MAX_TAGS_PER_RECORD {
        return Err(EncodeError::LengthExceedsLimit {
            field: "tags",
            len: record.tags.len(),
            max: MAX_TAGS_PER_RECORD,
        });
    }
    for (key, value) in &record.tags {
        if key.len() > MAX_TAG_STRING_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "tag key",
                len: key.len(),
                max: MAX_TAG_STRING_LEN,
            });
        }
        if value.len() > MAX_TAG_STRING_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "tag value",
                len: value.len(),
                max: MAX_TAG_STRING_LEN,
            });
        }
    }
    if let Some(noderefs) = &record.noderefs {
        if noderefs.len() > MAX_NODEREFS_PER_WAY {
            return Err(EncodeError::LengthExceedsLimit {
                field: "noderefs",
                len: noderefs.len(),
                max: MAX_NODEREFS_PER_WAY,
            });
        }
    }

    let mut writer = Writer::with_capacity(64 + record.user.len() + 16 * record.tags.len());

    write_header(&mut writer, FIELD_TIMESTAMP, WIRE_FIXED64);
    writer.write_fixed64(record.timestamp);

    write_header(&mut writer, FIELD_CHANGESET, WIRE_VARINT);
    writer.write_varint(u64::from(record.changeset));

    write_header(&mut writer, FIELD_VERSION, WIRE_VARINT);
    writer.write_varint(u64::from(record.version));

    write_header(&mut writer, FIELD_UID, WIRE_VARINT);
    writer.write_varint(u64::from(record.uid));

    write_header(&mut writer, FIELD_USER, WIRE_LEN);
    writer.write_string(&record.user);

    // Both flags are always emitted so foreign readers never have to
    // guess an absent value.
    write_header(&mut writer, FIELD_VISIBLE, WIRE_VARINT);
    writer.write_varint(u64::from(record.visible));

    write_header(&mut writer, FIELD_DELETED, WIRE_VARINT);
    writer.write_varint(u64::from(record.deleted));

    if let Some((lon, lat)) = record.geometry {
        write_header(&mut writer, FIELD_LON, WIRE_FIXED64);
        writer.write_f64(lon);
        write_header(&mut writer, FIELD_LAT, WIRE_FIXED64);
        writer.write_f64(lat);
    }

    if let Some(noderefs) = &record.noderefs {
        let mut payload = Writer::with_capacity(noderefs.len() * 5 + 4);
        payload.write_varint(noderefs.len() as u64);
        for id in noderefs {
            payload.write_signed_varint(*id);
        }
        write_header(&mut writer, FIELD_NODEREFS, WIRE_LEN);
        writer.write_varint(payload.len() as u64);
        writer.write_bytes(payload.as_bytes());
    }

    if !record.tags.is_empty() {
        let mut payload = Writer::with_capacity(16 * record.tags.len());
        payload.write_varint(record.tags.len() as u64);
        for (key, value) in &record.tags {
            payload.write_string(key);
            payload.write_string(value);
        }
        write_header(&mut writer, FIELD_TAGS, WIRE_LEN);
        writer.write_varint(payload.len() as u64);
        writer.write_bytes(payload.as_bytes());
    }

    Ok(writer.into_bytes())
}

fn check_kind_fields(kind: EntityKind, record: &VersionRecord) -> Result<(), EncodeError> {
    if record.geometry.is_some() {
        if kind != EntityKind::Node {
            return Err(EncodeError::FieldNotAllowed {
                kind,
                field: "geometry",
            });
        }
        if record.deleted {
            return Err(EncodeError::FieldOnDeleted { field: "geometry" });
        }
    }
    if record.noderefs.is_some() {
        if kind != EntityKind::Way {
            return Err(EncodeError::FieldNotAllowed {
                kind,
                field: "noderefs",
            });
        }
        if record.deleted {
            return Err(EncodeError::FieldOnDeleted { field: "noderefs" });
        }
    }
    Ok(())
}

fn write_header(writer: &mut Writer, field: u64, wire: u8) {
    writer.write_varint((field << 3) | u64::from(wire));
}

// =============================================================================
// DECODING
// =============================================================================

/// Decodes a record from the partition of `kind`.
///
/// Optional fields absent on the wire stay absent in the result. A
/// geometry or noderefs field in a partition whose kind cannot carry it
/// is corruption, not forward compatibility, and is rejected.
pub fn decode_record(kind: EntityKind, data: &[u8]) -> Result<VersionRecord, DecodeError> {
    let mut reader = Reader::new(data);

    let mut record = VersionRecord::new(0);
    record.visible = false;
    let mut lon: Option<f64> = None;
    let mut lat: Option<f64> = None;

    while !reader.is_empty() {
        let header = reader.read_varint("field header")?;
        let field = header >> 3;
        let wire = (header & 0x7) as u8;

        match field {
            FIELD_TIMESTAMP => {
                expect_wire(wire, WIRE_FIXED64, "timestamp")?;
                record.timestamp = reader.read_fixed64("timestamp")?;
            }
            FIELD_CHANGESET => {
                expect_wire(wire, WIRE_VARINT, "changeset")?;
                record.changeset = reader.read_varint_u32("changeset")?;
            }
            FIELD_VERSION => {
                expect_wire(wire, WIRE_VARINT, "version")?;
                record.version = reader.read_varint_u32("version")?;
            }
            FIELD_UID => {
                expect_wire(wire, WIRE_VARINT, "uid")?;
                record.uid = reader.read_varint_u32("uid")?;
            }
            FIELD_USER => {
                expect_wire(wire, WIRE_LEN, "user")?;
                record.user = reader.read_string(MAX_USER_LEN, "user")?;
            }
            FIELD_VISIBLE => {
                expect_wire(wire, WIRE_VARINT, "visible")?;
                record.visible = read_bool(&mut reader, "visible")?;
            }
            FIELD_DELETED => {
                expect_wire(wire, WIRE_VARINT, "deleted")?;
                record.deleted = read_bool(&mut reader, "deleted")?;
            }
            FIELD_LON => {
                expect_wire(wire, WIRE_FIXED64, "longitude")?;
                if kind != EntityKind::Node {
                    return Err(DecodeError::UnexpectedField {
                        field: "geometry",
                        kind,
                    });
                }
                lon = Some(reader.read_f64("longitude")?);
            }
            FIELD_LAT => {
                expect_wire(wire, WIRE_FIXED64, "latitude")?;
                if kind != EntityKind::Node {
                    return Err(DecodeError::UnexpectedField {
                        field: "geometry",
                        kind,
                    });
                }
                lat = Some(reader.read_f64("latitude")?);
            }
            FIELD_NODEREFS => {
                expect_wire(wire, WIRE_LEN, "noderefs")?;
                if kind != EntityKind::Way {
                    return Err(DecodeError::UnexpectedField {
                        field: "noderefs",
                        kind,
                    });
                }
                record.noderefs = Some(decode_noderefs(&mut reader)?);
            }
            FIELD_TAGS => {
                expect_wire(wire, WIRE_LEN, "tags")?;
                record.tags = decode_tags(&mut reader)?;
            }
            _ => skip_field(&mut reader, wire)?,
        }
    }

    record.geometry = match (lon, lat) {
        (Some(lon), Some(lat)) => Some((lon, lat)),
        (None, None) => None,
        (Some(_), None) => {
            return Err(DecodeError::UnpairedCoordinate {
                present: "longitude",
            });
        }
        (None, Some(_)) => {
            return Err(DecodeError::UnpairedCoordinate {
                present: "latitude",
            });
        }
    };

    Ok(record)
}

fn expect_wire(wire: u8, expected: u8, field: &'static str) -> Result<(), DecodeError> {
    if wire != expected {
        return Err(DecodeError::WireTypeMismatch {
            field,
            wire_type: wire,
        });
    }
    Ok(())
}

fn read_bool(reader: &mut Reader<'_>, field: &'static str) -> Result<bool, DecodeError> {
    match reader.read_varint(field)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(DecodeError::InvalidBool { field, value }),
    }
}

fn decode_noderefs(reader: &mut Reader<'_>) -> Result<Vec<i64>, DecodeError> {
    let declared = reader.read_varint("noderefs")? as usize;
    let payload = reader.read_bytes(declared, "noderefs")?;
    let mut inner = Reader::new(payload);

    let count = inner.read_varint("noderef count")? as usize;
    if count > MAX_NODEREFS_PER_WAY {
        return Err(DecodeError::LengthExceedsLimit {
            field: "noderefs",
            len: count,
            max: MAX_NODEREFS_PER_WAY,
        });
    }
    let mut noderefs = Vec::with_capacity(count);
    for _ in 0..count {
        noderefs.push(inner.read_signed_varint("noderef")?);
    }
    if !inner.is_empty() {
        return Err(DecodeError::PayloadLengthMismatch {
            field: "noderefs",
            declared,
            actual: inner.position(),
        });
    }
    Ok(noderefs)
}

fn decode_tags(reader: &mut Reader<'_>) -> Result<BTreeMap<String, String>, DecodeError> {
    let declared = reader.read_varint("tags")? as usize;
    let payload = reader.read_bytes(declared, "tags")?;
    let mut inner = Reader::new(payload);

    let count = inner.read_varint("tag count")? as usize;
    if count > MAX_TAGS_PER_RECORD {
        return Err(DecodeError::LengthExceedsLimit {
            field: "tags",
            len: count,
            max: MAX_TAGS_PER_RECORD,
        });
    }
    let mut tags = BTreeMap::new();
    for _ in 0..count {
        let key = inner.read_string(MAX_TAG_STRING_LEN, "tag key")?;
        let value = inner.read_string(MAX_TAG_STRING_LEN, "tag value")?;
        tags.insert(key, value);
    }
    if !inner.is_empty() {
        return Err(DecodeError::PayloadLengthMismatch {
            field: "tags",
            declared,
            actual: inner.position(),
        });
    }
    Ok(tags)
}

fn skip_field(reader: &mut Reader<'_>, wire: u8) -> Result<(), DecodeError> {
    match wire {
        WIRE_VARINT => {
            reader.read_varint("skipped field")?;
        }
        WIRE_FIXED64 => {
            reader.read_bytes(8, "skipped field")?;
        }
        WIRE_LEN => {
            let len = reader.read_varint("skipped field")? as usize;
            reader.read_bytes(len, "skipped field")?;
        }
        wire_type => return Err(DecodeError::InvalidWireType { wire_type }),
    }
    Ok(())
}
