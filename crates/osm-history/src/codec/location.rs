//! Wire format for per-node location maps.
//!
//! A map is a count-prefixed list of entries in ascending changeset
//! order. Each entry carries its scalars, then a flag byte gating the
//! optional point coordinates.

use crate::codec::primitives::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_LOCATION_ENTRIES, MAX_USER_LEN};
use crate::model::{LocationEntry, LocationHistory};

const FLAG_HAS_POINT: u8 = 0x01;
const LOCATION_RESERVED_MASK: u8 = 0xFE;

/// Encodes a node's location map for the locations partition.
pub fn encode_locations(history: &LocationHistory) -> Result<Vec<u8>, EncodeError> {
    if history.len() > MAX_LOCATION_ENTRIES {
        return Err(EncodeError::LengthExceedsLimit {
            field: "location entries",
            len: history.len(),
            max: MAX_LOCATION_ENTRIES,
        });
    }

    let mut writer = Writer::with_capacity(4 + 40 * history.len());
    writer.write_varint(history.len() as u64);

    for (changeset, entry) in history.iter() {
        if entry.user.len() > MAX_USER_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "user",
                len: entry.user.len(),
                max: MAX_USER_LEN,
            });
        }

        writer.write_varint(u64::from(*changeset));
        writer.write_varint(u64::from(entry.version));
        writer.write_varint(u64::from(entry.uid));
        writer.write_fixed64(entry.timestamp);
        writer.write_string(&entry.user);

        match entry.point {
            Some((lon, lat)) => {
                writer.write_byte(FLAG_HAS_POINT);
                writer.write_f64(lon);
                writer.write_f64(lat);
            }
            None => writer.write_byte(0),
        }
    }

    Ok(writer.into_bytes())
}

/// Decodes a node's location map.
pub fn decode_locations(data: &[u8]) -> Result<LocationHistory, DecodeError> {
    let mut reader = Reader::new(data);

    let count = reader.read_varint("location entry count")? as usize;
    if count > MAX_LOCATION_ENTRIES {
        return Err(DecodeError::LengthExceedsLimit {
            field: "location entries",
            len: count,
            max: MAX_LOCATION_ENTRIES,
        });
    }

    let mut history = LocationHistory::new();
    for _ in 0..count {
        let changeset = reader.read_varint_u32("changeset")?;
        let version = reader.read_varint_u32("version")?;
        let uid = reader.read_varint_u32("uid")?;
        let timestamp = reader.read_fixed64("timestamp")?;
        let user = reader.read_string(MAX_USER_LEN, "user")?;

        let flags = reader.read_byte("location flags")?;
        if flags & LOCATION_RESERVED_MASK != 0 {
            return Err(DecodeError::ReservedBitsSet {
                context: "location flags",
            });
        }
        let point = if flags & FLAG_HAS_POINT != 0 {
            let lon = reader.read_f64("longitude")?;
            let lat = reader.read_f64("latitude")?;
            Some((lon, lat))
        } else {
            None
        };

        history.entries.insert(
            changeset,
            LocationEntry {
                point,
                timestamp,
                changeset,
                version,
                uid,
                user,
            },
        );
    }

    Ok(history)
}
