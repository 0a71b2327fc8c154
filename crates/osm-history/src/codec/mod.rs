//! Binary encoding/decoding for stored records, location maps, and
//! lookup keys.

pub mod key;
pub mod location;
pub mod primitives;
pub mod record;

pub use key::{location_key, record_key};
pub use location::{decode_locations, encode_locations};
pub use primitives::{Reader, Writer, zigzag_decode, zigzag_encode};
pub use record::{decode_record, encode_record};
