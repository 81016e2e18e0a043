//! VCF v4.3 parsing, serialization, and validation.

pub mod codec;
pub mod record;
pub mod writer;

pub use codec::{
    decode_special_chars, encode_special_chars, parse_header, parse_info_field, parse_record,
    serialize_info_field, serialize_record, validate_record, FieldDef, Validation, VcfHeader,
};
pub use record::{toggle_chr_prefix, FieldValue, InfoMap, VcfRecord};
pub use writer::VcfWriter;
