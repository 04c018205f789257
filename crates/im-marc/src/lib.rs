//! MARC 21 bibliographic record decoding
//!
//! This crate decodes the two physical encodings of MARC 21 records into a
//! uniform field/subfield structure:
//! - Binary (ISO 2709), including MARC-8 and UTF-8 character schemes with
//!   recovery from double-encoded payloads
//! - MARCXML, including collection wrappers
//!
//! On top of the decoded record it offers two extraction modes: a cheap
//! index mode for blocking keys and a full edition mode for import.

mod binary;
mod edition;
mod error;
mod marc8;
mod record;
mod xml;

pub use binary::{
    declared_length, parse_binary, FIELD_TERMINATOR, RECORD_TERMINATOR, SUBFIELD_DELIMITER,
};
pub use edition::{
    normalize_isbn, normalize_lccn, read_edition, read_index_record, ImportRecord,
    ImportRecordBuilder, IndexRecord,
};
pub use error::MarcError;
pub use marc8::decode as marc8_decode;
pub use record::{Encoding, Field, FieldContent, Record, Subfield};
pub use xml::parse_xml;
