//! Binary (ISO 2709) record decoder
//!
//! Layout: 24-byte leader whose first 5 bytes are an ASCII decimal record
//! length, a directory of 12-byte (tag, length, offset) entries terminated
//! by the field terminator, then the variable fields themselves.

use nom::bytes::complete::take;
use nom::IResult;

use crate::error::MarcError;
use crate::marc8;
use crate::record::{Encoding, Field, FieldContent, Record, Subfield};

pub const FIELD_TERMINATOR: u8 = 0x1e;
pub const SUBFIELD_DELIMITER: u8 = 0x1f;
pub const RECORD_TERMINATOR: u8 = 0x1d;

const LEADER_LEN: usize = 24;
const DIR_ENTRY_LEN: usize = 12;

/// Decode a binary MARC record.
///
/// The declared length must equal the actual byte count. On mismatch the
/// buffer is re-encoded once as raw unicode (UTF-8 scalars ≤ U+00FF emitted
/// as single bytes, the inverse of a spurious UTF-8 decode upstream) before
/// the mismatch becomes an error.
pub fn parse_binary(data: &[u8]) -> Result<Record, MarcError> {
    let declared = declared_length(data)?;
    if declared == data.len() {
        return decode_record(data);
    }
    if let Some(reencoded) = reencode_raw_unicode(data) {
        if reencoded.len() == declared {
            return decode_record(&reencoded);
        }
    }
    Err(MarcError::LengthMismatch {
        declared,
        actual: data.len(),
    })
}

/// Declared record length from the first 5 leader bytes.
pub fn declared_length(data: &[u8]) -> Result<usize, MarcError> {
    let head = data.get(..5).ok_or(MarcError::BadLength)?;
    ascii_number(head).ok_or(MarcError::BadLength)
}

fn decode_record(data: &[u8]) -> Result<Record, MarcError> {
    if data.len() < LEADER_LEN {
        return Err(MarcError::BadLength);
    }
    let leader = String::from_utf8_lossy(&data[..LEADER_LEN]).into_owned();
    let encoding = if data[9] == b'a' {
        Encoding::Utf8
    } else {
        Encoding::Marc8
    };

    let base = ascii_number(&data[12..17]).ok_or(MarcError::BadDictionary)?;
    if base < LEADER_LEN + 1 || base > data.len() {
        return Err(MarcError::BadDictionary);
    }

    // Directory runs from the leader to the field terminator before base.
    let directory = &data[LEADER_LEN..base - 1];
    if data[base - 1] != FIELD_TERMINATOR || directory.len() % DIR_ENTRY_LEN != 0 {
        return Err(MarcError::BadDictionary);
    }

    let body = &data[base..];
    let mut fields = Vec::with_capacity(directory.len() / DIR_ENTRY_LEN);
    let mut remaining = directory;
    while !remaining.is_empty() {
        let (rest, entry) = directory_entry(remaining).map_err(|_| MarcError::BadDictionary)?;
        remaining = rest;
        fields.push(decode_field(&entry, body, encoding)?);
    }

    Ok(Record::new(leader, fields))
}

struct DirEntry {
    tag: String,
    len: usize,
    offset: usize,
}

fn directory_entry(input: &[u8]) -> IResult<&[u8], DirEntry> {
    let (input, tag) = take(3usize)(input)?;
    let (input, len) = take(4usize)(input)?;
    let (input, offset) = take(5usize)(input)?;
    let entry = DirEntry {
        tag: String::from_utf8_lossy(tag).into_owned(),
        len: ascii_number(len).unwrap_or(usize::MAX),
        offset: ascii_number(offset).unwrap_or(usize::MAX),
    };
    Ok((input, entry))
}

fn decode_field(entry: &DirEntry, body: &[u8], encoding: Encoding) -> Result<Field, MarcError> {
    if entry.tag.trim().is_empty() {
        return Err(MarcError::BlankTag);
    }
    let end = entry
        .offset
        .checked_add(entry.len)
        .filter(|end| *end <= body.len())
        .ok_or(MarcError::BadDictionary)?;
    let mut bytes = &body[entry.offset..end];
    if bytes.last() == Some(&FIELD_TERMINATOR) {
        bytes = &bytes[..bytes.len() - 1];
    }

    let content = if entry.tag.starts_with("00") {
        FieldContent::Control(decode_value(bytes, encoding))
    } else {
        if bytes.len() < 2 {
            return Err(MarcError::BadSubtag);
        }
        let indicators = (bytes[0] as char, bytes[1] as char);
        let mut subfields = Vec::new();
        for chunk in bytes[2..]
            .split(|b| *b == SUBFIELD_DELIMITER)
            .skip(1)
        {
            let (code, value) = chunk.split_first().ok_or(MarcError::BadSubtag)?;
            if !code.is_ascii_alphanumeric() {
                return Err(MarcError::BadSubtag);
            }
            subfields.push(Subfield {
                code: *code as char,
                value: decode_value(value, encoding),
            });
        }
        FieldContent::Data {
            indicators,
            subfields,
        }
    };

    Ok(Field {
        tag: entry.tag.clone(),
        content,
    })
}

fn decode_value(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Marc8 => marc8::decode(bytes),
    }
}

fn ascii_number(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Inverse of an accidental UTF-8 decode: every scalar ≤ U+00FF back to a
/// single byte. Not applicable when the buffer is not UTF-8 or contains
/// wider scalars.
fn reencode_raw_unicode(data: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(data).ok()?;
    let mut out = Vec::with_capacity(data.len());
    for c in text.chars() {
        let v = c as u32;
        if v > 0xff {
            return None;
        }
        out.push(v as u8);
    }
    Some(out)
}
