//! Builders for MARC test records in both physical encodings.

use im_marc::{FIELD_TERMINATOR, RECORD_TERMINATOR, SUBFIELD_DELIMITER};
use imcat_core::ImportItem;

const LEADER_LEN: usize = 24;

/// Assemble a well-formed UTF-8 binary record from (tag, field bytes)
/// pairs.
pub fn binary_record(fields: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut body = Vec::new();
    for (tag, data) in fields {
        let mut field = data.clone();
        field.push(FIELD_TERMINATOR);
        directory
            .extend_from_slice(format!("{}{:04}{:05}", tag, field.len(), body.len()).as_bytes());
        body.extend_from_slice(&field);
    }
    directory.push(FIELD_TERMINATOR);
    body.push(RECORD_TERMINATOR);

    let base = LEADER_LEN + directory.len();
    let total = base + body.len();
    let mut leader = format!("{total:05}cam a").into_bytes();
    leader[9] = b'a';
    leader.extend_from_slice(format!("22{base:05}   4500").as_bytes());
    assert_eq!(leader.len(), LEADER_LEN);

    let mut record = leader;
    record.extend_from_slice(&directory);
    record.extend_from_slice(&body);
    record
}

/// Encode a data field with blank indicators.
pub fn data_field(subfields: &[(char, &str)]) -> Vec<u8> {
    let mut out = vec![b' ', b' '];
    for (code, value) in subfields {
        out.push(SUBFIELD_DELIMITER);
        out.push(*code as u8);
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Render a MARCXML record from (tag, subfields) pairs.
pub fn marcxml_record(fields: &[(&str, &[(char, &str)])]) -> String {
    let mut xml = String::from(
        "<record>\n  <leader>00000cam a2200000 a 4500</leader>\n",
    );
    for (tag, subfields) in fields {
        xml.push_str(&format!("  <datafield tag=\"{tag}\" ind1=\" \" ind2=\" \">\n"));
        for (code, value) in *subfields {
            xml.push_str(&format!("    <subfield code=\"{code}\">{value}</subfield>\n"));
        }
        xml.push_str("  </datafield>\n");
    }
    xml.push_str("</record>\n");
    xml
}

/// A typical book as an XML import item.
pub fn book_item(source_id: &str, title: &str, author: &str, isbn: &str) -> ImportItem {
    ImportItem {
        source_id: source_id.to_string(),
        xml: Some(marcxml_record(&[
            ("100", &[('a', author)]),
            ("245", &[('a', title)]),
            ("020", &[('a', isbn)]),
            ("260", &[('b', "Dover Publications,"), ('c', "1992.")]),
        ])),
        ..ImportItem::default()
    }
}
