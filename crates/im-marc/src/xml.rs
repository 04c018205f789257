//! MARCXML record decoder
//!
//! Accepts either a bare `record` element or a `collection` element, in
//! which case the first `record` child is decoded. Values in MARCXML are
//! already Unicode regardless of the leader encoding flag.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MarcError;
use crate::record::{Field, FieldContent, Record, Subfield};

/// Decode a MARCXML document.
pub fn parse_xml(xml: &str) -> Result<Record, MarcError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut leader = String::new();
    let mut fields: Vec<Field> = Vec::new();

    let mut in_record = false;
    let mut saw_record = false;
    let mut element: Option<OpenElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"record" => {
                        if saw_record {
                            // collection wrapper: only the first record.
                            break;
                        }
                        in_record = true;
                        saw_record = true;
                    }
                    b"leader" if in_record => {
                        element = Some(OpenElement::Leader);
                    }
                    b"controlfield" if in_record => {
                        element = Some(OpenElement::Control {
                            tag: require_tag(&e)?,
                            value: String::new(),
                        });
                    }
                    b"datafield" if in_record => {
                        element = Some(OpenElement::Data {
                            tag: require_tag(&e)?,
                            indicators: (indicator(&e, b"ind1")?, indicator(&e, b"ind2")?),
                            subfields: Vec::new(),
                            in_subfield: false,
                        });
                    }
                    b"subfield" if in_record => {
                        if let Some(OpenElement::Data {
                            subfields,
                            in_subfield,
                            ..
                        }) = element.as_mut()
                        {
                            subfields.push(Subfield {
                                code: subfield_code(&e)?,
                                value: String::new(),
                            });
                            *in_subfield = true;
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                match element.as_mut() {
                    Some(OpenElement::Leader) => leader.push_str(&text),
                    Some(OpenElement::Control { value, .. }) => value.push_str(&text),
                    Some(OpenElement::Data {
                        subfields,
                        in_subfield: true,
                        ..
                    }) => {
                        if let Some(last) = subfields.last_mut() {
                            last.value.push_str(&text);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"record" => break,
                b"leader" => element = None,
                b"controlfield" => {
                    if let Some(OpenElement::Control { tag, value }) = element.take() {
                        fields.push(Field {
                            tag,
                            content: FieldContent::Control(value),
                        });
                    }
                }
                b"datafield" => {
                    if let Some(OpenElement::Data {
                        tag,
                        indicators,
                        subfields,
                        ..
                    }) = element.take()
                    {
                        fields.push(Field {
                            tag,
                            content: FieldContent::Data {
                                indicators,
                                subfields,
                            },
                        });
                    }
                }
                b"subfield" => {
                    if let Some(OpenElement::Data { in_subfield, .. }) = element.as_mut() {
                        *in_subfield = false;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_record {
        return Err(MarcError::Xml("no record element".to_string()));
    }
    Ok(Record::new(leader, fields))
}

enum OpenElement {
    Leader,
    Control {
        tag: String,
        value: String,
    },
    Data {
        tag: String,
        indicators: (char, char),
        subfields: Vec<Subfield>,
        in_subfield: bool,
    },
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, MarcError> {
    match e.try_get_attribute(name) {
        Ok(Some(attr)) => {
            let value = attr
                .unescape_value()
                .map_err(|err| MarcError::Xml(err.to_string()))?;
            Ok(Some(value.into_owned()))
        }
        Ok(None) => Ok(None),
        Err(err) => Err(MarcError::Xml(err.to_string())),
    }
}

fn require_tag(e: &BytesStart<'_>) -> Result<String, MarcError> {
    let tag = attribute(e, b"tag")?.unwrap_or_default();
    if tag.trim().is_empty() {
        return Err(MarcError::BlankTag);
    }
    Ok(tag)
}

fn indicator(e: &BytesStart<'_>, name: &[u8]) -> Result<char, MarcError> {
    Ok(attribute(e, name)?
        .and_then(|v| v.chars().next())
        .unwrap_or(' '))
}

fn subfield_code(e: &BytesStart<'_>) -> Result<char, MarcError> {
    let code = attribute(e, b"code")?.unwrap_or_default();
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Ok(c),
        _ => Err(MarcError::BadSubtag),
    }
}
