//! Uniform decoded record structure shared by both physical encodings

/// Character encoding scheme of a record, taken from leader byte 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Marc8,
    Utf8,
}

/// A single subfield within a data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

/// Content of a variable field: control fields (tags 00X) carry a bare
/// value, data fields carry indicators and ordered subfields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldContent {
    Control(String),
    Data {
        indicators: (char, char),
        subfields: Vec<Subfield>,
    },
}

/// A tagged variable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: String,
    pub content: FieldContent,
}

impl Field {
    /// Ordered values of all subfields whose code is in `codes`.
    pub fn values(&self, codes: &[char]) -> Vec<&str> {
        match &self.content {
            FieldContent::Control(_) => Vec::new(),
            FieldContent::Data { subfields, .. } => subfields
                .iter()
                .filter(|s| codes.contains(&s.code))
                .map(|s| s.value.as_str())
                .collect(),
        }
    }

    /// First value of the given subfield code, if present.
    pub fn value_of(&self, code: char) -> Option<&str> {
        match &self.content {
            FieldContent::Control(_) => None,
            FieldContent::Data { subfields, .. } => subfields
                .iter()
                .find(|s| s.code == code)
                .map(|s| s.value.as_str()),
        }
    }

    /// Second indicator of a data field, `' '` for control fields.
    pub fn indicator2(&self) -> char {
        match &self.content {
            FieldContent::Control(_) => ' ',
            FieldContent::Data { indicators, .. } => indicators.1,
        }
    }
}

/// A decoded bibliographic record: leader plus repeatable tagged fields in
/// their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    leader: String,
    fields: Vec<Field>,
}

impl Record {
    pub fn new(leader: String, fields: Vec<Field>) -> Self {
        Record { leader, fields }
    }

    pub fn leader(&self) -> &str {
        &self.leader
    }

    /// Encoding scheme per leader byte 9: `'a'` means UTF-8, anything else
    /// is MARC-8.
    pub fn encoding(&self) -> Encoding {
        if self.leader.as_bytes().get(9) == Some(&b'a') {
            Encoding::Utf8
        } else {
            Encoding::Marc8
        }
    }

    /// First field with the given tag.
    pub fn first(&self, tag: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// All fields with the given tag, in record order.
    pub fn fields(&self, tag: &str) -> impl Iterator<Item = &Field> {
        let tag = tag.to_string();
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    pub fn all_fields(&self) -> &[Field] {
        &self.fields
    }

    /// Value of a control field (tags 001-009), if present.
    pub fn control_value(&self, tag: &str) -> Option<&str> {
        self.first(tag).and_then(|f| match &f.content {
            FieldContent::Control(v) => Some(v.as_str()),
            FieldContent::Data { .. } => None,
        })
    }

    /// Ordered subfield values across all fields with the given tag.
    pub fn subfield_values(&self, tag: &str, codes: &[char]) -> Vec<&str> {
        self.fields(tag).flat_map(|f| f.values(codes)).collect()
    }
}
