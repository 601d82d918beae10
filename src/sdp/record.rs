//! SDP attribute tree and its BlueZ XML form

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Typed SDP data element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpValue {
    Uuid16(u16),
    Uuid32(u32),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Bool(bool),
    Text {
        value: String,
        encoding: Option<String>,
    },
    Url(String),
    Sequence(Vec<SdpValue>),
}

impl SdpValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
            encoding: None,
        }
    }

    /// Text element with an explicit `encoding` attribute (e.g. "hex")
    pub fn encoded_text(value: impl Into<String>, encoding: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
            encoding: Some(encoding.into()),
        }
    }

    pub fn seq(values: impl IntoIterator<Item = SdpValue>) -> Self {
        Self::Sequence(values.into_iter().collect())
    }

    fn write_xml(&self, indent: usize, out: &mut String) {
        let pad = "\t".repeat(indent);
        // Writing to a String cannot fail
        let _ = match self {
            SdpValue::Uuid16(v) => writeln!(out, "{pad}<uuid value=\"0x{:04x}\" />", v),
            SdpValue::Uuid32(v) => writeln!(out, "{pad}<uuid value=\"0x{:08x}\" />", v),
            SdpValue::UInt8(v) => writeln!(out, "{pad}<uint8 value=\"0x{:02x}\" />", v),
            SdpValue::UInt16(v) => writeln!(out, "{pad}<uint16 value=\"0x{:04x}\" />", v),
            SdpValue::UInt32(v) => writeln!(out, "{pad}<uint32 value=\"0x{:08x}\" />", v),
            SdpValue::Bool(v) => writeln!(out, "{pad}<boolean value=\"{}\" />", v),
            SdpValue::Text { value, encoding: None } => {
                writeln!(out, "{pad}<text value=\"{}\" />", escape(value))
            }
            SdpValue::Text {
                value,
                encoding: Some(enc),
            } => writeln!(
                out,
                "{pad}<text encoding=\"{}\" value=\"{}\" />",
                escape(enc),
                escape(value)
            ),
            SdpValue::Url(v) => writeln!(out, "{pad}<url value=\"{}\" />", escape(v)),
            SdpValue::Sequence(items) => {
                out.push_str(&pad);
                out.push_str("<sequence>\n");
                for item in items {
                    item.write_xml(indent + 1, out);
                }
                writeln!(out, "{pad}</sequence>")
            }
        };
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Attribute ID paired with its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpAttribute {
    pub id: u16,
    pub value: SdpValue,
}

impl SdpAttribute {
    pub fn new(id: u16, value: SdpValue) -> Self {
        Self { id, value }
    }
}

/// Service record, always ordered by attribute ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdpRecord {
    attributes: BTreeMap<u16, SdpValue>,
}

impl SdpRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attribute, returning the value it replaced
    pub fn insert(&mut self, attribute: SdpAttribute) -> Option<SdpValue> {
        self.attributes.insert(attribute.id, attribute.value)
    }

    /// Builder-style insert
    pub fn with(mut self, id: u16, value: SdpValue) -> Self {
        self.attributes.insert(id, value);
        self
    }

    pub fn get(&self, id: u16) -> Option<&SdpValue> {
        self.attributes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute IDs in serialization order
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.attributes.keys().copied()
    }

    /// XML accepted by `org.bluez.ProfileManager1.RegisterProfile`
    pub fn xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n\n<record>\n");
        for (id, value) in &self.attributes {
            let _ = writeln!(out, "\t<attribute id=\"0x{:04x}\">", id);
            value.write_xml(2, &mut out);
            out.push_str("\t</attribute>\n");
        }
        out.push_str("</record>\n");
        out
    }
}

impl FromIterator<SdpAttribute> for SdpRecord {
    fn from_iter<I: IntoIterator<Item = SdpAttribute>>(iter: I) -> Self {
        let mut record = Self::new();
        for attribute in iter {
            record.insert(attribute);
        }
        record
    }
}
