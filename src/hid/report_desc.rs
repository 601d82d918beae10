//! HID Report Descriptor builder
//!
//! Descriptors are assembled from [`Item`]s and encoded as USB HID short
//! items. The two low bits of every tag select the data width (1, 2 or 4
//! bytes), chosen per value: 0..=255 and -128..=-1 take one byte, then two,
//! then four. Host parsers are strict about this, so widths are never padded.

use std::fmt::Write as _;
use std::ops::BitOr;

use super::layout::ReportLayout;
use crate::error::{AppError, Result};

/// Short item tags with the size bits cleared
pub mod tag {
    pub const INPUT: u8 = 0x80;
    pub const COLLECTION: u8 = 0xA0;
    pub const END_COLLECTION: u8 = 0xC0;
    pub const USAGE_PAGE: u8 = 0x04;
    pub const LOGICAL_MINIMUM: u8 = 0x14;
    pub const LOGICAL_MAXIMUM: u8 = 0x24;
    pub const PHYSICAL_MINIMUM: u8 = 0x34;
    pub const PHYSICAL_MAXIMUM: u8 = 0x44;
    pub const UNIT: u8 = 0x64;
    pub const REPORT_SIZE: u8 = 0x74;
    pub const REPORT_ID: u8 = 0x84;
    pub const REPORT_COUNT: u8 = 0x94;
    pub const USAGE: u8 = 0x08;
    pub const USAGE_MINIMUM: u8 = 0x18;
    pub const USAGE_MAXIMUM: u8 = 0x28;
}

/// Usage pages referenced by the gamepad descriptor
pub mod usage_page {
    pub const GENERIC_DESKTOP: i64 = 0x01;
    pub const BUTTON: i64 = 0x09;
}

/// Generic Desktop usages outside the axis set
pub mod usage {
    pub const HAT_SWITCH: i64 = 0x39;
}

/// Unit codes
pub mod unit {
    /// English rotation, degrees
    pub const DEGREES: i64 = 0x14;
}

/// Report ID carried by every input report
pub const INPUT_REPORT_ID: u8 = 0x01;

/// Collection type byte following the 0xA1 opener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Physical = 0x00,
    Application = 0x01,
    Logical = 0x02,
    Report = 0x03,
}

/// Main item flags for Input items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFlags(u8);

impl InputFlags {
    pub const DATA: Self = Self(0x00);
    pub const CONSTANT: Self = Self(0x01);
    pub const VARIABLE: Self = Self(0x02);
    pub const ABSOLUTE: Self = Self(0x00);
    pub const NULL_STATE: Self = Self(0x40);

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for InputFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One descriptor element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    UsagePage(i64),
    Usage(i64),
    UsageMinimum(i64),
    UsageMaximum(i64),
    LogicalMinimum(i64),
    LogicalMaximum(i64),
    PhysicalMinimum(i64),
    PhysicalMaximum(i64),
    Unit(i64),
    ReportSize(i64),
    ReportCount(i64),
    ReportId(i64),
    Input(InputFlags),
    Collection(CollectionKind, Vec<Item>),
}

impl Item {
    fn name(&self) -> &'static str {
        match self {
            Item::UsagePage(_) => "UsagePage",
            Item::Usage(_) => "Usage",
            Item::UsageMinimum(_) => "UsageMinimum",
            Item::UsageMaximum(_) => "UsageMaximum",
            Item::LogicalMinimum(_) => "LogicalMinimum",
            Item::LogicalMaximum(_) => "LogicalMaximum",
            Item::PhysicalMinimum(_) => "PhysicalMinimum",
            Item::PhysicalMaximum(_) => "PhysicalMaximum",
            Item::Unit(_) => "Unit",
            Item::ReportSize(_) => "ReportSize",
            Item::ReportCount(_) => "ReportCount",
            Item::ReportId(_) => "ReportId",
            Item::Input(_) => "Input",
            Item::Collection(..) => "Collection",
        }
    }

    /// Append the encoded item to `out`
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let (base, value) = match self {
            Item::UsagePage(v) => (tag::USAGE_PAGE, *v),
            Item::Usage(v) => (tag::USAGE, *v),
            Item::UsageMinimum(v) => (tag::USAGE_MINIMUM, *v),
            Item::UsageMaximum(v) => (tag::USAGE_MAXIMUM, *v),
            Item::LogicalMinimum(v) => (tag::LOGICAL_MINIMUM, *v),
            Item::LogicalMaximum(v) => (tag::LOGICAL_MAXIMUM, *v),
            Item::PhysicalMinimum(v) => (tag::PHYSICAL_MINIMUM, *v),
            Item::PhysicalMaximum(v) => (tag::PHYSICAL_MAXIMUM, *v),
            Item::Unit(v) => (tag::UNIT, *v),
            Item::ReportSize(v) => (tag::REPORT_SIZE, *v),
            Item::ReportCount(v) => (tag::REPORT_COUNT, *v),
            Item::ReportId(v) => (tag::REPORT_ID, *v),
            Item::Input(flags) => (tag::INPUT, i64::from(flags.bits())),
            Item::Collection(kind, children) => {
                out.push(tag::COLLECTION | 0x01);
                out.push(*kind as u8);
                for child in children {
                    child.encode(out)?;
                }
                out.push(tag::END_COLLECTION);
                return Ok(());
            }
        };

        encode_short(base, value, self.name(), out)
    }
}

/// Encode a numeric short item, selecting the narrowest width
fn encode_short(base: u8, value: i64, name: &'static str, out: &mut Vec<u8>) -> Result<()> {
    if (0..=0xFF).contains(&value) || (i64::from(i8::MIN)..0).contains(&value) {
        out.push(base | 0x01);
        out.push(value as u8);
    } else if (0..=0xFFFF).contains(&value) || (i64::from(i16::MIN)..0).contains(&value) {
        out.push(base | 0x02);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if (0..=i64::from(u32::MAX)).contains(&value)
        || (i64::from(i32::MIN)..0).contains(&value)
    {
        out.push(base | 0x03);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        return Err(AppError::EncodingRange { item: name, value });
    }
    Ok(())
}

/// Encoded report descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDescriptor {
    items: Vec<Item>,
    bytes: Vec<u8>,
}

impl ReportDescriptor {
    /// Encode a list of top-level items
    pub fn new(items: Vec<Item>) -> Result<Self> {
        let mut bytes = Vec::with_capacity(64);
        for item in &items {
            item.encode(&mut bytes)?;
        }
        Ok(Self { items, bytes })
    }

    /// Gamepad descriptor matching the packing of [`ReportLayout`]
    pub fn for_layout(layout: &ReportLayout) -> Result<Self> {
        let var_abs = InputFlags::DATA | InputFlags::VARIABLE | InputFlags::ABSOLUTE;
        let padding = InputFlags::CONSTANT | InputFlags::VARIABLE | InputFlags::ABSOLUTE;

        let mut report = vec![Item::ReportId(i64::from(INPUT_REPORT_ID))];

        let buttons = layout.button_count() as i64;
        if buttons > 0 {
            report.extend([
                Item::UsagePage(usage_page::BUTTON),
                Item::UsageMinimum(1),
                Item::UsageMaximum(buttons),
                Item::LogicalMinimum(0),
                Item::LogicalMaximum(1),
                Item::ReportCount(buttons),
                Item::ReportSize(1),
                Item::Input(var_abs),
            ]);
        }

        let pad_bits = layout.button_padding_bits();
        if pad_bits > 0 {
            report.extend([
                Item::ReportCount(1),
                Item::ReportSize(pad_bits as i64),
                Item::Input(padding),
            ]);
        }

        if !layout.axes().is_empty() {
            let mut axes = vec![Item::UsagePage(usage_page::GENERIC_DESKTOP)];
            axes.extend(layout.axes().iter().map(|a| Item::Usage(i64::from(a.usage()))));
            axes.extend([
                Item::LogicalMinimum(-127),
                Item::LogicalMaximum(127),
                Item::ReportSize(8),
                Item::ReportCount(layout.axes().len() as i64),
                Item::Input(var_abs),
            ]);
            report.push(Item::Collection(CollectionKind::Physical, axes));
        }

        if layout.has_hat_switch() {
            // 4 bits, 9 positions (0 = rest), 0..315 degrees, then 4 bits of padding
            let hat = vec![
                Item::UsagePage(usage_page::GENERIC_DESKTOP),
                Item::Usage(usage::HAT_SWITCH),
                Item::LogicalMinimum(0),
                Item::LogicalMaximum(8),
                Item::PhysicalMinimum(0),
                Item::PhysicalMaximum(315),
                Item::Unit(unit::DEGREES),
                Item::ReportSize(4),
                Item::ReportCount(1),
                Item::Input(InputFlags::VARIABLE | InputFlags::ABSOLUTE | InputFlags::NULL_STATE),
                Item::ReportCount(1),
                Item::ReportSize(4),
                Item::Input(padding),
            ];
            report.push(Item::Collection(CollectionKind::Physical, hat));
        }

        Self::new(vec![
            Item::UsagePage(usage_page::GENERIC_DESKTOP),
            Item::Usage(i64::from(layout.kind().usage())),
            Item::Collection(
                CollectionKind::Application,
                vec![Item::Collection(CollectionKind::Report, report)],
            ),
        ])
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex, as embedded in the SDP HIDDescriptorList
    pub fn hex(&self) -> String {
        let mut s = String::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

/// Decoded short item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    /// Tag with the size bits cleared
    pub tag: u8,
    pub data: Vec<u8>,
}

impl RawItem {
    pub fn unsigned(&self) -> u32 {
        let mut buf = [0u8; 4];
        buf[..self.data.len()].copy_from_slice(&self.data);
        u32::from_le_bytes(buf)
    }

    pub fn signed(&self) -> i32 {
        match self.data.len() {
            0 => 0,
            1 => i32::from(self.data[0] as i8),
            2 => i32::from(i16::from_le_bytes([self.data[0], self.data[1]])),
            _ => self.unsigned() as i32,
        }
    }
}

/// Split descriptor bytes into short items
///
/// Collection openers and closers are returned as flat items. Long items
/// are rejected.
pub fn parse_items(bytes: &[u8]) -> Result<Vec<RawItem>> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let prefix = bytes[pos];
        if prefix == 0xFE {
            return Err(AppError::Internal(format!(
                "long item at offset {} is not supported",
                pos
            )));
        }
        let len = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let end = pos + 1 + len;
        if end > bytes.len() {
            return Err(AppError::Internal(format!(
                "truncated item 0x{:02X} at offset {}",
                prefix, pos
            )));
        }
        items.push(RawItem {
            tag: prefix & !0x03,
            data: bytes[pos + 1..end].to_vec(),
        });
        pos = end;
    }
    Ok(items)
}
