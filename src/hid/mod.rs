//! HID codec layer
//!
//! Everything the host sees of the emulated gamepad is derived from one
//! [`ReportLayout`]:
//! ```text
//! ReportLayout --> ReportDescriptor --> SDP HIDDescriptorList
//!      |
//!      +--> pack_input_report(snapshot) --> interrupt channel
//! ```
//! The descriptor and the packer are two halves of one contract and are
//! always built from the same layout.

pub mod layout;
pub mod report;
pub mod report_desc;
pub mod types;

pub use layout::{Axis, GamepadKind, ReportLayout};
pub use report::{pack_input_report, report_len, REPORT_PREFIX};
pub use report_desc::{parse_items, CollectionKind, InputFlags, Item, ReportDescriptor};
pub use types::{ControllerSnapshot, HatDirection};
