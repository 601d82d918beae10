//! SDP service records
//!
//! BlueZ takes the record as XML in the `ServiceRecord` option of
//! `ProfileManager1.RegisterProfile`; see [`SdpRecord::xml`].

pub mod hid_record;
pub mod record;

pub use hid_record::{build_hid_record, subclass_for, HidServiceInfo, LanguageBase};
pub use record::{SdpAttribute, SdpRecord, SdpValue};
