//! Uplink identity validation.
//!
//! An inbound equipment document is trusted only if its `EquipmentHeader`
//! matches the asset configured for the agent, field by field and
//! case-sensitively. Anything missing or unreadable rejects the document.

use crate::json::{at, str_at};
use crate::snapshot::EquipmentIdentity;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no uplink document")]
    NoSnapshot,
    #[error("uplink document has no EquipmentHeader")]
    NoEquipmentHeader,
    #[error("EquipmentHeader.{0} is missing or not a string")]
    IncompleteIdentity(&'static str),
    #[error("EquipmentHeader.{field} is {received:?}, expected {expected:?}")]
    Mismatch {
        field: &'static str,
        expected: String,
        received: String,
    },
}

/// Returns the document when it belongs to `configured`.
pub fn check<'a>(snapshot: Option<&'a Value>, configured: &EquipmentIdentity) -> Result<&'a Value, Rejection> {
    let doc = snapshot.ok_or(Rejection::NoSnapshot)?;
    if !at(doc, &["EquipmentHeader"]).is_some_and(Value::is_object) {
        return Err(Rejection::NoEquipmentHeader);
    }

    let expected = [
        ("OEMName", configured.make.as_str()),
        ("Model", configured.model.as_str()),
        ("SerialNumber", configured.serial_number.as_str()),
    ];
    for (field, want) in expected {
        let got = str_at(doc, &["EquipmentHeader", field]).ok_or(Rejection::IncompleteIdentity(field))?;
        if got != want {
            return Err(Rejection::Mismatch {
                field,
                expected: want.to_string(),
                received: got.to_string(),
            });
        }
    }

    Ok(doc)
}

pub fn validate(snapshot: Option<&Value>, configured: &EquipmentIdentity) -> bool {
    check(snapshot, configured).is_ok()
}
