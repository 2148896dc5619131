//! One-slot precondition store shared by DEFINE/USE case pairs.
//!
//! The slot lives in the protocol context, so pairs never see another
//! protocol's outcome. Within a protocol the last DEFINE wins.

use scmi_wire::{Status, status_name};

use crate::report::CaseStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreconditionSlot {
    pub result: CaseStatus,
    pub status: i32,
}

impl PreconditionSlot {
    pub fn new(result: CaseStatus, status: i32) -> Self {
        Self { result, status }
    }

    /// The defining case was conformant and the platform answered SUCCESS.
    pub fn is_met(&self) -> bool {
        self.result == CaseStatus::Conformant && self.status == Status::Success.as_i32()
    }
}

/// Gate for a USE case: `Err` carries the reason to report when it is skipped.
pub fn check_use(slot: Option<&PreconditionSlot>) -> Result<(), String> {
    match slot {
        None => Err("precondition not met: no defining case ran".into()),
        Some(slot) if slot.is_met() => Ok(()),
        Some(slot) => Err(format!(
            "precondition not met: defining case was {} with status {}",
            slot.result,
            status_name(slot.status)
        )),
    }
}
