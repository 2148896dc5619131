//! Capability-gated suite skipping.
//!
//! A capability case asks the platform whether an optional command exists
//! (PROTOCOL_MESSAGE_ATTRIBUTES) and compares the answer with what the
//! platform declared. The decision goes into the skip flag of the suite
//! that exercises the command.

use scmi_wire::{Response, Status, status_name};

use crate::context::ProtocolContext;
use crate::engine::CaseRun;
use crate::report::CaseStatus;
use crate::testcase::CaseHooks;

/// Declared flags value meaning "every command is declared".
pub const ALL_COMMANDS: u32 = u32::MAX;

/// Bit used for `message_id` in a capability mask.
pub const fn command_bit(message_id: u8) -> u32 {
    match 1u32.checked_shl(message_id as u32) {
        Some(bit) => bit,
        None => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDecision {
    pub must_run: bool,
    pub outcome: CaseStatus,
    pub detail: String,
}

/// Decide whether the suite exercising `message_id` must run.
///
/// * An observed status other than SUCCESS or NOT_FOUND is an ERROR and the
///   suite is skipped.
/// * A declared command must answer SUCCESS when `must_be_supported` and
///   NOT_FOUND otherwise; a mismatch FAILS and the suite is skipped.
/// * An undeclared command is reported as INFO and the suite runs only if
///   the platform answered SUCCESS anyway.
pub fn check_suite_skipped(
    command_mask: u32,
    protocol_flags_mask: u32,
    must_be_supported: bool,
    message_id: u8,
    observed: i32,
) -> SkipDecision {
    let success = Status::Success.as_i32();
    let not_found = Status::NotFound.as_i32();

    if observed != success && observed != not_found {
        return SkipDecision {
            must_run: false,
            outcome: CaseStatus::Error,
            detail: format!(
                "message {:#x}: unexpected status {}",
                message_id,
                status_name(observed)
            ),
        };
    }

    let declared = protocol_flags_mask == ALL_COMMANDS || protocol_flags_mask & command_mask != 0;
    if declared {
        let expected = if must_be_supported { success } else { not_found };
        if observed == expected {
            SkipDecision {
                must_run: must_be_supported,
                outcome: CaseStatus::Passed,
                detail: format!("message {:#x}: {}", message_id, status_name(observed)),
            }
        } else {
            SkipDecision {
                must_run: false,
                outcome: CaseStatus::Failed,
                detail: format!(
                    "message {:#x}: expected {}, got {}",
                    message_id,
                    status_name(expected),
                    status_name(observed)
                ),
            }
        }
    } else {
        SkipDecision {
            must_run: observed == success,
            outcome: CaseStatus::Info,
            detail: format!(
                "message {:#x} not declared, platform answered {}",
                message_id,
                status_name(observed)
            ),
        }
    }
}

/// What the platform declared about one optional command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub flags_mask: u32,
    pub must_be_supported: bool,
}

/// Hook for a PROTOCOL_MESSAGE_ATTRIBUTES query that gates `suite`.
pub struct GateSuite {
    pub suite: usize,
    pub message_id: u8,
    pub capability: fn(&ProtocolContext) -> Capability,
}

impl CaseHooks for GateSuite {
    fn post_process(&self, run: &mut CaseRun<'_>, response: &Response) {
        let capability = (self.capability)(run.ctx());
        let decision = check_suite_skipped(
            command_bit(self.message_id),
            capability.flags_mask,
            capability.must_be_supported,
            self.message_id,
            response.status,
        );
        run.record("capability", decision.outcome, decision.detail);
        let suite = run.ctx().suite_name(self.suite);
        if run.ctx_mut().apply_must_run(self.suite, decision.must_run) && !decision.must_run {
            tracing::info!(suite, "suite will be skipped");
        }
    }

    fn on_transport_error(&self, run: &mut CaseRun<'_>) {
        run.record("capability", CaseStatus::Error, "no answer from the platform");
        let suite = run.ctx().suite_name(self.suite);
        if run.ctx_mut().apply_must_run(self.suite, false) {
            tracing::info!(suite, "suite will be skipped");
        }
    }
}
