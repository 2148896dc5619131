//! Test tables for each protocol, plus fixtures derived from the mock
//! platform configuration.

use scmi_platform_mock::PlatformConfig;
use scmi_wire::MessageLayout;
use scmi_wire::protocol_id;

use crate::engine::CaseRun;
use crate::orchestrator::PlatformInfo;
use crate::report::CaseStatus;
use crate::testcase::{CaseHooks, Execution, ExpectedReturn};

pub mod base;
pub mod power;

pub use base::{BaseExpectations, BaseModule};
pub use power::{DomainExpectation, PowerExpectations, PowerModule};

/// Message id no protocol defines.
pub const INVALID_MESSAGE_ID: u8 = 0xFF;

/// Print-only descriptors for every field of `layout`; fields named
/// `reserved` become reserved-bits checks.
pub fn expect_layout(layout: &MessageLayout) -> Vec<ExpectedReturn> {
    layout
        .fields
        .iter()
        .map(|&field| match field.name {
            "reserved" => ExpectedReturn::reserved(field),
            _ => ExpectedReturn::show(field),
        })
        .collect()
}

/// Query PROTOCOL_MESSAGE_ATTRIBUTES for each mandatory command.
pub(crate) struct MandatoryCommands(pub &'static [u8]);

impl CaseHooks for MandatoryCommands {
    fn execute(&self, run: &mut CaseRun<'_>) -> Execution {
        for &message_id in self.0 {
            run.record("message id", CaseStatus::Info, format!("{message_id:#x}"));
            run.send_and_assert(&[u32::from(message_id)]);
        }
        Execution::Handled
    }
}

/// Fixtures that describe a mock platform built from `config`.
pub fn mock_platform_info(config: &PlatformConfig) -> PlatformInfo {
    let mut info = PlatformInfo::new();
    info.insert(protocol_id::BASE, BaseExpectations::from_mock(&config.base));
    if let Some(power) = &config.power {
        info.insert(protocol_id::POWER, PowerExpectations::from_mock(power));
    }
    info
}
