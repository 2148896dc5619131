//! Power domain protocol (0x11).

use scmi_platform_mock::PowerConfig;
use scmi_wire::messages::{common, power};
use scmi_wire::{ExpectedStatus, Response, Status};

use crate::context::{ProtocolContext, entity};
use crate::engine::CaseRun;
use crate::orchestrator::{ProtocolModule, ProtocolRegistration};
use crate::protocols::{INVALID_MESSAGE_ID, MandatoryCommands, expect_layout};
use crate::report::CaseStatus;
use crate::skip::{ALL_COMMANDS, Capability, GateSuite, command_bit};
use crate::testcase::{
    CaseHooks, Execution, ExpectedReturn, PrecondMarker, TestCase, TestSuite,
};

pub const DISCOVERY_SUITE: usize = 0;
pub const DOMAIN_SUITE: usize = 1;
pub const STATE_SUITE: usize = 2;
pub const NOTIFY_SUITE: usize = 3;

const MANDATORY: &[u8] = &[
    common::PROTOCOL_VERSION,
    common::PROTOCOL_ATTRIBUTES,
    common::PROTOCOL_MESSAGE_ATTRIBUTES,
    power::DOMAIN_ATTRIBUTES,
    power::STATE_SET,
    power::STATE_GET,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainExpectation {
    pub name: Option<String>,
    pub async_support: Option<bool>,
    pub notify_support: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PowerExpectations {
    pub version: Option<u32>,
    pub num_domains: Option<u32>,
    /// Optional commands declared, one bit per message id, or [`ALL_COMMANDS`].
    pub flags_mask: u32,
    /// Declared optional commands that must be implemented.
    pub supported: u32,
    /// Indexed by domain id.
    pub domains: Vec<DomainExpectation>,
}

impl PowerExpectations {
    pub fn from_mock(config: &PowerConfig) -> Self {
        Self {
            version: Some(config.version),
            num_domains: Some(config.domains.len() as u32),
            flags_mask: ALL_COMMANDS,
            supported: if config.state_notify {
                command_bit(power::STATE_NOTIFY)
            } else {
                0
            },
            domains: config
                .domains
                .iter()
                .map(|d| DomainExpectation {
                    name: Some(d.name.clone()),
                    async_support: Some(d.async_support),
                    notify_support: Some(d.notify_support),
                })
                .collect(),
        }
    }
}

fn state_notify_capability(ctx: &ProtocolContext) -> Capability {
    match ctx.fixture::<PowerExpectations>() {
        Some(fixture) => Capability {
            flags_mask: fixture.flags_mask,
            must_be_supported: fixture.supported & command_bit(power::STATE_NOTIFY) != 0,
        },
        None => Capability {
            flags_mask: 0,
            must_be_supported: false,
        },
    }
}

struct RecordAttributes;

impl CaseHooks for RecordAttributes {
    fn post_process(&self, run: &mut CaseRun<'_>, response: &Response) {
        if response.status != Status::Success.as_i32() {
            return;
        }
        let Some(word) = response.word(0) else {
            return;
        };
        let domains = power::NUM_DOMAINS.get(word);
        let discovered = run.ctx_mut().discovered_mut();
        discovered.set_value(entity::NUM_DOMAINS, domains);
        discovered.record(entity::DOMAINS, 0..domains);
    }
}

/// POWER_DOMAIN_ATTRIBUTES for every discovered domain.
struct DomainAttributes;

impl CaseHooks for DomainAttributes {
    fn execute(&self, run: &mut CaseRun<'_>) -> Execution {
        let domains = run.ctx().discovered().list(entity::DOMAINS).to_vec();
        if domains.is_empty() {
            run.record("domains", CaseStatus::Skip, "no power domains discovered");
            return Execution::Handled;
        }
        let &[notify, asynchronous, sync, reserved, name] = power::DOMAIN_ATTRIBUTES_LAYOUT.fields
        else {
            return Execution::Default;
        };
        for domain_id in domains {
            let expectation = run
                .fixture::<PowerExpectations>()
                .and_then(|f| f.domains.get(domain_id as usize).cloned())
                .unwrap_or_default();
            run.set_expected(vec![
                ExpectedReturn::check_if(notify, expectation.notify_support.map(u32::from)),
                ExpectedReturn::check_if(asynchronous, expectation.async_support.map(u32::from)),
                ExpectedReturn::show(sync),
                ExpectedReturn::reserved(reserved),
                ExpectedReturn::check_text_if(name, expectation.name.as_deref()),
            ]);
            run.send_and_assert(&[domain_id]);
        }
        Execution::Handled
    }
}

/// The first domain id past the last domain.
struct InvalidDomain;

impl CaseHooks for InvalidDomain {
    fn invalid_value(&self, ctx: &ProtocolContext) -> u32 {
        ctx.discovered()
            .value(entity::NUM_DOMAINS)
            .unwrap_or(u32::MAX)
    }
}

/// Asynchronous set on one domain. A domain declared without async support
/// must refuse with NOT_SUPPORTED.
struct AsyncStateSet {
    domain: usize,
}

impl CaseHooks for AsyncStateSet {
    fn expected_status(&self, _case: &TestCase, ctx: &ProtocolContext) -> Option<ExpectedStatus> {
        let fixture = ctx.fixture::<PowerExpectations>()?;
        match fixture.domains.get(self.domain)?.async_support? {
            true => Some(Status::Success.into()),
            false => Some(Status::NotSupported.into()),
        }
    }
}

/// Enable state-change notifications on domain 0, change its state and
/// expect a POWER_STATE_CHANGED notification.
struct StateChangeEvent;

impl CaseHooks for StateChangeEvent {
    fn execute(&self, run: &mut CaseRun<'_>) -> Execution {
        let domain_id = 0;
        let Some(enabled) = run.send_and_assert(&[domain_id, 1]) else {
            return Execution::Handled;
        };
        if enabled.status != Status::Success.as_i32() {
            return Execution::Handled;
        }

        let Some(set) = run.send_to(power::STATE_SET, &[0, domain_id, power::STATE_ON]) else {
            return Execution::Handled;
        };
        run.assert_status("state set", Status::Success.into(), set.status);

        if let Some(notification) = run.wait_for_notification() {
            let header = notification.header;
            if header.protocol_id == power::PROTOCOL_ID && header.message_id == power::STATE_CHANGED {
                run.record("notification", CaseStatus::Passed, header.to_string());
            } else {
                run.record("notification", CaseStatus::Failed, header.to_string());
            }
            let &[agent, domain, state] = power::STATE_CHANGED_LAYOUT.fields else {
                return Execution::Handled;
            };
            run.assert_returns(
                &[
                    ExpectedReturn::show(agent).decimal(),
                    ExpectedReturn::check(domain, domain_id).decimal(),
                    ExpectedReturn::check(state, power::STATE_ON),
                ],
                &notification.returns,
            );
        }

        run.send_and_assert(&[domain_id, 0]);
        Execution::Handled
    }
}

pub struct PowerModule;

impl ProtocolModule for PowerModule {
    fn protocol_id(&self) -> u8 {
        power::PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "power domain"
    }

    fn discovery_suite(&self) -> usize {
        DISCOVERY_SUITE
    }

    fn suites(&self) -> Vec<TestSuite> {
        let id = power::PROTOCOL_ID;
        let set_async = power::SET_ASYNC.mask_in_place();
        let domain_id = power::STATE_SET_COMPLETE.fields[0];
        let power_state = power::STATE_SET_COMPLETE.fields[1];
        vec![
            TestSuite::new(
                "power discovery",
                [
                    TestCase::new("power.version", id, common::PROTOCOL_VERSION)
                        .describe("protocol version"),
                    TestCase::new("power.attributes", id, common::PROTOCOL_ATTRIBUTES)
                        .describe("domain count")
                        .hooks(RecordAttributes),
                    TestCase::new(
                        "power.message_attributes.mandatory",
                        id,
                        common::PROTOCOL_MESSAGE_ATTRIBUTES,
                    )
                    .describe("mandatory commands are implemented")
                    .returns(expect_layout(&common::MESSAGE_ATTRIBUTES))
                    .hooks(MandatoryCommands(MANDATORY)),
                    TestCase::new(
                        "power.message_attributes.state_notify",
                        id,
                        common::PROTOCOL_MESSAGE_ATTRIBUTES,
                    )
                    .describe("POWER_STATE_NOTIFY capability")
                    .params([u32::from(power::STATE_NOTIFY)])
                    .expect_any()
                    .hooks(GateSuite {
                        suite: NOTIFY_SUITE,
                        message_id: power::STATE_NOTIFY,
                        capability: state_notify_capability,
                    }),
                    TestCase::new("power.invalid_message", id, INVALID_MESSAGE_ID)
                        .describe("undefined message id")
                        .expect(Status::NotFound),
                ],
            ),
            TestSuite::new(
                "power domain attributes",
                [
                    TestCase::new("power.domain_attributes", id, power::DOMAIN_ATTRIBUTES)
                        .describe("every discovered domain")
                        .discovered()
                        .hooks(DomainAttributes),
                    TestCase::new(
                        "power.domain_attributes.invalid_domain",
                        id,
                        power::DOMAIN_ATTRIBUTES,
                    )
                    .describe("domain id past the last domain")
                    .params([0])
                    .invalid_param(0)
                    .expect(Status::NotFound)
                    .hooks(InvalidDomain),
                ],
            ),
            TestSuite::new(
                "power state",
                [
                    TestCase::new("power.state_set", id, power::STATE_SET)
                        .describe("synchronous set of domain 0 to OFF")
                        .params([0, 0, power::STATE_OFF])
                        .precondition(PrecondMarker::Define),
                    TestCase::new("power.state_get", id, power::STATE_GET)
                        .describe("domain 0 reads back OFF")
                        .params([0])
                        .returns([ExpectedReturn::check(power::STATE.fields[0], power::STATE_OFF)])
                        .precondition(PrecondMarker::Use),
                    TestCase::new("power.state_set.async", id, power::STATE_SET)
                        .describe("asynchronous set of domain 1 to OFF")
                        .params([set_async, 1, power::STATE_OFF])
                        .delayed([
                            ExpectedReturn::check(domain_id, 1).decimal(),
                            ExpectedReturn::check(power_state, power::STATE_OFF),
                        ])
                        .hooks(AsyncStateSet { domain: 1 }),
                    TestCase::new("power.state_set.invalid_flags", id, power::STATE_SET)
                        .describe("reserved flag bits set")
                        .params([!set_async, 0, power::STATE_ON])
                        .expect(Status::InvalidParameters),
                    TestCase::new("power.state_set.invalid_domain", id, power::STATE_SET)
                        .describe("domain id past the last domain")
                        .params([0, 0, power::STATE_ON])
                        .invalid_param(1)
                        .expect(Status::NotFound)
                        .hooks(InvalidDomain),
                    TestCase::new("power.state_get.invalid_domain", id, power::STATE_GET)
                        .describe("domain id past the last domain")
                        .params([0])
                        .invalid_param(0)
                        .expect(Status::NotFound)
                        .hooks(InvalidDomain),
                ],
            ),
            TestSuite::new(
                "power state notify",
                [
                    TestCase::new("power.state_notify", id, power::STATE_NOTIFY)
                        .describe("state change on domain 0 is notified")
                        .discovered()
                        .hooks(StateChangeEvent),
                    TestCase::new("power.state_notify.invalid_domain", id, power::STATE_NOTIFY)
                        .describe("domain id past the last domain")
                        .params([0, 1])
                        .invalid_param(0)
                        .expect(Status::NotFound)
                        .hooks(InvalidDomain),
                ],
            ),
        ]
    }

    fn fill_expected(&self, message_id: u8, ctx: &ProtocolContext) -> Option<Vec<ExpectedReturn>> {
        let fixture = ctx.fixture::<PowerExpectations>();
        match message_id {
            common::PROTOCOL_VERSION => {
                let version = fixture.and_then(|f| f.version);
                let &[minor, major] = common::VERSION.fields else {
                    return None;
                };
                Some(vec![
                    ExpectedReturn::check_if(minor, version.map(|v| v & 0xFFFF)),
                    ExpectedReturn::check_if(major, version.map(|v| v >> 16)),
                ])
            }
            common::PROTOCOL_ATTRIBUTES => {
                let mut expected = expect_layout(&power::ATTRIBUTES);
                expected[0] = ExpectedReturn::check_if(
                    power::ATTRIBUTES.fields[0],
                    fixture.and_then(|f| f.num_domains),
                )
                .decimal();
                Some(expected)
            }
            _ => None,
        }
    }
}

fn build() -> Box<dyn ProtocolModule> {
    Box::new(PowerModule)
}

inventory::submit! {
    ProtocolRegistration {
        protocol_id: power::PROTOCOL_ID,
        build,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::orchestrator::PlatformInfo;
    use crate::output::Output;
    use crate::protocols::mock_platform_info;
    use crate::report::ProtocolReport;
    use scmi_platform_mock::PlatformConfig;
    use scmi_wire::protocol_id;

    fn run_power(config: &PlatformConfig) -> ProtocolReport {
        let mut engine = Engine::new(config.transport().unwrap(), Output::Null);
        let info = mock_platform_info(config);
        engine.run_protocol(&PowerModule, info.get(protocol_id::POWER)).0
    }

    #[test]
    fn standard_platform_is_conformant_and_skips_notify() {
        let report = run_power(&PlatformConfig::standard());
        assert_eq!(report.status, CaseStatus::Conformant, "{report:#?}");
        assert!(report.suite("power state notify").unwrap().skipped);
        assert_eq!(report.stats.skips, 1);
        assert_eq!(report.stats.failures, 0);
    }

    #[test]
    fn notify_suite_runs_when_implemented() {
        let mut config = PlatformConfig::standard();
        if let Some(power) = config.power.as_mut() {
            power.state_notify = true;
        }
        let report = run_power(&config);
        assert_eq!(report.status, CaseStatus::Conformant, "{report:#?}");
        let notify = report.case("power.state_notify").unwrap();
        assert_eq!(notify.status, CaseStatus::Conformant);
        assert!(notify.checks.iter().any(|c| c.name == "notification" && c.outcome == CaseStatus::Passed));
    }

    #[test]
    fn async_set_waits_for_the_delayed_response() {
        let report = run_power(&PlatformConfig::standard());
        let case = report.case("power.state_set.async").unwrap();
        assert_eq!(case.status, CaseStatus::Conformant);
        assert!(case.checks.iter().any(|c| c.name == "delayed header" && c.outcome == CaseStatus::Passed));
    }

    #[test]
    fn async_refusal_matches_declared_support() {
        let mut config = PlatformConfig::standard();
        if let Some(power) = config.power.as_mut() {
            power.domains[1].async_support = false;
        }
        let report = run_power(&config);
        assert_eq!(report.status, CaseStatus::Conformant, "{report:#?}");
        let case = report.case("power.state_set.async").unwrap();
        assert_eq!(case.status, CaseStatus::Conformant);
        let status = case.checks.iter().find(|c| c.name == "status").unwrap();
        assert_eq!(status.outcome, CaseStatus::Passed);
        assert!(status.detail.contains("NOT_SUPPORTED"), "{status:?}");
        assert!(!case.checks.iter().any(|c| c.name == "delayed header"));
    }

    #[test]
    fn async_refusal_fails_when_support_is_declared() {
        let mut config = PlatformConfig::standard();
        if let Some(power) = config.power.as_mut() {
            power.domains[1].async_support = false;
        }
        let mut expectations = PowerExpectations::from_mock(config.power.as_ref().unwrap());
        expectations.domains[1].async_support = Some(true);
        let mut info = PlatformInfo::new();
        info.insert(protocol_id::POWER, expectations);

        let mut engine = Engine::new(config.transport().unwrap(), Output::Null);
        let report = engine.run_protocol(&PowerModule, info.get(protocol_id::POWER)).0;

        let case = report.case("power.state_set.async").unwrap();
        assert_eq!(case.status, CaseStatus::NonConformant);
    }
}
