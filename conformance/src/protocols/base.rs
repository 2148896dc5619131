//! Base protocol (0x10): identification, protocol and agent discovery.

use scmi_platform_mock::BaseConfig;
use scmi_wire::messages::{base, common};
use scmi_wire::{Response, Status};

use crate::context::{ProtocolContext, entity};
use crate::engine::CaseRun;
use crate::orchestrator::{ProtocolModule, ProtocolRegistration};
use crate::protocols::{INVALID_MESSAGE_ID, MandatoryCommands, expect_layout};
use crate::report::CaseStatus;
use crate::skip::{ALL_COMMANDS, Capability, GateSuite, command_bit};
use crate::testcase::{CaseHooks, Execution, ExpectedReturn, TestCase, TestSuite};

pub const DISCOVERY_SUITE: usize = 0;
pub const IDENTIFICATION_SUITE: usize = 1;
pub const PROTOCOL_LIST_SUITE: usize = 2;
pub const AGENT_SUITE: usize = 3;

const MANDATORY: &[u8] = &[
    common::PROTOCOL_VERSION,
    common::PROTOCOL_ATTRIBUTES,
    common::PROTOCOL_MESSAGE_ATTRIBUTES,
    base::DISCOVER_VENDOR,
    base::DISCOVER_SUB_VENDOR,
    base::DISCOVER_IMPLEMENTATION_VERSION,
    base::DISCOVER_LIST_PROTOCOLS,
];

/// What the platform declares about its base protocol. `None` fields are
/// reported instead of checked.
#[derive(Debug, Clone, Default)]
pub struct BaseExpectations {
    pub version: Option<u32>,
    pub vendor: Option<String>,
    pub sub_vendor: Option<String>,
    pub implementation_version: Option<u32>,
    pub num_protocols: Option<u32>,
    pub num_agents: Option<u32>,
    /// Optional commands declared, one bit per message id, or [`ALL_COMMANDS`].
    pub flags_mask: u32,
    /// Declared optional commands that must be implemented.
    pub supported: u32,
    /// Agent names by agent id, starting at 1.
    pub agent_names: Vec<String>,
}

impl BaseExpectations {
    pub fn from_mock(config: &BaseConfig) -> Self {
        Self {
            version: Some(config.version),
            vendor: Some(config.vendor.clone()),
            sub_vendor: Some(config.sub_vendor.clone()),
            implementation_version: Some(config.implementation_version),
            num_protocols: Some(config.protocols.len() as u32),
            num_agents: Some(config.agents.len() as u32),
            flags_mask: ALL_COMMANDS,
            supported: if config.discover_agent {
                command_bit(base::DISCOVER_AGENT)
            } else {
                0
            },
            agent_names: config.agents.clone(),
        }
    }
}

fn discover_agent_capability(ctx: &ProtocolContext) -> Capability {
    match ctx.fixture::<BaseExpectations>() {
        Some(fixture) => Capability {
            flags_mask: fixture.flags_mask,
            must_be_supported: fixture.supported & command_bit(base::DISCOVER_AGENT) != 0,
        },
        None => Capability {
            flags_mask: 0,
            must_be_supported: false,
        },
    }
}

/// Records the protocol and agent counts for later suites.
struct RecordAttributes;

impl CaseHooks for RecordAttributes {
    fn post_process(&self, run: &mut CaseRun<'_>, response: &Response) {
        let Some(&word) = response.returns.first() else {
            return;
        };
        if response.status != Status::Success.as_i32() {
            return;
        }
        let protocols = base::NUM_PROTOCOLS.get(word);
        let agents = base::NUM_AGENTS.get(word);
        let discovered = run.ctx_mut().discovered_mut();
        discovered.set_value(entity::NUM_PROTOCOLS, protocols);
        discovered.set_value(entity::NUM_AGENTS, agents);
        discovered.record(entity::AGENTS, 1..=agents);
    }
}

/// Walks DISCOVER_LIST_PROTOCOLS page by page until every protocol the
/// attributes announced has been listed.
struct ListProtocols;

impl CaseHooks for ListProtocols {
    fn execute(&self, run: &mut CaseRun<'_>) -> Execution {
        let Some(total) = run.ctx().discovered().value(entity::NUM_PROTOCOLS) else {
            run.record(
                "protocol count",
                CaseStatus::Error,
                "attributes did not report a protocol count",
            );
            return Execution::Handled;
        };

        let mut found: Vec<u32> = Vec::new();
        let mut skip = 0u32;
        while skip < total {
            let Some(response) = run.send_and_assert(&[skip]) else {
                break;
            };
            if response.status != Status::Success.as_i32() {
                break;
            }
            let count = response.word(0).unwrap_or(0);
            if count == 0 {
                run.record(
                    "page",
                    CaseStatus::Failed,
                    format!("empty page at skip {skip} of {total}"),
                );
                break;
            }
            let words = response.returns.get(1..).unwrap_or(&[]);
            let ids = base::unpack_protocols(words, count as usize);
            if ids.len() != count as usize {
                run.record(
                    "page",
                    CaseStatus::Failed,
                    format!("page announces {count} protocols but carries {}", ids.len()),
                );
                break;
            }
            found.extend(ids.into_iter().map(u32::from));
            skip += count;
        }

        if found.len() == total as usize {
            run.record("protocols listed", CaseStatus::Passed, format!("{total}"));
        } else {
            run.record(
                "protocols listed",
                CaseStatus::Failed,
                format!("expected {total}, listed {}", found.len()),
            );
        }

        let mut sorted = found.clone();
        sorted.sort_unstable();
        sorted.dedup();
        let base_listed = found.contains(&u32::from(base::PROTOCOL_ID));
        if sorted.len() == found.len() && !base_listed {
            let ids: Vec<String> = found.iter().map(|id| format!("{id:#x}")).collect();
            run.record("protocol ids", CaseStatus::Info, ids.join(" "));
        } else {
            run.record(
                "protocol ids",
                CaseStatus::Failed,
                "list repeats a protocol or names the base protocol",
            );
        }

        run.ctx_mut().discovered_mut().record(entity::PROTOCOLS, found);
        Execution::Handled
    }
}

/// One past the last protocol: an out-of-range skip.
struct InvalidSkip;

impl CaseHooks for InvalidSkip {
    fn invalid_value(&self, ctx: &ProtocolContext) -> u32 {
        ctx.discovered()
            .value(entity::NUM_PROTOCOLS)
            .map_or(u32::MAX, |n| n + 1)
    }
}

/// DISCOVER_AGENT for every agent the attributes announced.
struct DiscoverAgents;

impl CaseHooks for DiscoverAgents {
    fn execute(&self, run: &mut CaseRun<'_>) -> Execution {
        let agents = run.ctx().discovered().list(entity::AGENTS).to_vec();
        if agents.is_empty() {
            run.record("agents", CaseStatus::Skip, "no agents discovered");
            return Execution::Handled;
        }
        for agent_id in agents {
            let name = run.fixture::<BaseExpectations>().and_then(|f| {
                let index = agent_id.checked_sub(1)? as usize;
                f.agent_names.get(index).cloned()
            });
            run.set_expected(vec![
                ExpectedReturn::check(base::AGENT.fields[0], agent_id).decimal(),
                ExpectedReturn::check_text_if(base::AGENT.fields[1], name.as_deref()),
            ]);
            run.send_and_assert(&[agent_id]);
        }
        Execution::Handled
    }
}

/// One past the last agent.
struct InvalidAgent;

impl CaseHooks for InvalidAgent {
    fn invalid_value(&self, ctx: &ProtocolContext) -> u32 {
        ctx.discovered()
            .value(entity::NUM_AGENTS)
            .map_or(u32::MAX, |n| n + 1)
    }
}

pub struct BaseModule;

impl ProtocolModule for BaseModule {
    fn protocol_id(&self) -> u8 {
        base::PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "base"
    }

    fn discovery_suite(&self) -> usize {
        DISCOVERY_SUITE
    }

    fn suites(&self) -> Vec<TestSuite> {
        let id = base::PROTOCOL_ID;
        vec![
            TestSuite::new(
                "base discovery",
                [
                    TestCase::new("base.version", id, common::PROTOCOL_VERSION)
                        .describe("protocol version"),
                    TestCase::new("base.attributes", id, common::PROTOCOL_ATTRIBUTES)
                        .describe("protocol and agent counts")
                        .hooks(RecordAttributes),
                    TestCase::new(
                        "base.message_attributes.mandatory",
                        id,
                        common::PROTOCOL_MESSAGE_ATTRIBUTES,
                    )
                    .describe("mandatory commands are implemented")
                    .returns(expect_layout(&common::MESSAGE_ATTRIBUTES))
                    .hooks(MandatoryCommands(MANDATORY)),
                    TestCase::new(
                        "base.message_attributes.discover_agent",
                        id,
                        common::PROTOCOL_MESSAGE_ATTRIBUTES,
                    )
                    .describe("DISCOVER_AGENT capability")
                    .params([u32::from(base::DISCOVER_AGENT)])
                    .expect_any()
                    .returns(expect_layout(&common::MESSAGE_ATTRIBUTES))
                    .hooks(GateSuite {
                        suite: AGENT_SUITE,
                        message_id: base::DISCOVER_AGENT,
                        capability: discover_agent_capability,
                    }),
                    TestCase::new(
                        "base.message_attributes.invalid",
                        id,
                        common::PROTOCOL_MESSAGE_ATTRIBUTES,
                    )
                    .describe("attributes of an undefined command")
                    .params([u32::from(INVALID_MESSAGE_ID)])
                    .expect(Status::NotFound),
                    TestCase::new("base.invalid_message", id, INVALID_MESSAGE_ID)
                        .describe("undefined message id")
                        .expect(Status::NotFound),
                ],
            ),
            TestSuite::new(
                "base identification",
                [
                    TestCase::new("base.vendor", id, base::DISCOVER_VENDOR).describe("vendor"),
                    TestCase::new("base.sub_vendor", id, base::DISCOVER_SUB_VENDOR)
                        .describe("sub-vendor"),
                    TestCase::new(
                        "base.implementation_version",
                        id,
                        base::DISCOVER_IMPLEMENTATION_VERSION,
                    )
                    .describe("implementation version"),
                ],
            ),
            TestSuite::new(
                "base protocol list",
                [
                    TestCase::new("base.list_protocols", id, base::DISCOVER_LIST_PROTOCOLS)
                        .describe("list every implemented protocol")
                        .discovered()
                        .returns([ExpectedReturn::show(base::LIST_PROTOCOLS.fields[0]).decimal()])
                        .hooks(ListProtocols),
                    TestCase::new(
                        "base.list_protocols.invalid_skip",
                        id,
                        base::DISCOVER_LIST_PROTOCOLS,
                    )
                    .describe("skip past the last protocol")
                    .params([0])
                    .invalid_param(0)
                    .expect(Status::InvalidParameters)
                    .hooks(InvalidSkip),
                ],
            ),
            TestSuite::new(
                "base discover agent",
                [
                    TestCase::new("base.discover_agent", id, base::DISCOVER_AGENT)
                        .describe("every announced agent")
                        .discovered()
                        .hooks(DiscoverAgents),
                    TestCase::new("base.discover_agent.invalid", id, base::DISCOVER_AGENT)
                        .describe("agent id past the last agent")
                        .params([0])
                        .invalid_param(0)
                        .expect(Status::NotFound)
                        .hooks(InvalidAgent),
                ],
            ),
        ]
    }

    fn fill_expected(&self, message_id: u8, ctx: &ProtocolContext) -> Option<Vec<ExpectedReturn>> {
        let fixture = ctx.fixture::<BaseExpectations>();
        let expected = match message_id {
            common::PROTOCOL_VERSION => {
                let version = fixture.and_then(|f| f.version);
                let &[minor, major] = common::VERSION.fields else {
                    return None;
                };
                vec![
                    ExpectedReturn::check_if(minor, version.map(|v| v & 0xFFFF)),
                    ExpectedReturn::check_if(major, version.map(|v| v >> 16)),
                ]
            }
            common::PROTOCOL_ATTRIBUTES => {
                let &[protocols, agents, reserved] = base::ATTRIBUTES.fields else {
                    return None;
                };
                vec![
                    ExpectedReturn::check_if(protocols, fixture.and_then(|f| f.num_protocols))
                        .decimal(),
                    ExpectedReturn::check_if(agents, fixture.and_then(|f| f.num_agents)).decimal(),
                    ExpectedReturn::reserved(reserved),
                ]
            }
            base::DISCOVER_VENDOR => vec![ExpectedReturn::check_text_if(
                base::VENDOR.fields[0],
                fixture.and_then(|f| f.vendor.as_deref()),
            )],
            base::DISCOVER_SUB_VENDOR => vec![ExpectedReturn::check_text_if(
                base::VENDOR.fields[0],
                fixture.and_then(|f| f.sub_vendor.as_deref()),
            )],
            base::DISCOVER_IMPLEMENTATION_VERSION => vec![ExpectedReturn::check_if(
                base::IMPLEMENTATION_VERSION.fields[0],
                fixture.and_then(|f| f.implementation_version),
            )],
            _ => return None,
        };
        Some(expected)
    }
}

fn build() -> Box<dyn ProtocolModule> {
    Box::new(BaseModule)
}

inventory::submit! {
    ProtocolRegistration {
        protocol_id: base::PROTOCOL_ID,
        build,
    }
}
