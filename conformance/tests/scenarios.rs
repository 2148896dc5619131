//! End-to-end runs of the conformance engine against mock platforms,
//! some of them deliberately broken.

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use libtest_mimic::{Arguments, Failed, Trial};

use scmi_conformance::context::ProtocolContext;
use scmi_conformance::output::Output;
use scmi_conformance::protocols::{self, BaseExpectations, BaseModule, PowerModule};
use scmi_conformance::report::ProtocolReport;
use scmi_conformance::testcase::{TestCase, TestSuite};
use scmi_conformance::{
    Agent, CaseStatus, Engine, PlatformInfo, ProtocolModule, RunConfig, RunReport, TransportKind,
};
use scmi_platform_mock::{BaseConfig, BaseProtocol, PlatformConfig, PowerConfig, PowerProtocol};
use scmi_transport::{MockTransport, Pending, PlatformHandler, Transport};
use scmi_wire::mailbox::{self, MAILBOX_SIZE};
use scmi_wire::messages::{base, common, power};
use scmi_wire::{Header, Response, Status, protocol_id, string_to_words};

type Reply = fn(&Header, &[u32], &mut Pending) -> Response;

/// Wraps a mock protocol and answers one message id differently.
struct Override<H> {
    inner: H,
    message_id: u8,
    reply: Reply,
}

impl<H: PlatformHandler> PlatformHandler for Override<H> {
    fn protocol_id(&self) -> u8 {
        self.inner.protocol_id()
    }

    fn handle(&mut self, header: &Header, params: &[u32], pending: &mut Pending) -> Response {
        if header.message_id == self.message_id {
            (self.reply)(header, params, pending)
        } else {
            self.inner.handle(header, params, pending)
        }
    }
}

fn agent(info: PlatformInfo) -> Result<Agent, Failed> {
    let mut agent = Agent::new(info);
    agent.register(Box::new(BaseModule)).map_err(|e| e.to_string())?;
    agent.register(Box::new(PowerModule)).map_err(|e| e.to_string())?;
    Ok(agent)
}

fn run_on(mock: MockTransport, info: PlatformInfo) -> Result<RunReport, Failed> {
    let mut engine = Engine::new(Transport::from(mock), Output::Null);
    Ok(agent(info)?.run(&mut engine, &RunConfig::default())?)
}

fn protocol(report: &RunReport, id: u8) -> Result<&ProtocolReport, Failed> {
    report
        .protocol(id)
        .ok_or_else(|| Failed::from(format!("protocol {id:#04x} missing from the report")))
}

fn case_status(report: &ProtocolReport, id: &str) -> Result<CaseStatus, Failed> {
    report
        .case(id)
        .map(|c| c.status)
        .ok_or_else(|| Failed::from(format!("case {id} missing from the report")))
}

fn ensure(condition: bool, message: impl Into<String>) -> Result<(), Failed> {
    if condition { Ok(()) } else { Err(message.into().into()) }
}

fn standard_platform_is_clean() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let config = RunConfig {
        quiet: true,
        ..RunConfig::default()
    };
    let report = scmi_conformance::run(&config, &platform)?;
    ensure(report.is_clean(), format!("unexpected failures:\n{}", report.render_text()))?;
    ensure(report.protocols.len() == 2, "base and power should both run")?;
    ensure(report.not_implemented.is_empty(), "power is implemented")?;
    ensure(
        protocol(&report, protocol_id::POWER)?.status == CaseStatus::Conformant,
        "power should be conformant",
    )
}

fn pagination_walks_every_page() -> Result<(), Failed> {
    for page_size in [1, 4, 32] {
        let platform = PlatformConfig {
            base: BaseConfig {
                list_page_size: page_size,
                ..BaseConfig::default()
            },
            power: Some(PowerConfig::default()),
        };
        let report = run_on(platform.build()?, protocols::mock_platform_info(&platform))?;
        let base = protocol(&report, protocol_id::BASE)?;
        let list = base.case("base.list_protocols").ok_or("list case missing")?;
        ensure(
            list.status == CaseStatus::Conformant,
            format!("page size {page_size}: {:#?}", list.checks),
        )?;
        let sends = list.checks.iter().filter(|c| c.name == "status").count();
        let expected = 6usize.div_ceil(page_size);
        ensure(
            sends == expected,
            format!("page size {page_size}: {sends} calls, expected {expected}"),
        )?;
    }
    Ok(())
}

fn absent_optional_command_skips_its_suite() -> Result<(), Failed> {
    let platform = PlatformConfig {
        base: BaseConfig {
            discover_agent: false,
            ..BaseConfig::default()
        },
        power: Some(PowerConfig::default()),
    };
    let report = run_on(platform.build()?, protocols::mock_platform_info(&platform))?;
    let base = protocol(&report, protocol_id::BASE)?;
    let suite = base.suite("base discover agent").ok_or("suite missing")?;
    ensure(suite.skipped && suite.cases.is_empty(), "suite should be skipped")?;
    ensure(
        case_status(base, "base.message_attributes.discover_agent")? == CaseStatus::Conformant,
        "capability query should pass",
    )?;
    ensure(base.stats.skips == 1, format!("skips: {}", base.stats.skips))?;
    ensure(report.is_clean(), "an absent optional command is not a failure")
}

fn declared_but_missing_capability_fails() -> Result<(), Failed> {
    let platform = PlatformConfig {
        base: BaseConfig {
            discover_agent: false,
            ..BaseConfig::default()
        },
        power: Some(PowerConfig::default()),
    };
    let mut info = protocols::mock_platform_info(&platform);
    let mut fixture = BaseExpectations::from_mock(&platform.base);
    fixture.supported = scmi_conformance::skip::command_bit(base::DISCOVER_AGENT);
    info.insert(protocol_id::BASE, fixture);

    let report = run_on(platform.build()?, info)?;
    let base = protocol(&report, protocol_id::BASE)?;
    ensure(
        case_status(base, "base.message_attributes.discover_agent")? == CaseStatus::NonConformant,
        "capability query should fail",
    )?;
    ensure(
        base.suite("base discover agent").is_some_and(|s| s.skipped),
        "suite should still be skipped",
    )?;
    ensure(base.status == CaseStatus::NonConformant, "base should be non-conformant")
}

fn lenient_platform_fails_negative_case() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let mut mock = MockTransport::new();
    mock.register(Override {
        inner: BaseProtocol::new(platform.base.clone()),
        message_id: base::DISCOVER_AGENT,
        reply: |header, params, _| {
            let mut returns = vec![params.first().copied().unwrap_or(0)];
            returns.extend(string_to_words("anyone", 4));
            Response::new(*header, 0, returns)
        },
    })?;
    mock.register(PowerProtocol::new(PowerConfig::default()))?;

    let report = run_on(mock, protocols::mock_platform_info(&platform))?;
    let base = protocol(&report, protocol_id::BASE)?;
    let invalid = base.case("base.discover_agent.invalid").ok_or("case missing")?;
    ensure(invalid.status == CaseStatus::NonConformant, "out-of-range agent must be rejected")?;
    ensure(
        invalid
            .checks
            .iter()
            .any(|c| c.name == "status" && c.detail.contains("NOT_FOUND")),
        "status check should name the expected status",
    )
}

fn mandatory_command_rejection_is_a_failure() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let mut mock = MockTransport::new();
    mock.register(Override {
        inner: BaseProtocol::new(platform.base.clone()),
        message_id: base::DISCOVER_VENDOR,
        reply: |header, _, _| Response::status_only(*header, Status::NotFound.as_i32()),
    })?;
    mock.register(PowerProtocol::new(PowerConfig::default()))?;

    let report = run_on(mock, protocols::mock_platform_info(&platform))?;
    let base = protocol(&report, protocol_id::BASE)?;
    ensure(
        case_status(base, "base.vendor")? == CaseStatus::NonConformant,
        "NOT_FOUND for a mandatory command must fail",
    )?;
    ensure(base.stats.skips == 0, "nothing should be skipped")?;
    ensure(base.stats.failures == 1, format!("failures: {}", base.stats.failures))
}

fn garbled_capability_answer_skips_its_suite() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let mut mock = MockTransport::new();
    mock.register(Override {
        inner: BaseProtocol::new(platform.base.clone()),
        message_id: common::PROTOCOL_MESSAGE_ATTRIBUTES,
        reply: |header, params, _| match params.first().copied() {
            Some(id) if id == u32::from(base::DISCOVER_AGENT) => {
                let mut garbled = *header;
                garbled.message_id = common::PROTOCOL_VERSION;
                Response::status_only(garbled, Status::Success.as_i32())
            }
            Some(id) if id <= u32::from(base::LAST_MESSAGE_ID) => {
                Response::new(*header, Status::Success.as_i32(), vec![0])
            }
            _ => Response::status_only(*header, Status::NotFound.as_i32()),
        },
    })?;
    mock.register(PowerProtocol::new(PowerConfig::default()))?;

    let report = run_on(mock, protocols::mock_platform_info(&platform))?;
    let base = protocol(&report, protocol_id::BASE)?;
    let gate = base
        .case("base.message_attributes.discover_agent")
        .ok_or("case missing")?;
    ensure(gate.status == CaseStatus::NonConformant, format!("{:#?}", gate.checks))?;
    ensure(
        gate.checks
            .iter()
            .any(|c| c.name == "capability" && c.outcome == CaseStatus::Error),
        "the capability check should be recorded as an error",
    )?;
    let suite = base.suite("base discover agent").ok_or("suite missing")?;
    ensure(
        suite.skipped && suite.cases.is_empty(),
        "suite must not run without an answer about its command",
    )
}

fn failed_precondition_leaves_dependent_untested() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let mut mock = MockTransport::new();
    mock.register(BaseProtocol::new(platform.base.clone()))?;
    mock.register(Override {
        inner: PowerProtocol::new(PowerConfig::default()),
        message_id: power::STATE_SET,
        reply: |header, _, _| Response::status_only(*header, Status::Denied.as_i32()),
    })?;

    let report = run_on(mock, protocols::mock_platform_info(&platform))?;
    let power = protocol(&report, protocol_id::POWER)?;
    ensure(case_status(power, "power.state_set")? == CaseStatus::NonConformant, "set fails")?;
    let get = power.case("power.state_get").ok_or("case missing")?;
    ensure(get.status == CaseStatus::Untested, format!("{:#?}", get.checks))?;
    ensure(
        get.checks.len() == 1 && get.checks[0].outcome == CaseStatus::Skip,
        "dependent case should only record the precondition skip",
    )
}

fn delayed_response_with_wrong_token_fails() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let mut mock = MockTransport::new();
    mock.register(BaseProtocol::new(platform.base.clone()))?;
    mock.register(Override {
        inner: PowerProtocol::new(PowerConfig::default()),
        message_id: power::STATE_SET,
        reply: |header, params, pending| {
            if params.first().is_some_and(|flags| flags & 1 != 0) {
                let stale = header.with_token(header.token ^ 1);
                pending.push_delayed(&stale, 0, params.get(1..).unwrap_or(&[]).to_vec());
            }
            Response::status_only(*header, 0)
        },
    })?;

    let report = run_on(mock, protocols::mock_platform_info(&platform))?;
    let power = protocol(&report, protocol_id::POWER)?;
    let case = power.case("power.state_set.async").ok_or("case missing")?;
    ensure(case.status == CaseStatus::NonConformant, format!("{:#?}", case.checks))?;
    ensure(
        case.checks
            .iter()
            .any(|c| c.name == "delayed header" && c.outcome == CaseStatus::Failed),
        "token mismatch should be reported on the delayed header",
    )
}

/// Two suites; the first stops at an early sentinel.
struct Truncated;

impl ProtocolModule for Truncated {
    fn protocol_id(&self) -> u8 {
        protocol_id::BASE
    }

    fn name(&self) -> &'static str {
        "truncated"
    }

    fn suites(&self) -> Vec<TestSuite> {
        let id = protocol_id::BASE;
        let mut first = TestSuite::new(
            "first",
            [
                TestCase::new("first.version", id, 0),
                TestCase::new("first.never", id, 0),
            ],
        );
        first.cases.insert(1, TestCase::end());
        vec![
            first,
            TestSuite::new("second", [TestCase::new("second.version", id, 0)]),
            TestSuite::new("empty", Vec::new()),
        ]
    }
}

fn sentinel_ends_a_suite() -> Result<(), Failed> {
    let mut engine = Engine::new(PlatformConfig::standard().transport()?, Output::capture());
    let (report, ctx): (ProtocolReport, ProtocolContext) = engine.run_protocol(&Truncated, None);
    ensure(report.case("first.never").is_none(), "case after the sentinel ran")?;
    ensure(report.case("second.version").is_some(), "next suite should run")?;
    ensure(report.stats.tests == 2, format!("tests: {}", report.stats.tests))?;
    ensure(ctx.stats() == report.stats, "context and report disagree")?;
    let empty = report.suite("empty").ok_or("empty suite missing")?;
    ensure(empty.status == CaseStatus::Untested, "empty suite is untested")?;
    let log = engine.output().captured().unwrap_or_default();
    ensure(!log.contains("first.never"), "sentinel-terminated case was logged")
}

fn every_case_is_counted_once() -> Result<(), Failed> {
    let mut platform = PlatformConfig::standard();
    platform.base.discover_agent = false;
    let report = run_on(platform.build()?, protocols::mock_platform_info(&platform))?;
    for protocol in &report.protocols {
        let cases: u32 = protocol.suites.iter().map(|s| s.cases.len() as u32).sum();
        let skipped = protocol.suites.iter().filter(|s| s.skipped).count() as u32;
        ensure(
            protocol.stats.tests == cases,
            format!("{}: {} tests for {} cases", protocol.name, protocol.stats.tests, cases),
        )?;
        let untested = protocol
            .suites
            .iter()
            .flat_map(|s| &s.cases)
            .filter(|c| c.status == CaseStatus::Untested)
            .count() as u32;
        ensure(
            protocol.stats.skips == skipped + untested,
            format!("{}: skips {}", protocol.name, protocol.stats.skips),
        )?;
    }
    let sum: u32 = report.protocols.iter().map(|p| p.stats.tests).sum();
    ensure(report.totals.tests == sum, "totals must add up")
}

fn unlisted_protocol_is_not_implemented() -> Result<(), Failed> {
    let platform = PlatformConfig {
        base: BaseConfig {
            protocols: vec![0x14],
            ..BaseConfig::default()
        },
        power: None,
    };
    let report = run_on(platform.build()?, protocols::mock_platform_info(&platform))?;
    ensure(report.protocols.len() == 1, "only base should run")?;
    ensure(report.not_implemented == vec![protocol_id::POWER], "power should be listed")?;
    ensure(report.is_clean(), report.render_text())
}

fn protocol_filter_must_name_a_module() -> Result<(), Failed> {
    let config = RunConfig {
        quiet: true,
        protocols: vec![0x14],
        ..RunConfig::default()
    };
    match scmi_conformance::run(&config, &PlatformConfig::standard()) {
        Err(scmi_conformance::RunError::Registry(scmi_conformance::RegistryError::UnknownProtocol(
            0x14,
        ))) => Ok(()),
        other => Err(format!("unexpected result: {other:?}").into()),
    }
}

fn report_serializes_to_json() -> Result<(), Failed> {
    let platform = PlatformConfig::standard();
    let report = run_on(platform.build()?, protocols::mock_platform_info(&platform))?;
    let json = facet_json::to_string(&report).map_err(|e| e.to_string())?;
    ensure(json.contains("\"base.list_protocols\""), "case ids should be present")?;
    ensure(json.contains("\"totals\""), "totals should be present")
}

/// Serves the base protocol over mailbox files until `stop` is set.
fn spawn_mailbox_platform(
    message: PathBuf,
    signal: PathBuf,
    config: BaseConfig,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let message = OpenOptions::new().read(true).write(true).open(message).unwrap();
        let signal = OpenOptions::new().read(true).write(true).open(signal).unwrap();
        let mut handler = BaseProtocol::new(config);
        let mut pending = Pending::default();
        let mut served = 0;
        while !stop.load(Ordering::Acquire) {
            let mut bell = [0u8; 1];
            if signal.read_at(&mut bell, 0).unwrap() != 1 || bell[0] != 1 {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            let mut buf = vec![0u8; MAILBOX_SIZE];
            message.read_exact_at(&mut buf, 0).unwrap();
            // Clear the doorbell before answering so the agent's next ring
            // cannot be overwritten.
            signal.write_all_at(&[0], 0).unwrap();
            let (header, params) = mailbox::decode_command(&buf).unwrap();
            let response = if header.protocol_id == base::PROTOCOL_ID {
                handler.handle(&header, &params, &mut pending)
            } else {
                Response::status_only(header, Status::NotSupported.as_i32())
            };
            message
                .write_all_at(&mailbox::encode_response(&response).unwrap(), 0)
                .unwrap();
            served += 1;
        }
        served
    })
}

fn mailbox_run_against_platform_thread() -> Result<(), Failed> {
    let dir = tempfile::tempdir()?;
    let message = dir.path().join("message");
    let signal = dir.path().join("signal");
    std::fs::write(&message, [0u8; MAILBOX_SIZE])?;
    std::fs::write(&signal, [0u8; 1])?;

    let base_config = BaseConfig {
        protocols: Vec::new(),
        ..BaseConfig::default()
    };
    let stop = Arc::new(AtomicBool::new(false));
    let platform = spawn_mailbox_platform(
        message.clone(),
        signal.clone(),
        base_config,
        Arc::clone(&stop),
    );

    let log = dir.path().join("run.log");
    let config = RunConfig {
        transport: TransportKind::Mailbox,
        message: Some(message),
        signal: Some(signal),
        timeout: Some(Duration::from_secs(5)),
        log: Some(log.clone()),
        ..RunConfig::default()
    };
    let result = scmi_conformance::run(&config, &PlatformConfig::standard());
    stop.store(true, Ordering::Release);
    let served = platform.join().map_err(|_| "platform thread panicked")?;
    let report = result?;

    ensure(report.transport == "mailbox", "report should name the transport")?;
    ensure(report.is_clean(), report.render_text())?;
    ensure(report.not_implemented == vec![protocol_id::POWER], "power is not listed")?;
    ensure(served > 10, format!("platform served {served} commands"))?;
    let text = std::fs::read_to_string(&log)?;
    ensure(text.contains("[base.vendor]"), "log file should carry case lines")
}

fn main() {
    let args = Arguments::from_args();

    let scenarios: Vec<(&str, fn() -> Result<(), Failed>)> = vec![
        ("standard_platform_is_clean", standard_platform_is_clean),
        ("pagination_walks_every_page", pagination_walks_every_page),
        ("absent_optional_command_skips_its_suite", absent_optional_command_skips_its_suite),
        ("declared_but_missing_capability_fails", declared_but_missing_capability_fails),
        ("lenient_platform_fails_negative_case", lenient_platform_fails_negative_case),
        ("mandatory_command_rejection_is_a_failure", mandatory_command_rejection_is_a_failure),
        ("garbled_capability_answer_skips_its_suite", garbled_capability_answer_skips_its_suite),
        (
            "failed_precondition_leaves_dependent_untested",
            failed_precondition_leaves_dependent_untested,
        ),
        ("delayed_response_with_wrong_token_fails", delayed_response_with_wrong_token_fails),
        ("sentinel_ends_a_suite", sentinel_ends_a_suite),
        ("every_case_is_counted_once", every_case_is_counted_once),
        ("unlisted_protocol_is_not_implemented", unlisted_protocol_is_not_implemented),
        ("protocol_filter_must_name_a_module", protocol_filter_must_name_a_module),
        ("report_serializes_to_json", report_serializes_to_json),
        ("mailbox_run_against_platform_thread", mailbox_run_against_platform_thread),
    ];

    let trials = scenarios
        .into_iter()
        .map(|(name, scenario)| Trial::test(name, scenario))
        .collect();

    libtest_mimic::run(&args, trials).exit();
}
