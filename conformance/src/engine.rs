//! The suite/case state machine.
//!
//! For each protocol the engine walks the suite table in order, skipping
//! suites whose flag is set, and runs every case up to the sentinel through
//! [`Engine::execute_and_assert`]. Each case goes through the same steps:
//!
//! 1. Fill the expected returns from the fixture, if a filler exists.
//! 2. Run the custom `execute` hook, or send the static parameters with the
//!    invalid-parameter slot overwritten.
//! 3. Compare the status.
//! 4. On SUCCESS, extract and compare each expected return.
//! 5. Run `post_process`, then await a delayed response if one is declared.
//!    A send that fails runs `on_transport_error` instead.
//! 6. Classify the case and roll its statistics up.

use std::sync::Arc;

use scmi_transport::{Transport, TransportError};
use scmi_wire::{
    ExpectedStatus, Header, Response, STATUS_UNSPECIFIED, Status, TOKEN_MAX, check_reserved_zero,
    status_name,
};

use crate::context::{Fixture, ProtocolContext};
use crate::orchestrator::ProtocolModule;
use crate::output::Output;
use crate::precondition::{self, PreconditionSlot};
use crate::report::{CaseReport, CaseStatus, ProtocolReport, SuiteReport};
use crate::testcase::{
    CheckMode, Execution, Expected, ExpectedReturn, Parameters, PrecondMarker, TestCase,
    ValueKind,
};

pub struct Engine {
    transport: Transport,
    output: Output,
    next_token: u16,
}

impl Engine {
    pub fn new(transport: Transport, output: Output) -> Self {
        Self {
            transport,
            output,
            next_token: 0,
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.backend_name()
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Output {
        &mut self.output
    }

    /// Tokens increase per command and wrap at 10 bits.
    fn take_token(&mut self) -> u16 {
        let token = self.next_token;
        self.next_token = (token + 1) & TOKEN_MAX;
        token
    }

    /// Run every suite of `module` and return its report together with the
    /// final context (discovered entities, stats).
    pub fn run_protocol(
        &mut self,
        module: &dyn ProtocolModule,
        fixture: Option<Arc<Fixture>>,
    ) -> (ProtocolReport, ProtocolContext) {
        let suites = module.suites();
        let mut ctx = ProtocolContext::new(
            module.protocol_id(),
            module.name(),
            &suites,
            module.discovery_suite(),
            fixture,
        );
        let mut report = ProtocolReport::new(module.name(), module.protocol_id());

        ctx.setup();
        tracing::info!(protocol = module.name(), id = module.protocol_id(), "protocol start");
        self.output.log_output(&format!(
            "\n{} protocol ({:#04x})",
            module.name(),
            module.protocol_id()
        ));

        for (index, suite) in suites.iter().enumerate() {
            ctx.enter_suite(index);
            if !ctx.must_run(index) {
                tracing::info!(suite = suite.name, "suite skipped");
                self.output
                    .log_output(&format!("  {}: {}", suite.name, CaseStatus::Skip));
                ctx.record_skipped_suite();
                ctx.finish_suite();
                report.push_suite(SuiteReport::skipped(suite.name));
                continue;
            }

            tracing::debug!(suite = suite.name, cases = suite.len(), "suite start");
            self.output.log_output(&format!("  {}", suite.name));
            let mut suite_report = SuiteReport::new(suite.name);
            for (case_index, case) in suite.iter().enumerate() {
                ctx.enter_case(case_index);
                let case_report = self.execute_and_assert(module, &mut ctx, case);
                suite_report.push_case(case_report);
            }
            suite_report.finish();
            ctx.finish_suite();
            report.push_suite(suite_report);
        }

        report.finish();
        ctx.finish_protocol();
        tracing::info!(
            protocol = module.name(),
            status = %report.status,
            stats = %report.stats,
            "protocol done"
        );
        self.output.log_output(&format!("  {}", report.stats));
        (report, ctx)
    }

    /// Execute one case and classify it.
    pub fn execute_and_assert(
        &mut self,
        module: &dyn ProtocolModule,
        ctx: &mut ProtocolContext,
        case: &TestCase,
    ) -> CaseReport {
        let mut report = CaseReport::new(case.id, case.message_id);
        let line = format!("    [{}] {}", case.id, case.description);
        self.output.log_output(line.trim_end());

        let gate = match case.precondition {
            PrecondMarker::Use => precondition::check_use(ctx.precondition()),
            _ => Ok(()),
        };

        let mut last_status = None;
        match gate {
            Err(reason) => {
                self.output
                    .log_output(&format!("      precondition {} {}", CaseStatus::Skip, reason));
                report.record("precondition", CaseStatus::Skip, reason);
            }
            Ok(()) => {
                let expected = case
                    .hooks
                    .fill_expected(case, ctx)
                    .or_else(|| module.fill_expected(case.message_id, ctx))
                    .unwrap_or_else(|| case.returns.clone());

                let hooks = Arc::clone(&case.hooks);
                let mut run = CaseRun {
                    engine: &mut *self,
                    ctx: &mut *ctx,
                    case,
                    expected,
                    report: &mut report,
                    last_status: None,
                };
                match hooks.execute(&mut run) {
                    Execution::Handled => {}
                    Execution::Default => run.run_static(),
                }
                last_status = run.last_status;
            }
        }

        let status = report.finish();
        if case.precondition == PrecondMarker::Define {
            ctx.define_precondition(PreconditionSlot::new(
                status,
                last_status.unwrap_or(STATUS_UNSPECIFIED),
            ));
        }
        ctx.record_case(status);
        tracing::debug!(case = case.id, %status, "case done");
        self.output.log_output(&format!("      => {status}"));
        report
    }
}

/// Live view of one executing case, handed to case hooks.
pub struct CaseRun<'a> {
    engine: &'a mut Engine,
    ctx: &'a mut ProtocolContext,
    case: &'a TestCase,
    expected: Vec<ExpectedReturn>,
    report: &'a mut CaseReport,
    last_status: Option<i32>,
}

impl<'a> CaseRun<'a> {
    pub fn case(&self) -> &'a TestCase {
        self.case
    }

    pub fn ctx(&self) -> &ProtocolContext {
        &*self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut ProtocolContext {
        &mut *self.ctx
    }

    pub fn fixture<T: 'static>(&self) -> Option<&T> {
        self.ctx.fixture::<T>()
    }

    pub fn expected(&self) -> &[ExpectedReturn] {
        &self.expected
    }

    /// Replace the expected returns for the following sends.
    pub fn set_expected(&mut self, expected: Vec<ExpectedReturn>) {
        self.expected = expected;
    }

    /// Append a check record and echo it to the output.
    pub fn record(&mut self, name: impl Into<String>, outcome: CaseStatus, detail: impl Into<String>) {
        let record = self.report.record(name, outcome, detail);
        if matches!(outcome, CaseStatus::Failed | CaseStatus::Error) {
            tracing::warn!(
                case = self.case.id,
                check = %record.name,
                detail = %record.detail,
                "{outcome}"
            );
        }
        let line = format!("      {:<28} {} {}", record.name, record.outcome, record.detail);
        self.engine.output.log_output(line.trim_end());
    }

    /// Send the case's command with `params`. A transport failure is
    /// recorded as a FAILED check and yields `None`.
    pub fn send(&mut self, params: &[u32]) -> Option<Response> {
        self.send_to(self.case.message_id, params)
    }

    /// Send another command of the same protocol, e.g. to set up state.
    pub fn send_to(&mut self, message_id: u8, params: &[u32]) -> Option<Response> {
        let header = Header::command(self.case.protocol_id, message_id)
            .with_token(self.engine.take_token());
        match self.engine.transport.send(header, params) {
            Ok(response) => {
                self.last_status = Some(response.status);
                Some(response)
            }
            Err(error) => {
                self.record_transport_error("send", &error);
                None
            }
        }
    }

    /// Send and run the status, return-value, post-process and delayed
    /// response steps against the case's expected status.
    pub fn send_and_assert(&mut self, params: &[u32]) -> Option<Response> {
        let case = self.case;
        let expected = case
            .hooks
            .expected_status(case, self.ctx())
            .unwrap_or(case.expected_status);
        self.send_and_assert_with(params, expected)
    }

    pub fn send_and_assert_with(
        &mut self,
        params: &[u32],
        expected: ExpectedStatus,
    ) -> Option<Response> {
        let Some(response) = self.send(params) else {
            let hooks = Arc::clone(&self.case.hooks);
            hooks.on_transport_error(self);
            return None;
        };
        self.assert_status("status", expected, response.status);

        if response.status == Status::Success.as_i32() {
            let expected = std::mem::take(&mut self.expected);
            self.assert_returns(&expected, &response.returns);
            self.expected = expected;
        }

        let hooks = Arc::clone(&self.case.hooks);
        hooks.post_process(self, &response);

        let case = self.case;
        if response.status == Status::Success.as_i32()
            && let Some(delayed) = &case.delayed
        {
            self.await_delayed(&response.header, delayed);
        }
        Some(response)
    }

    /// Default execution: static parameters with the invalid slot applied.
    fn run_static(&mut self) {
        let case = self.case;
        let mut params = match &case.params {
            Parameters::Static(params) => params.clone(),
            Parameters::Discovered => {
                self.record(
                    "parameters",
                    CaseStatus::Error,
                    "discovery-driven case has no execute hook",
                );
                return;
            }
        };
        if let Some(offset) = case.invalid_param.offset() {
            let Some(slot) = params.get_mut(offset) else {
                self.record(
                    "parameters",
                    CaseStatus::Error,
                    format!("invalid parameter slot {offset} out of range"),
                );
                return;
            };
            *slot = case.hooks.invalid_value(self.ctx());
        }
        self.send_and_assert(&params);
    }

    pub fn assert_status(&mut self, name: &str, expected: ExpectedStatus, observed: i32) {
        match expected {
            ExpectedStatus::Unspecified => {
                self.record(name, CaseStatus::Info, status_name(observed));
            }
            ExpectedStatus::Exact(status) if status.as_i32() == observed => {
                self.record(name, CaseStatus::Passed, status_name(observed));
            }
            ExpectedStatus::Exact(status) => {
                self.record(
                    name,
                    CaseStatus::Failed,
                    format!("expected {}, got {}", status, status_name(observed)),
                );
            }
        }
    }

    pub fn assert_returns(&mut self, expected: &[ExpectedReturn], returns: &[u32]) {
        for desc in expected {
            let (outcome, detail) = evaluate(desc, returns);
            self.record(desc.field.name, outcome, detail);
        }
    }

    fn await_delayed(&mut self, sent: &Header, expected: &[ExpectedReturn]) {
        let response = match self.engine.transport.wait_for_delayed_response() {
            Ok(response) => response,
            Err(error) => {
                self.record_transport_error("delayed response", &error);
                return;
            }
        };
        let header = response.header;
        if sent.matches(&header) && sent.token == header.token {
            self.record("delayed header", CaseStatus::Passed, header.to_string());
        } else {
            self.record(
                "delayed header",
                CaseStatus::Failed,
                format!("sent {sent}, received {header}"),
            );
        }
        self.assert_status(
            "delayed status",
            ExpectedStatus::Exact(Status::Success),
            response.status,
        );
        if response.status == Status::Success.as_i32() {
            self.assert_returns(expected, &response.returns);
        }
    }

    /// Block for the next notification. A transport failure is recorded
    /// as a FAILED check and yields `None`.
    pub fn wait_for_notification(&mut self) -> Option<Response> {
        match self.engine.transport.wait_for_notification() {
            Ok(notification) => Some(notification),
            Err(error) => {
                self.record_transport_error("notification", &error);
                None
            }
        }
    }

    fn record_transport_error(&mut self, name: &str, error: &TransportError) {
        self.record(name, CaseStatus::Failed, error.to_string());
    }
}

/// Compare one expected return against the returned words.
pub fn evaluate(desc: &ExpectedReturn, returns: &[u32]) -> (CaseStatus, String) {
    let field = &desc.field;
    let missing = || {
        (
            CaseStatus::Failed,
            format!("not returned (payload has {} words)", returns.len()),
        )
    };

    if desc.kind == ValueKind::Text {
        let Some(observed) = field.read_string(returns) else {
            return missing();
        };
        return match (desc.mode, &desc.expected) {
            (CheckMode::PrintOnly, _) | (_, Expected::DontCare) => {
                (CaseStatus::Info, format!("\"{observed}\""))
            }
            (CheckMode::Check, Expected::Text(expected)) if *expected == observed => {
                (CaseStatus::Passed, format!("\"{observed}\""))
            }
            (CheckMode::Check, Expected::Text(expected)) => (
                CaseStatus::Failed,
                format!("expected \"{expected}\", got \"{observed}\""),
            ),
            (CheckMode::Check, Expected::Value(_)) => (
                CaseStatus::Error,
                "numeric expectation on a string field".into(),
            ),
        };
    }

    let Some(&word) = returns.get(field.offset) else {
        return missing();
    };

    if desc.kind == ValueKind::Reserved {
        return match check_reserved_zero(word, field.range()) {
            Ok(()) => (CaseStatus::Passed, format!("{} clear", field.range())),
            Err(bits) => (
                CaseStatus::Failed,
                format!("reserved bits {} set: {bits:#x}", field.range()),
            ),
        };
    }

    let observed = field.range().get(word);
    let show = |value: u32| match desc.kind {
        ValueKind::Decimal => value.to_string(),
        _ => format!("{value:#x}"),
    };
    match (desc.mode, &desc.expected) {
        (CheckMode::PrintOnly, _) | (_, Expected::DontCare) => (CaseStatus::Info, show(observed)),
        (CheckMode::Check, Expected::Value(expected)) if *expected == observed => {
            (CaseStatus::Passed, show(observed))
        }
        (CheckMode::Check, Expected::Value(expected)) => (
            CaseStatus::Failed,
            format!("expected {}, got {}", show(*expected), show(observed)),
        ),
        (CheckMode::Check, Expected::Text(_)) => (
            CaseStatus::Error,
            "string expectation on a numeric field".into(),
        ),
    }
}
