//! Declarative test cases and suites.

use std::fmt;
use std::sync::Arc;

use scmi_wire::{ExpectedStatus, Field, MAX_PAYLOAD_WORDS, Response, Status};

use crate::context::ProtocolContext;
use crate::engine::CaseRun;

/// Identity reserved for the case that terminates a suite.
pub const END_OF_SUITE: &str = "END";

/// How an observed value is extracted and shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Hex,
    Decimal,
    /// NUL-padded string spanning `field.words` words.
    Text,
    /// Sub-word field given by `field.bits`.
    Bits,
    /// Every bit in `field.bits` must be zero.
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Value(u32),
    Text(String),
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Compare against the expected value: PASSED or FAILED.
    Check,
    /// Report the observed value as INFO.
    PrintOnly,
}

/// Where and how to read one return value, and what to expect of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedReturn {
    pub field: Field,
    pub kind: ValueKind,
    pub expected: Expected,
    pub mode: CheckMode,
}

impl ExpectedReturn {
    /// Print-only descriptor; the kind follows from the field shape.
    pub fn show(field: Field) -> Self {
        let kind = if field.words > 1 {
            ValueKind::Text
        } else if field.bits.is_some() {
            ValueKind::Bits
        } else {
            ValueKind::Hex
        };
        Self {
            field,
            kind,
            expected: Expected::DontCare,
            mode: CheckMode::PrintOnly,
        }
    }

    pub fn check(field: Field, value: u32) -> Self {
        Self {
            expected: Expected::Value(value),
            mode: CheckMode::Check,
            ..Self::show(field)
        }
    }

    pub fn check_text(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            kind: ValueKind::Text,
            expected: Expected::Text(value.into()),
            mode: CheckMode::Check,
        }
    }

    /// Reserved-bits check on a sub-word field.
    pub fn reserved(field: Field) -> Self {
        Self {
            field,
            kind: ValueKind::Reserved,
            expected: Expected::Value(0),
            mode: CheckMode::Check,
        }
    }

    pub fn decimal(mut self) -> Self {
        self.kind = ValueKind::Decimal;
        self
    }

    /// Check when the fixture knows the value, print otherwise.
    pub fn check_if(field: Field, value: Option<u32>) -> Self {
        match value {
            Some(value) => Self::check(field, value),
            None => Self::show(field),
        }
    }

    pub fn check_text_if(field: Field, value: Option<&str>) -> Self {
        match value {
            Some(value) => Self::check_text(field, value),
            None => Self::show(field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameters {
    Static(Vec<u32>),
    /// Built at run time by the case's `execute` hook from discovered entities.
    Discovered,
}

/// Parameter slot to corrupt for a negative test, stored as `offset + 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidParam(u8);

impl InvalidParam {
    pub const NONE: InvalidParam = InvalidParam(0);

    /// Panics if `offset` is not a word of the mailbox payload.
    pub const fn at(offset: u8) -> Self {
        assert!(
            (offset as usize) < MAX_PAYLOAD_WORDS,
            "invalid parameter offset past the mailbox payload"
        );
        InvalidParam(offset + 1)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn offset(self) -> Option<usize> {
        match self.0 {
            0 => None,
            n => Some(n as usize - 1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrecondMarker {
    #[default]
    None,
    /// Store this case's outcome in the protocol's precondition slot.
    Define,
    /// Run only if the stored precondition succeeded.
    Use,
}

/// What a custom `execute` hook did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Not overridden; the engine sends the static parameters.
    Default,
    /// The hook sent everything it needed through the [`CaseRun`].
    Handled,
}

/// Per-case strategy. Every method defaults to doing nothing.
pub trait CaseHooks: Send + Sync {
    /// Build the expected returns from the protocol fixture. `None` keeps
    /// whatever the case or the protocol module declares.
    fn fill_expected(&self, _case: &TestCase, _ctx: &ProtocolContext) -> Option<Vec<ExpectedReturn>> {
        None
    }

    /// Status the platform should answer with. `None` keeps the case's own.
    fn expected_status(&self, _case: &TestCase, _ctx: &ProtocolContext) -> Option<ExpectedStatus> {
        None
    }

    /// Take over parameter construction and sending.
    fn execute(&self, _run: &mut CaseRun<'_>) -> Execution {
        Execution::Default
    }

    /// Inspect every response after it has been asserted.
    fn post_process(&self, _run: &mut CaseRun<'_>, _response: &Response) {}

    /// Called instead of `post_process` when no response came back.
    fn on_transport_error(&self, _run: &mut CaseRun<'_>) {}

    /// Value written into the invalid-parameter slot.
    fn invalid_value(&self, _ctx: &ProtocolContext) -> u32 {
        u32::MAX
    }
}

/// Hooks that do nothing.
pub struct NoHooks;

impl CaseHooks for NoHooks {}

/// One protocol interaction. Immutable during a run.
#[derive(Clone)]
pub struct TestCase {
    pub id: &'static str,
    pub description: &'static str,
    pub protocol_id: u8,
    pub message_id: u8,
    pub params: Parameters,
    pub invalid_param: InvalidParam,
    pub expected_status: ExpectedStatus,
    pub returns: Vec<ExpectedReturn>,
    pub precondition: PrecondMarker,
    /// Expected returns of the delayed response, when one must follow.
    pub delayed: Option<Vec<ExpectedReturn>>,
    pub hooks: Arc<dyn CaseHooks>,
}

impl TestCase {
    pub fn new(id: &'static str, protocol_id: u8, message_id: u8) -> Self {
        Self {
            id,
            description: "",
            protocol_id,
            message_id,
            params: Parameters::Static(Vec::new()),
            invalid_param: InvalidParam::NONE,
            expected_status: ExpectedStatus::Exact(Status::Success),
            returns: Vec::new(),
            precondition: PrecondMarker::None,
            delayed: None,
            hooks: Arc::new(NoHooks),
        }
    }

    /// The sentinel closing a suite.
    pub fn end() -> Self {
        Self::new(END_OF_SUITE, 0, 0)
    }

    pub fn is_end(&self) -> bool {
        self.id == END_OF_SUITE
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn params(mut self, params: impl Into<Vec<u32>>) -> Self {
        self.params = Parameters::Static(params.into());
        self
    }

    pub fn discovered(mut self) -> Self {
        self.params = Parameters::Discovered;
        self
    }

    pub fn invalid_param(mut self, offset: u8) -> Self {
        self.invalid_param = InvalidParam::at(offset);
        self
    }

    pub fn expect(mut self, status: Status) -> Self {
        self.expected_status = ExpectedStatus::Exact(status);
        self
    }

    pub fn expect_any(mut self) -> Self {
        self.expected_status = ExpectedStatus::Unspecified;
        self
    }

    pub fn returns(mut self, returns: impl Into<Vec<ExpectedReturn>>) -> Self {
        self.returns = returns.into();
        self
    }

    pub fn precondition(mut self, marker: PrecondMarker) -> Self {
        self.precondition = marker;
        self
    }

    pub fn delayed(mut self, returns: impl Into<Vec<ExpectedReturn>>) -> Self {
        self.delayed = Some(returns.into());
        self
    }

    pub fn hooks(mut self, hooks: impl CaseHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("protocol_id", &self.protocol_id)
            .field("message_id", &self.message_id)
            .field("params", &self.params)
            .field("invalid_param", &self.invalid_param)
            .field("expected_status", &self.expected_status)
            .field("precondition", &self.precondition)
            .finish_non_exhaustive()
    }
}

/// Ordered cases closed by the [`END_OF_SUITE`] sentinel.
#[derive(Debug, Clone)]
pub struct TestSuite {
    pub name: &'static str,
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    /// A suite over `cases`; the sentinel is appended.
    pub fn new(name: &'static str, cases: impl IntoIterator<Item = TestCase>) -> Self {
        let mut cases: Vec<TestCase> = cases.into_iter().collect();
        cases.push(TestCase::end());
        Self { name, cases }
    }

    /// Cases up to, not including, the first sentinel.
    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter().take_while(|case| !case.is_end())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
