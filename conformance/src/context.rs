//! Per-protocol runtime state.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::precondition::PreconditionSlot;
use crate::report::{CaseStatus, TestStats};
use crate::testcase::TestSuite;

/// Opaque per-protocol expectations supplied by the board layer.
pub type Fixture = dyn Any + Send + Sync;

/// Names under which discovery cases record what they found.
pub mod entity {
    pub const PROTOCOLS: &str = "protocols";
    pub const AGENTS: &str = "agents";
    pub const DOMAINS: &str = "domains";

    pub const NUM_PROTOCOLS: &str = "num_protocols";
    pub const NUM_AGENTS: &str = "num_agents";
    pub const NUM_DOMAINS: &str = "num_domains";
}

/// Entities enumerated by earlier cases, read by discovery-driven cases.
#[derive(Debug, Default, Clone)]
pub struct Discovered {
    lists: BTreeMap<&'static str, Vec<u32>>,
    values: BTreeMap<&'static str, u32>,
}

impl Discovered {
    pub fn record(&mut self, name: &'static str, ids: impl IntoIterator<Item = u32>) {
        self.lists.insert(name, ids.into_iter().collect());
    }

    pub fn extend(&mut self, name: &'static str, ids: impl IntoIterator<Item = u32>) {
        self.lists.entry(name).or_default().extend(ids);
    }

    pub fn list(&self, name: &str) -> &[u32] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_value(&mut self, name: &'static str, value: u32) {
        self.values.insert(name, value);
    }

    pub fn value(&self, name: &str) -> Option<u32> {
        self.values.get(name).copied()
    }
}

/// Engine state for one protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Setup,
    RunningSuite,
    RunningCase,
    SuiteDone,
    ProtocolDone,
}

/// Position of the engine inside the suite table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub suite: usize,
    pub case: usize,
}

pub struct ProtocolContext {
    protocol_id: u8,
    name: &'static str,
    suite_names: Vec<&'static str>,
    skip: Vec<bool>,
    discovery_suite: usize,
    cursor: Cursor,
    state: EngineState,
    stats: TestStats,
    precondition: Option<PreconditionSlot>,
    discovered: Discovered,
    fixture: Option<Arc<Fixture>>,
}

impl ProtocolContext {
    pub fn new(
        protocol_id: u8,
        name: &'static str,
        suites: &[TestSuite],
        discovery_suite: usize,
        fixture: Option<Arc<Fixture>>,
    ) -> Self {
        Self {
            protocol_id,
            name,
            suite_names: suites.iter().map(|s| s.name).collect(),
            skip: vec![false; suites.len()],
            discovery_suite,
            cursor: Cursor::default(),
            state: EngineState::Setup,
            stats: TestStats::default(),
            precondition: None,
            discovered: Discovered::default(),
            fixture,
        }
    }

    pub fn protocol_id(&self) -> u8 {
        self.protocol_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn stats(&self) -> TestStats {
        self.stats
    }

    /// The fixture, if one was supplied and has type `T`.
    pub fn fixture<T: 'static>(&self) -> Option<&T> {
        self.fixture.as_deref()?.downcast_ref::<T>()
    }

    pub fn discovered(&self) -> &Discovered {
        &self.discovered
    }

    pub fn discovered_mut(&mut self) -> &mut Discovered {
        &mut self.discovered
    }

    /// Clear every skip flag.
    pub fn setup(&mut self) {
        self.state = EngineState::Setup;
        self.skip.iter_mut().for_each(|s| *s = false);
        self.cursor = Cursor::default();
    }

    pub fn enter_suite(&mut self, suite: usize) {
        self.state = EngineState::RunningSuite;
        self.cursor = Cursor { suite, case: 0 };
    }

    pub fn enter_case(&mut self, case: usize) {
        self.state = EngineState::RunningCase;
        self.cursor.case = case;
    }

    pub fn finish_suite(&mut self) {
        self.state = EngineState::SuiteDone;
    }

    pub fn finish_protocol(&mut self) {
        self.state = EngineState::ProtocolDone;
    }

    pub fn record_case(&mut self, status: CaseStatus) {
        self.stats.record_case(status);
    }

    pub fn record_skipped_suite(&mut self) {
        self.stats.record_skipped_suite();
    }

    /// Whether the suite at `index` runs. The discovery suite always does.
    pub fn must_run(&self, index: usize) -> bool {
        index == self.discovery_suite || !self.skip.get(index).copied().unwrap_or(false)
    }

    /// Write a skip-logic decision into a later suite's flag.
    ///
    /// Rejected (returns `false`) for the discovery suite, for unknown
    /// indices and for suites the run has already reached.
    pub fn apply_must_run(&mut self, index: usize, must_run: bool) -> bool {
        if index == self.discovery_suite {
            tracing::warn!(protocol = self.name, "discovery suite cannot be skipped");
            return false;
        }
        if index <= self.cursor.suite && self.state != EngineState::Setup {
            tracing::warn!(
                protocol = self.name,
                suite = self.suite_name(index),
                "skip decision arrived after the suite was reached"
            );
            return false;
        }
        let Some(flag) = self.skip.get_mut(index) else {
            return false;
        };
        *flag = !must_run;
        true
    }

    pub fn suite_name(&self, index: usize) -> &'static str {
        self.suite_names.get(index).copied().unwrap_or("?")
    }

    pub fn define_precondition(&mut self, slot: PreconditionSlot) {
        self.precondition = Some(slot);
    }

    pub fn precondition(&self) -> Option<&PreconditionSlot> {
        self.precondition.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::TestCase;

    fn context() -> ProtocolContext {
        let suites = vec![
            TestSuite::new("discovery", [TestCase::new("a", 0x10, 0)]),
            TestSuite::new("one", Vec::new()),
            TestSuite::new("two", Vec::new()),
        ];
        ProtocolContext::new(0x10, "base", &suites, 0, Some(Arc::new(7u32)))
    }

    #[test]
    fn discovery_suite_is_never_skipped() {
        let mut ctx = context();
        ctx.setup();
        assert!(!ctx.apply_must_run(0, false));
        assert!(ctx.must_run(0));
    }

    #[test]
    fn skip_flags_apply_to_later_suites_only() {
        let mut ctx = context();
        ctx.setup();
        ctx.enter_suite(0);
        assert!(ctx.apply_must_run(2, false));
        assert!(!ctx.must_run(2));
        assert!(ctx.must_run(1));

        ctx.enter_suite(2);
        assert!(!ctx.apply_must_run(1, true));
        assert!(!ctx.apply_must_run(9, true));

        ctx.setup();
        assert!(ctx.must_run(2));
    }

    #[test]
    fn fixture_downcast() {
        let ctx = context();
        assert_eq!(ctx.fixture::<u32>(), Some(&7));
        assert_eq!(ctx.fixture::<String>(), None);
    }

    #[test]
    fn discovered_store() {
        let mut ctx = context();
        assert!(ctx.discovered().list(entity::AGENTS).is_empty());
        ctx.discovered_mut().record(entity::AGENTS, [1, 2]);
        ctx.discovered_mut().extend(entity::AGENTS, [3]);
        ctx.discovered_mut().set_value(entity::NUM_AGENTS, 3);
        assert_eq!(ctx.discovered().list(entity::AGENTS), &[1, 2, 3]);
        assert_eq!(ctx.discovered().value(entity::NUM_AGENTS), Some(3));
    }
}
