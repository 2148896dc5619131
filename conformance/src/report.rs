//! Result records and statistics.
//!
//! Reports are append-only: the engine pushes check records into a case,
//! finished cases into a suite, finished suites into a protocol. Counters
//! roll up on each push, so every terminal event is counted exactly once.

use std::fmt::{self, Write as _};
use std::ops::AddAssign;

use facet::Facet;

/// Outcome of a single check, a case, a suite or a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum CaseStatus {
    Undefined,
    Passed,
    Failed,
    Skip,
    Info,
    Error,
    Conformant,
    NonConformant,
    Untested,
}

impl CaseStatus {
    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::Undefined => "UNDEFINED",
            CaseStatus::Passed => "PASSED",
            CaseStatus::Failed => "FAILED",
            CaseStatus::Skip => "SKIPPED",
            CaseStatus::Info => "INFO",
            CaseStatus::Error => "ERROR",
            CaseStatus::Conformant => "CONFORMANT",
            CaseStatus::NonConformant => "NON CONFORMANT",
            CaseStatus::Untested => "UNTESTED",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rolling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Facet)]
pub struct TestStats {
    pub tests: u32,
    pub failures: u32,
    pub errors: u32,
    pub skips: u32,
}

impl TestStats {
    /// Count one finished case by its terminal classification.
    pub fn record_case(&mut self, status: CaseStatus) {
        self.tests += 1;
        match status {
            CaseStatus::NonConformant | CaseStatus::Failed => self.failures += 1,
            CaseStatus::Undefined | CaseStatus::Error => self.errors += 1,
            CaseStatus::Untested | CaseStatus::Skip => self.skips += 1,
            CaseStatus::Conformant | CaseStatus::Passed | CaseStatus::Info => {}
        }
    }

    /// Count a suite suppressed by its skip flag.
    pub fn record_skipped_suite(&mut self) {
        self.skips += 1;
    }

    /// No failures and no errors.
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.errors == 0
    }
}

impl AddAssign for TestStats {
    fn add_assign(&mut self, other: Self) {
        self.tests += other.tests;
        self.failures += other.failures;
        self.errors += other.errors;
        self.skips += other.skips;
    }
}

impl fmt::Display for TestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tests: {}, failures: {}, errors: {}, skipped: {}",
            self.tests, self.failures, self.errors, self.skips
        )
    }
}

/// One assertion or observation inside a case.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct CheckRecord {
    pub name: String,
    pub outcome: CaseStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Facet)]
pub struct CaseReport {
    pub id: String,
    pub message_id: u8,
    pub checks: Vec<CheckRecord>,
    pub status: CaseStatus,
}

impl CaseReport {
    pub fn new(id: impl Into<String>, message_id: u8) -> Self {
        Self {
            id: id.into(),
            message_id,
            checks: Vec::new(),
            status: CaseStatus::Undefined,
        }
    }

    pub fn record(
        &mut self,
        name: impl Into<String>,
        outcome: CaseStatus,
        detail: impl Into<String>,
    ) -> &CheckRecord {
        self.checks.push(CheckRecord {
            name: name.into(),
            outcome,
            detail: detail.into(),
        });
        &self.checks[self.checks.len() - 1]
    }

    pub fn count(&self, outcome: CaseStatus) -> usize {
        self.checks.iter().filter(|c| c.outcome == outcome).count()
    }

    /// Terminal classification of the checks recorded so far.
    ///
    /// Any failure makes the case non-conformant; otherwise any error leaves
    /// it undefined. A case with at least one check that was not skipped is
    /// conformant, and a case where nothing ran is untested.
    pub fn current_status(&self) -> CaseStatus {
        if self.count(CaseStatus::Failed) > 0 {
            CaseStatus::NonConformant
        } else if self.count(CaseStatus::Error) > 0 {
            CaseStatus::Undefined
        } else if !self.checks.is_empty() && self.count(CaseStatus::Skip) < self.checks.len() {
            CaseStatus::Conformant
        } else {
            CaseStatus::Untested
        }
    }

    pub fn finish(&mut self) -> CaseStatus {
        self.status = self.current_status();
        self.status
    }
}

#[derive(Debug, Clone, Facet)]
pub struct SuiteReport {
    pub name: String,
    pub skipped: bool,
    pub cases: Vec<CaseReport>,
    pub stats: TestStats,
    pub status: CaseStatus,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skipped: false,
            cases: Vec::new(),
            stats: TestStats::default(),
            status: CaseStatus::Untested,
        }
    }

    /// A suite that never ran because its skip flag was set.
    pub fn skipped(name: impl Into<String>) -> Self {
        let mut report = Self::new(name);
        report.skipped = true;
        report.status = CaseStatus::Skip;
        report.stats.record_skipped_suite();
        report
    }

    pub fn push_case(&mut self, case: CaseReport) {
        self.stats.record_case(case.status);
        self.cases.push(case);
    }

    pub fn finish(&mut self) -> CaseStatus {
        if !self.skipped {
            self.status = worst(self.cases.iter().map(|c| c.status));
        }
        self.status
    }
}

#[derive(Debug, Clone, Facet)]
pub struct ProtocolReport {
    pub name: String,
    pub protocol_id: u8,
    pub suites: Vec<SuiteReport>,
    pub stats: TestStats,
    pub status: CaseStatus,
}

impl ProtocolReport {
    pub fn new(name: impl Into<String>, protocol_id: u8) -> Self {
        Self {
            name: name.into(),
            protocol_id,
            suites: Vec::new(),
            stats: TestStats::default(),
            status: CaseStatus::Untested,
        }
    }

    pub fn push_suite(&mut self, suite: SuiteReport) {
        self.stats += suite.stats;
        self.suites.push(suite);
    }

    pub fn finish(&mut self) -> CaseStatus {
        self.status = worst(
            self.suites
                .iter()
                .filter(|s| !s.skipped)
                .map(|s| s.status),
        );
        self.status
    }

    /// Find a case by id across all suites.
    pub fn case(&self, id: &str) -> Option<&CaseReport> {
        self.suites
            .iter()
            .flat_map(|s| s.cases.iter())
            .find(|c| c.id == id)
    }

    pub fn suite(&self, name: &str) -> Option<&SuiteReport> {
        self.suites.iter().find(|s| s.name == name)
    }
}

/// Aggregate of terminal statuses: non-conformant beats undefined beats
/// conformant beats untested.
fn worst(statuses: impl Iterator<Item = CaseStatus>) -> CaseStatus {
    let mut result = CaseStatus::Untested;
    for status in statuses {
        match status {
            CaseStatus::NonConformant => return CaseStatus::NonConformant,
            CaseStatus::Undefined => result = CaseStatus::Undefined,
            CaseStatus::Conformant if result == CaseStatus::Untested => {
                result = CaseStatus::Conformant
            }
            _ => {}
        }
    }
    result
}

/// Everything one agent run produced.
#[derive(Debug, Clone, Facet)]
pub struct RunReport {
    pub transport: String,
    pub protocols: Vec<ProtocolReport>,
    /// Registered protocols the platform did not list as implemented.
    pub not_implemented: Vec<u8>,
    pub totals: TestStats,
}

impl RunReport {
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            protocols: Vec::new(),
            not_implemented: Vec::new(),
            totals: TestStats::default(),
        }
    }

    pub fn push_protocol(&mut self, protocol: ProtocolReport) {
        self.totals += protocol.stats;
        self.protocols.push(protocol);
    }

    pub fn protocol(&self, protocol_id: u8) -> Option<&ProtocolReport> {
        self.protocols.iter().find(|p| p.protocol_id == protocol_id)
    }

    pub fn is_clean(&self) -> bool {
        self.totals.is_clean()
    }

    /// Human-readable summary table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "transport: {}", self.transport);
        for protocol in &self.protocols {
            let _ = writeln!(
                out,
                "\n{} ({:#04x}): {}",
                protocol.name, protocol.protocol_id, protocol.status
            );
            for suite in &protocol.suites {
                let _ = writeln!(out, "  {:<40} {}", suite.name, suite.status);
            }
            let _ = writeln!(out, "  {}", protocol.stats);
        }
        for id in &self.not_implemented {
            let _ = writeln!(out, "\nprotocol {:#04x}: not implemented by the platform", id);
        }
        let _ = writeln!(out, "\nTOTAL {}", self.totals);
        out
    }
}
