//! Protocol registry and the top-level agent run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use scmi_wire::protocol_id;

use crate::config::RunConfig;
use crate::context::{Fixture, ProtocolContext, entity};
use crate::engine::Engine;
use crate::report::RunReport;
use crate::testcase::{ExpectedReturn, TestSuite};

/// Test tables and fixture filler for one protocol.
pub trait ProtocolModule: Send + Sync {
    fn protocol_id(&self) -> u8;

    fn name(&self) -> &'static str;

    /// Suites in execution order.
    fn suites(&self) -> Vec<TestSuite>;

    /// Index of the suite that can never be skipped.
    fn discovery_suite(&self) -> usize {
        0
    }

    /// Expected returns for `message_id` built from the fixture, used when a
    /// case has no filler of its own.
    fn fill_expected(&self, _message_id: u8, _ctx: &ProtocolContext) -> Option<Vec<ExpectedReturn>> {
        None
    }
}

/// A protocol module compiled into the binary.
pub struct ProtocolRegistration {
    pub protocol_id: u8,
    pub build: fn() -> Box<dyn ProtocolModule>,
}

inventory::collect!(ProtocolRegistration);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateProtocol(u8),
    MissingBase,
    /// A case addresses a protocol other than the module that owns it.
    ForeignCase {
        protocol_id: u8,
        case: &'static str,
    },
    /// An expected return reaches past the largest possible payload.
    FieldOutOfRange {
        case: &'static str,
        field: &'static str,
    },
    /// The run filter names a protocol nobody registered.
    UnknownProtocol(u8),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateProtocol(id) => {
                write!(f, "protocol {:#04x} registered twice", id)
            }
            RegistryError::MissingBase => write!(f, "no base protocol module registered"),
            RegistryError::ForeignCase { protocol_id, case } => write!(
                f,
                "case {} does not belong to protocol {:#04x}",
                case, protocol_id
            ),
            RegistryError::FieldOutOfRange { case, field } => write!(
                f,
                "case {}: field {} lies outside the return payload",
                case, field
            ),
            RegistryError::UnknownProtocol(id) => {
                write!(f, "protocol {:#04x} has no test module", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Per-protocol fixtures describing what the platform under test declares.
#[derive(Default, Clone)]
pub struct PlatformInfo {
    fixtures: BTreeMap<u8, Arc<Fixture>>,
}

impl PlatformInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: std::any::Any + Send + Sync>(&mut self, protocol_id: u8, fixture: T) {
        self.fixtures.insert(protocol_id, Arc::new(fixture));
    }

    pub fn get(&self, protocol_id: u8) -> Option<Arc<Fixture>> {
        self.fixtures.get(&protocol_id).cloned()
    }
}

impl fmt::Debug for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformInfo")
            .field("protocols", &self.fixtures.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Runs base first, then every registered protocol the platform lists.
#[derive(Default)]
pub struct Agent {
    modules: BTreeMap<u8, Box<dyn ProtocolModule>>,
    platform: PlatformInfo,
}

impl Agent {
    pub fn new(platform: PlatformInfo) -> Self {
        Self {
            modules: BTreeMap::new(),
            platform,
        }
    }

    /// An agent with every protocol module compiled into the binary.
    pub fn with_builtin(platform: PlatformInfo) -> Result<Self, RegistryError> {
        let mut agent = Self::new(platform);
        let mut registrations: Vec<_> = inventory::iter::<ProtocolRegistration>.into_iter().collect();
        registrations.sort_by_key(|r| r.protocol_id);
        for registration in registrations {
            agent.register((registration.build)())?;
        }
        Ok(agent)
    }

    /// Add a module after validating its tables.
    pub fn register(&mut self, module: Box<dyn ProtocolModule>) -> Result<(), RegistryError> {
        let id = module.protocol_id();
        if self.modules.contains_key(&id) {
            return Err(RegistryError::DuplicateProtocol(id));
        }
        validate(module.as_ref())?;
        tracing::debug!(protocol = module.name(), id, "registered protocol module");
        self.modules.insert(id, module);
        Ok(())
    }

    pub fn protocol_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.modules.keys().copied()
    }

    pub fn module(&self, protocol_id: u8) -> Option<&dyn ProtocolModule> {
        self.modules.get(&protocol_id).map(|m| m.as_ref())
    }

    /// Execute the run. Fails before sending anything if the registry or the
    /// protocol filter is inconsistent.
    pub fn run(&self, engine: &mut Engine, config: &RunConfig) -> Result<RunReport, RegistryError> {
        let base = self.module(protocol_id::BASE).ok_or(RegistryError::MissingBase)?;
        if let Some(&unknown) = config
            .protocols
            .iter()
            .find(|id| !self.modules.contains_key(id))
        {
            return Err(RegistryError::UnknownProtocol(unknown));
        }

        let mut report = RunReport::new(engine.transport_name());
        let (base_report, base_ctx) = engine.run_protocol(base, self.platform.get(protocol_id::BASE));
        report.push_protocol(base_report);

        let listed = base_ctx.discovered().list(entity::PROTOCOLS);
        for (&id, module) in &self.modules {
            if id == protocol_id::BASE || !config.selects(id) {
                continue;
            }
            if !listed.contains(&u32::from(id)) {
                tracing::info!(protocol = module.name(), id, "not implemented by the platform");
                engine.output_mut().log_output(&format!(
                    "\n{} protocol ({:#04x}): not implemented",
                    module.name(),
                    id
                ));
                report.not_implemented.push(id);
                continue;
            }
            let (protocol_report, _) = engine.run_protocol(module.as_ref(), self.platform.get(id));
            report.push_protocol(protocol_report);
        }

        engine
            .output_mut()
            .log_output(&format!("\nTOTAL {}", report.totals));
        if let Err(error) = engine.output_mut().flush() {
            tracing::warn!(%error, "failed to flush log output");
        }
        Ok(report)
    }
}

fn validate(module: &dyn ProtocolModule) -> Result<(), RegistryError> {
    for suite in module.suites() {
        for case in suite.iter() {
            if case.protocol_id != module.protocol_id() {
                return Err(RegistryError::ForeignCase {
                    protocol_id: module.protocol_id(),
                    case: case.id,
                });
            }
            let delayed = case.delayed.iter().flatten();
            if let Some(desc) = case.returns.iter().chain(delayed).find(|d| !d.field.fits_payload()) {
                return Err(RegistryError::FieldOutOfRange {
                    case: case.id,
                    field: desc.field.name,
                });
            }
        }
    }
    Ok(())
}
