use scmi_transport::{Pending, PlatformHandler};
use scmi_wire::messages::{NAME_WORDS, common, power};
use scmi_wire::{Header, Response, Status, string_to_words};

use crate::{param, reply};

#[derive(Clone, Debug)]
pub struct PowerDomainConfig {
    pub name: String,
    pub initial_state: u32,
    pub async_support: bool,
    pub notify_support: bool,
}

impl PowerDomainConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: power::STATE_ON,
            async_support: true,
            notify_support: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PowerConfig {
    pub version: u32,
    pub domains: Vec<PowerDomainConfig>,
    /// Whether the optional STATE_NOTIFY command is implemented.
    pub state_notify: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            version: common::version(2, 0),
            domains: ["cpu0", "cpu1", "gpu"]
                .into_iter()
                .map(PowerDomainConfig::new)
                .collect(),
            state_notify: false,
        }
    }
}

#[derive(Debug)]
struct Domain {
    config: PowerDomainConfig,
    state: u32,
    notify: bool,
}

#[derive(Debug)]
pub struct PowerProtocol {
    version: u32,
    state_notify: bool,
    domains: Vec<Domain>,
}

/// Agent id stamped on state-change notifications.
const CALLING_AGENT: u32 = 1;

impl PowerProtocol {
    pub fn new(config: PowerConfig) -> Self {
        let domains = config
            .domains
            .into_iter()
            .map(|config| Domain {
                state: config.initial_state,
                notify: false,
                config,
            })
            .collect();
        Self {
            version: config.version,
            state_notify: config.state_notify,
            domains,
        }
    }

    /// Current state of a domain, for tests that inspect the platform.
    pub fn state(&self, domain_id: usize) -> Option<u32> {
        self.domains.get(domain_id).map(|d| d.state)
    }

    fn domain(&mut self, domain_id: u32) -> Result<&mut Domain, Status> {
        self.domains
            .get_mut(domain_id as usize)
            .ok_or(Status::NotFound)
    }

    fn implements(&self, message_id: u32) -> bool {
        match u8::try_from(message_id) {
            Ok(power::STATE_NOTIFY) => self.state_notify,
            Ok(id) => id <= power::STATE_GET,
            Err(_) => false,
        }
    }

    fn dispatch(
        &mut self,
        header: &Header,
        params: &[u32],
        pending: &mut Pending,
    ) -> Result<Vec<u32>, Status> {
        match header.message_id {
            common::PROTOCOL_VERSION => Ok(vec![self.version]),
            common::PROTOCOL_ATTRIBUTES => Ok(vec![self.domains.len() as u32, 0, 0, 0]),
            common::PROTOCOL_MESSAGE_ATTRIBUTES => {
                if self.implements(param(params, 0)?) {
                    Ok(vec![0])
                } else {
                    Err(Status::NotFound)
                }
            }
            power::DOMAIN_ATTRIBUTES => {
                let domain = self.domain(param(params, 0)?)?;
                let word = power::NOTIFY_SUPPORT
                    .set_truncating(0, domain.config.notify_support as u32);
                let word = power::ASYNC_SUPPORT.set_truncating(word, domain.config.async_support as u32);
                let word = power::SYNC_SUPPORT.set_truncating(word, 1);
                let mut returns = vec![word];
                returns.extend(string_to_words(&domain.config.name, NAME_WORDS));
                Ok(returns)
            }
            power::STATE_SET => {
                let flags = param(params, 0)?;
                let domain_id = param(params, 1)?;
                let state = param(params, 2)?;
                if flags & !power::SET_ASYNC.mask_in_place() != 0 {
                    return Err(Status::InvalidParameters);
                }
                if state != power::STATE_ON && state != power::STATE_OFF {
                    return Err(Status::InvalidParameters);
                }
                let is_async = power::SET_ASYNC.get(flags) != 0;

                let domain = self.domain(domain_id)?;
                if is_async && !domain.config.async_support {
                    return Err(Status::NotSupported);
                }
                domain.state = state;
                let notify = domain.notify;
                tracing::debug!(domain_id, state, is_async, "power state set");

                if is_async {
                    pending.push_delayed(header, Status::Success.as_i32(), vec![domain_id, state]);
                }
                if notify {
                    pending.push_notification(
                        power::PROTOCOL_ID,
                        power::STATE_CHANGED,
                        vec![CALLING_AGENT, domain_id, state],
                    );
                }
                Ok(Vec::new())
            }
            power::STATE_GET => Ok(vec![self.domain(param(params, 0)?)?.state]),
            power::STATE_NOTIFY if self.state_notify => {
                let domain = self.domain(param(params, 0)?)?;
                if !domain.config.notify_support {
                    return Err(Status::NotSupported);
                }
                domain.notify = param(params, 1)? & 1 != 0;
                Ok(Vec::new())
            }
            _ => Err(Status::NotFound),
        }
    }
}

impl PlatformHandler for PowerProtocol {
    fn protocol_id(&self) -> u8 {
        power::PROTOCOL_ID
    }

    fn handle(&mut self, header: &Header, params: &[u32], pending: &mut Pending) -> Response {
        reply(header, self.dispatch(header, params, pending))
    }
}
