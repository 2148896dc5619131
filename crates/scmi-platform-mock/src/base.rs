use scmi_transport::{Pending, PlatformHandler};
use scmi_wire::messages::{NAME_WORDS, base, common};
use scmi_wire::{Header, Response, Status, string_to_words};

use crate::{param, reply};

/// Identity and topology the base protocol reports.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub version: u32,
    pub vendor: String,
    pub sub_vendor: String,
    pub implementation_version: u32,
    /// Implemented protocols other than base, in discovery order.
    pub protocols: Vec<u8>,
    /// Agent names; agent ids start at 1 (0 is the platform).
    pub agents: Vec<String>,
    /// Entries returned per DISCOVER_LIST_PROTOCOLS call.
    pub list_page_size: usize,
    /// Whether the optional DISCOVER_AGENT command is implemented.
    pub discover_agent: bool,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            version: common::version(2, 0),
            vendor: "scmi-mock".into(),
            sub_vendor: "conformance".into(),
            implementation_version: 0x0001_0000,
            protocols: vec![0x11, 0x12, 0x13, 0x14, 0x15, 0x16],
            agents: vec!["OSPM".into(), "PSCI".into()],
            list_page_size: 4,
            discover_agent: true,
        }
    }
}

#[derive(Debug)]
pub struct BaseProtocol {
    config: BaseConfig,
}

impl BaseProtocol {
    pub fn new(config: BaseConfig) -> Self {
        Self { config }
    }

    fn implements(&self, message_id: u32) -> bool {
        match u8::try_from(message_id) {
            Ok(base::DISCOVER_AGENT) => self.config.discover_agent,
            Ok(id) => id <= base::DISCOVER_LIST_PROTOCOLS,
            Err(_) => false,
        }
    }

    fn dispatch(&self, header: &Header, params: &[u32]) -> Result<Vec<u32>, Status> {
        let config = &self.config;
        match header.message_id {
            common::PROTOCOL_VERSION => Ok(vec![config.version]),
            common::PROTOCOL_ATTRIBUTES => {
                let word = base::NUM_PROTOCOLS.set_truncating(0, config.protocols.len() as u32);
                let word = base::NUM_AGENTS.set_truncating(word, config.agents.len() as u32);
                Ok(vec![word])
            }
            common::PROTOCOL_MESSAGE_ATTRIBUTES => {
                if self.implements(param(params, 0)?) {
                    Ok(vec![0])
                } else {
                    Err(Status::NotFound)
                }
            }
            base::DISCOVER_VENDOR => Ok(string_to_words(&config.vendor, NAME_WORDS)),
            base::DISCOVER_SUB_VENDOR => Ok(string_to_words(&config.sub_vendor, NAME_WORDS)),
            base::DISCOVER_IMPLEMENTATION_VERSION => Ok(vec![config.implementation_version]),
            base::DISCOVER_LIST_PROTOCOLS => {
                let skip = param(params, 0)? as usize;
                if skip > config.protocols.len() {
                    return Err(Status::InvalidParameters);
                }
                let page: Vec<u8> = config.protocols[skip..]
                    .iter()
                    .copied()
                    .take(config.list_page_size.max(1))
                    .collect();
                let mut returns = vec![page.len() as u32];
                returns.extend(base::pack_protocols(&page));
                Ok(returns)
            }
            base::DISCOVER_AGENT if config.discover_agent => {
                let agent_id = param(params, 0)?;
                let name = match agent_id {
                    0 => "platform",
                    id => config
                        .agents
                        .get(id as usize - 1)
                        .map(String::as_str)
                        .ok_or(Status::NotFound)?,
                };
                let mut returns = vec![agent_id];
                returns.extend(string_to_words(name, NAME_WORDS));
                Ok(returns)
            }
            _ => Err(Status::NotFound),
        }
    }
}

impl PlatformHandler for BaseProtocol {
    fn protocol_id(&self) -> u8 {
        base::PROTOCOL_ID
    }

    fn handle(&mut self, header: &Header, params: &[u32], _pending: &mut Pending) -> Response {
        reply(header, self.dispatch(header, params))
    }
}
