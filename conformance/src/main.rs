//! SCMI conformance agent.
//!
//! # Usage
//!
//! Run against the built-in mock platform:
//! ```bash
//! scmi-conformance
//! ```
//!
//! Run against a platform behind shared-memory mailbox files:
//! ```bash
//! SCMI_MAILBOX_MESSAGE=/dev/shm/scmi SCMI_MAILBOX_SIGNAL=/dev/shm/bell \
//!     scmi-conformance --transport mailbox --log run.log
//! ```
//!
//! List registered protocols, suites and cases:
//! ```bash
//! scmi-conformance --list --format json
//! ```
//!
//! # Exit Codes
//!
//! - 0: no failures and no errors
//! - 1: at least one failure or error
//! - 2: the run could not start

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use facet::Facet;
use scmi_conformance::config::parse_protocol_id;
use scmi_conformance::{Agent, PlatformInfo, RunConfig, TransportKind};
use scmi_platform_mock::PlatformConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scmi-conformance")]
#[command(about = "SCMI protocol conformance agent")]
struct Args {
    /// Transport to the platform under test
    #[arg(long, value_enum, default_value_t = TransportKind::Mock)]
    transport: TransportKind,

    /// Mailbox message buffer file
    #[arg(long, env = "SCMI_MAILBOX_MESSAGE")]
    message: Option<PathBuf>,

    /// Mailbox doorbell file
    #[arg(long, env = "SCMI_MAILBOX_SIGNAL")]
    signal: Option<PathBuf>,

    /// Mailbox notification buffer file
    #[arg(long, env = "SCMI_MAILBOX_NOTIFICATION")]
    notification: Option<PathBuf>,

    /// Response timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Write per-case progress to this file instead of stdout
    #[arg(long)]
    log: Option<PathBuf>,

    /// Suppress per-case progress
    #[arg(long)]
    quiet: bool,

    /// Run only these protocols besides base (e.g. 0x11); repeatable
    #[arg(long = "protocol", value_parser = parse_protocol_id)]
    protocols: Vec<u8>,

    /// Mock platform: implement POWER_STATE_NOTIFY
    #[arg(long)]
    mock_state_notify: bool,

    /// Mock platform: leave DISCOVER_AGENT unimplemented
    #[arg(long)]
    mock_no_discover_agent: bool,

    /// List registered protocols, suites and cases
    #[arg(long)]
    list: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: String,
}

/// JSON output for a protocol listing.
#[derive(Facet)]
struct ProtocolJson {
    protocol_id: u8,
    name: String,
    suites: Vec<SuiteJson>,
}

#[derive(Facet)]
struct SuiteJson {
    name: String,
    cases: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = Args::parse();

    if args.list {
        list_protocols(&args);
        return;
    }

    let json = args.format == "json";
    let config = RunConfig {
        transport: args.transport,
        message: args.message.clone(),
        signal: args.signal.clone(),
        notification: args.notification.clone(),
        timeout: args.timeout_ms.map(Duration::from_millis),
        log: args.log.clone(),
        // Progress lines on stdout would corrupt the JSON document.
        quiet: args.quiet || (json && args.log.is_none()),
        protocols: args.protocols.clone(),
    };

    let mut platform = PlatformConfig::standard();
    platform.base.discover_agent = !args.mock_no_discover_agent;
    if let Some(power) = platform.power.as_mut() {
        power.state_notify = args.mock_state_notify;
    }

    let report = match scmi_conformance::run(&config, &platform) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    if json {
        println!(
            "{}",
            facet_json::to_string(&report).expect("JSON serialization failed")
        );
    } else {
        print!("{}", report.render_text());
    }

    std::process::exit(if report.is_clean() { 0 } else { 1 });
}

fn list_protocols(args: &Args) {
    let agent = match Agent::with_builtin(PlatformInfo::new()) {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    let listing: Vec<ProtocolJson> = agent
        .protocol_ids()
        .filter_map(|id| agent.module(id))
        .map(|module| ProtocolJson {
            protocol_id: module.protocol_id(),
            name: module.name().to_string(),
            suites: module
                .suites()
                .iter()
                .map(|suite| SuiteJson {
                    name: suite.name.to_string(),
                    cases: suite.iter().map(|case| case.id.to_string()).collect(),
                })
                .collect(),
        })
        .collect();

    if args.format == "json" {
        println!(
            "{}",
            facet_json::to_string(&listing).expect("JSON serialization failed")
        );
        return;
    }

    for protocol in &listing {
        println!("## {} ({:#04x})", protocol.name, protocol.protocol_id);
        for suite in &protocol.suites {
            println!("  {}", suite.name);
            for case in &suite.cases {
                println!("    {}", case);
            }
        }
        println!();
    }
}
