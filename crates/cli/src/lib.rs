use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serialgate_common::audit::AuditEntry;
use serialgate_common::{IdentityScheme, PortInfo, SessionToken};

#[derive(Parser)]
#[command(name = "serialgatectl", version, about = "serialgate CLI")]
pub struct Cli {
    /// Daemon config, used for the grants file and identity scheme
    #[arg(long, default_value = serialgate_daemon::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Durable grant operations
    Grants {
        #[command(subcommand)]
        cmd: GrantsCmd,
    },
    /// Audit log verification
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
    /// Session token helpers
    Token {
        #[command(subcommand)]
        cmd: TokenCmd,
    },
}

#[derive(Subcommand, Clone)]
pub enum GrantsCmd {
    /// Print stored grants
    List {
        #[arg(long)]
        origin: Option<String>,
    },
    /// Check whether an origin may open a port
    Check {
        origin: String,
        #[command(flatten)]
        port: PortArgs,
    },
    /// Store a durable grant for a re-identifiable port
    Add {
        origin: String,
        #[command(flatten)]
        port: PortArgs,
    },
}

#[derive(Subcommand, Clone)]
pub enum AuditCmd {
    /// Verify a JSONL audit log chain
    Verify { file: PathBuf },
}

#[derive(Subcommand, Clone)]
pub enum TokenCmd {
    /// Print a fresh session token
    Generate,
    /// Decode a token and print its halves
    Decode { token: String },
}

/// Port descriptor given on the command line.
#[derive(Args, Clone, Debug, Default)]
pub struct PortArgs {
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub path: PathBuf,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub instance_id: Option<String>,
    /// USB vendor id in hex, e.g. 0x1234
    #[arg(long, value_parser = parse_usb_id)]
    pub vendor_id: Option<u16>,
    #[arg(long, value_parser = parse_usb_id)]
    pub product_id: Option<u16>,
    #[arg(long)]
    pub serial: Option<String>,
    #[arg(long)]
    pub driver: Option<String>,
    /// Override the configured identity scheme
    #[arg(long)]
    pub scheme: Option<IdentityScheme>,
}

impl PortArgs {
    /// Descriptor for a port that is not actually connected; it gets a
    /// throwaway token.
    pub fn port_info(&self) -> PortInfo {
        PortInfo {
            token: SessionToken::generate(),
            path: self.path.clone(),
            display_name: self.name.clone(),
            device_instance_id: self.instance_id.clone(),
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            serial_number: self.serial.clone(),
            usb_driver_name: self.driver.clone(),
        }
    }
}

pub fn parse_usb_id(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB id {s:?}: {e}"))
}

/// Parse a JSONL audit log, skipping blank lines.
pub fn read_audit_log(text: &str) -> Result<Vec<AuditEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid entry", n + 1))
        })
        .collect()
}
