use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serialgate_common::service::PortService;
use serialgate_common::{IdentityScheme, PortInfo};
use serialgate_daemon::{
    load_config, AuditLogger, DaemonConfig, JsonGrantStore, PortObserver, SerialChooserContext,
    DEFAULT_CONFIG_PATH,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "serialgate-daemon", version, about = "Serial port permission daemon")]
struct Args {
    /// Path of the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Seconds to wait before asking for a new port manager after a disconnect
    #[arg(long, default_value_t = 2)]
    reconnect_delay: u64,
}

/// Logs topology changes together with how a grant for the port would be kept.
struct TopologyLogger {
    scheme: IdentityScheme,
}

impl PortObserver for TopologyLogger {
    fn on_port_added(&self, port: &PortInfo) {
        info!(
            target: "serialgate",
            event = "port_arrived",
            port = %port.path.display(),
            name = %port.name(),
            persistable = self.scheme.can_persist(port)
        );
    }

    fn on_port_removed(&self, port: &PortInfo) {
        info!(target: "serialgate", event = "port_departed", port = %port.path.display());
    }

    fn on_port_manager_connection_error(&self) {
        warn!(target: "serialgate", event = "port_manager_lost", "enumeration service connection lost");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!(target: "serialgate", error = %e, "falling back to default configuration");
            DaemonConfig::default()
        }
    };
    let scheme = config.identity_scheme();
    info!(target: "serialgate", event = "daemon_start", %scheme, "serialgate-daemon starting");

    let prefs = JsonGrantStore::open(&config.storage.grants_file).with_context(|| {
        format!("open grants file {}", config.storage.grants_file.display())
    })?;
    let audit = AuditLogger::new(config.storage.audit_log.clone()).context("init audit log")?;
    let mut context =
        SerialChooserContext::new(port_service()?, Arc::new(prefs), scheme).with_audit(audit);
    let observer: Arc<dyn PortObserver> = Arc::new(TopologyLogger { scheme });
    context.add_port_observer(&observer);

    let reconnect_delay = Duration::from_secs(args.reconnect_delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        match context.get_ports().await {
            Ok(ports) => {
                for port in &ports {
                    info!(
                        target: "serialgate",
                        event = "port_present",
                        port = %port.path.display(),
                        persistable = scheme.can_persist(port)
                    );
                }
            }
            Err(e) => warn!(target: "serialgate", error = %e, "port manager unavailable"),
        }

        tokio::select! {
            res = &mut shutdown => {
                res?;
                break;
            }
            _ = context.run() => {}
        }
        tokio::select! {
            res = &mut shutdown => {
                res?;
                break;
            }
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    info!("received ctrl_c, exiting");
    Ok(())
}

#[cfg(feature = "udev-monitor")]
fn port_service() -> Result<Arc<dyn PortService>> {
    Ok(Arc::new(serialgate_backend_udev::UdevPortService::default()))
}

#[cfg(not(feature = "udev-monitor"))]
fn port_service() -> Result<Arc<dyn PortService>> {
    anyhow::bail!("built without a port enumeration backend; rebuild with --features udev-monitor")
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
