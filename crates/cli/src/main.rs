use std::fs;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serialgate_common::audit::verify_chain;
use serialgate_common::prefs::SERIAL_GRANTED_DEVICES;
use serialgate_common::{Origin, SessionToken};
use serialgate_daemon::store::read_document;
use serialgate_daemon::{load_config, GrantKind, JsonGrantStore, PermissionStore};
use serialgatectl::{read_audit_log, AuditCmd, Cli, Commands, GrantsCmd, TokenCmd};

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Grants { cmd } => {
            let config = load_config(&cli.config)?;
            let grants_file = &config.storage.grants_file;
            match cmd {
                GrantsCmd::List { origin } => {
                    let doc = read_document(grants_file)?;
                    match origin {
                        Some(origin) => {
                            let objects = doc.objects(&Origin::new(origin), SERIAL_GRANTED_DEVICES);
                            println!("{}", serde_json::to_string_pretty(&objects)?);
                        }
                        None => println!("{}", serde_json::to_string_pretty(&doc)?),
                    }
                }
                GrantsCmd::Check { origin, port } => {
                    let scheme = port.scheme.unwrap_or_else(|| config.identity_scheme());
                    let store = JsonGrantStore::open(grants_file)?;
                    let permissions = PermissionStore::new(scheme, Arc::new(store));
                    if permissions.check(&Origin::new(origin), &port.port_info()) {
                        println!("GRANTED");
                    } else {
                        println!("DENIED");
                        std::process::exit(1);
                    }
                }
                GrantsCmd::Add { origin, port } => {
                    let scheme = port.scheme.unwrap_or_else(|| config.identity_scheme());
                    let info = port.port_info();
                    if !scheme.can_persist(&info) {
                        anyhow::bail!("port cannot be re-identified under the {scheme} scheme");
                    }
                    let store = Arc::new(JsonGrantStore::open(grants_file)?);
                    let mut permissions = PermissionStore::new(scheme, store);
                    let origin = Origin::new(origin);
                    match permissions.grant(&origin, &info) {
                        GrantKind::Persistent if permissions.check(&origin, &info) => {
                            println!("OK");
                        }
                        _ => anyhow::bail!("grant was not stored in {}", grants_file.display()),
                    }
                }
            }
        }
        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { file } => {
                let entries = read_audit_log(&fs::read_to_string(&file)?)?;
                if verify_chain(&entries) {
                    println!("OK ({} entries)", entries.len());
                } else {
                    eprintln!("FAIL");
                    std::process::exit(1);
                }
            }
        },
        Commands::Token { cmd } => match cmd {
            TokenCmd::Generate => println!("{}", SessionToken::generate()),
            TokenCmd::Decode { token } => {
                let token = SessionToken::decode(&token)?;
                println!("high={:#018x} low={:#018x}", token.high(), token.low());
            }
        },
    }
    Ok(())
}
