use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use nms_service::cli::{CommandLine, Commands};
use nms_service::config::Config;
use nms_service::console::{ConsoleListener, render_devices};
use nms_service::monitoring::checker::build_prober;
use nms_service::monitoring::types::DisplayGroup;
use nms_service::orchestrator::{Orchestrator, OrchestratorHandle};
use nms_service::store::Document;

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();

    let cli = CommandLine::parse_args();
    let config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    let data_path = cli.data.clone().unwrap_or_else(|| config.store.data_file.clone());

    match cli.command {
        Commands::Run => run(&config, data_path).await,
        Commands::Add { id, address, group } => edit_document(&data_path, |document| {
            document.add_device(&id, &address, group)?;
            info!(id = %id, group = %group, "Device added");
            Ok(())
        }),
        Commands::Remove { id } => edit_document(&data_path, |document| {
            if !document.remove_device(&id) {
                bail!("No device with id {}", id);
            }
            info!(id = %id, "Device removed");
            Ok(())
        }),
        Commands::List => {
            let document = Document::load(&data_path)?;
            print!("{}", render_devices(&document));
            Ok(())
        }
        Commands::Label { group, text } => edit_document(&data_path, |document| {
            document.labels.set(group, text);
            Ok(())
        }),
        Commands::Settings { title, text_size, hide_ip } => edit_document(&data_path, |document| {
            let settings = &mut document.settings;
            if let Some(title) = title {
                settings.title = title;
            }
            if let Some(size) = text_size {
                settings.text_size = size;
            }
            if let Some(hide) = hide_ip {
                settings.hide_ip = hide;
            }
            println!(
                "title: {}\ntext size: {}\nhide ip: {}",
                settings.title, settings.text_size, settings.hide_ip
            );
            Ok(())
        }),
        Commands::Probe { address } => probe_once(&config, address).await,
        Commands::Config => {
            println!("{}", config);
            Ok(())
        }
    }
}

/// Load, change and save the stored document
fn edit_document(path: &Path, edit: impl FnOnce(&mut Document) -> Result<()>) -> Result<()> {
    let mut document = Document::load(path)?;
    edit(&mut document)?;
    document.save(path)?;
    Ok(())
}

async fn probe_once(config: &Config, address: String) -> Result<()> {
    let prober = build_prober(config.probe.kind, config.probe.tcp_port);
    let timeout = Duration::from_secs(config.scheduler.probe_timeout_secs);
    let target = address.clone();

    let reachable = tokio::task::spawn_blocking(move || prober.probe(&target, timeout)).await??;
    println!("{} is {}", address, if reachable { "Online" } else { "Offline" });
    Ok(())
}

async fn run(config: &Config, data_path: PathBuf) -> Result<()> {
    let document = Document::load_or_default(&data_path);
    let listener = ConsoleListener::new(document.labels.clone());
    let prober = build_prober(config.probe.kind, config.probe.tcp_port);

    info!(store = %data_path.display(), "Loaded {} devices", document.devices.len());
    let handle = Orchestrator::spawn(config, prober, listener, document, data_path);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    println!("Commands: add <id> <address> [tree1|tree2], remove <id>, list, label <tree1|tree2> <text>, quit");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_line(&handle, line.trim()).await {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    handle.shutdown().await
}

fn parse_group(tag: &str) -> Result<DisplayGroup> {
    DisplayGroup::parse_tag(tag).ok_or_else(|| anyhow::anyhow!("Unknown table '{}', expected tree1 or tree2", tag))
}

/// Returns false when the user asked to quit
async fn handle_line(handle: &OrchestratorHandle, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let result = match parts.next() {
        None => Ok(()),
        Some("quit" | "exit" | "q") => return false,
        Some("add") => match (parts.next(), parts.next()) {
            (Some(id), Some(address)) => {
                match parts.next().map(parse_group).transpose() {
                    Ok(group) => handle.add_device(id, address, group.unwrap_or_default()).await,
                    Err(e) => Err(e),
                }
            }
            _ => Err(anyhow::anyhow!("usage: add <id> <address> [tree1|tree2]")),
        },
        Some("remove" | "rm") => match parts.next() {
            Some(id) => match handle.remove_device(id).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(anyhow::anyhow!("No device with id {}", id)),
                Err(e) => Err(e),
            },
            None => Err(anyhow::anyhow!("usage: remove <id>")),
        },
        Some("label") => match parts.next() {
            Some(tag) => match parse_group(tag) {
                Ok(group) => handle.set_label(group, parts.collect::<Vec<_>>().join(" ")).await,
                Err(e) => Err(e),
            },
            None => Err(anyhow::anyhow!("usage: label <tree1|tree2> <text>")),
        },
        Some("list" | "ls") => handle.snapshot().await.map(|snapshot| {
            for device in &snapshot.devices {
                let address = snapshot.settings.display_address(&device.address);
                let label = snapshot.labels.get(device.display_group);
                println!("  {:<24} {:<16} {:<8} {}", device.id, address, device.status.to_string(), label);
            }
        }),
        Some(other) => Err(anyhow::anyhow!("Unknown command: {}", other)),
    };

    if let Err(e) = result {
        warn!("{}", e);
    }
    true
}
