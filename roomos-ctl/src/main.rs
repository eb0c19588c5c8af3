//! roomos-ctl
//!
//! Command-line front end for the RoomOS session layer: watch a fleet of
//! devices come and go, or open one session and run a single xAPI call.

mod config;
mod diagnostics;
mod directory;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, DeviceEntry};
use diagnostics::{Cli, Command, Target};
use directory::DeviceDirectory;
use roomos_session::xapi::{value_to_text, XapiExt};
use roomos_session::{
    ConnectionManager, ConnectionSession, Credentials, RpcClient, TrustPolicy,
    WebSocketConnector, XPath, XRoot,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path).context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config_path.display());

    let mut transport = config.transport_config();
    if cli.insecure {
        transport.trust = TrustPolicy::AcceptInvalid;
    }
    let connector = Arc::new(WebSocketConnector::new(transport));
    let manager = Arc::new(ConnectionManager::new(connector, config.manager_config()));

    let result = run(&cli, &config, &manager).await;
    manager.disconnect_all();
    result
}

async fn run(cli: &Cli, config: &Config, manager: &Arc<ConnectionManager>) -> Result<()> {
    match &cli.command {
        Command::Watch { device, json } => watch(cli, config, manager, device, *json).await,
        Command::Info { target } => {
            let session = open(cli, config, manager, target).await?;
            let identity = session.identity().unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&identity)?);
            Ok(())
        }
        Command::Ping {
            target,
            count,
            interval,
        } => {
            let session = open(cli, config, manager, target).await?;
            ping(&session, *count, Duration::from_secs(*interval)).await
        }
        Command::Get { target, path } => {
            let path = XPath::parse(path).or_else(|_| XPath::with_root(XRoot::Status, path))?;
            let session = open(cli, config, manager, target).await?;
            let value = rpc_handle(&session)?.get(&path).await?;
            print_value(&value)
        }
        Command::Set {
            target,
            path,
            value,
        } => {
            let session = open(cli, config, manager, target).await?;
            rpc_handle(&session)?
                .set_config(path, parse_value(value))
                .await?;
            println!("OK");
            Ok(())
        }
        Command::Command { target, path, args } => {
            let args = parse_args(args)?;
            let session = open(cli, config, manager, target).await?;
            let reply = rpc_handle(&session)?.command(path, args).await?;
            print_value(&reply)
        }
    }
}

/// Connect the selected devices and print every status change until Ctrl-C
async fn watch(
    cli: &Cli,
    config: &Config,
    manager: &Arc<ConnectionManager>,
    only: &[String],
    json: bool,
) -> Result<()> {
    let mut entries: Vec<DeviceEntry> = config
        .devices
        .iter()
        .filter(|d| only.is_empty() || only.contains(&d.id))
        .cloned()
        .collect();
    if let Some(host) = &cli.host {
        entries.push(adhoc_entry(host));
    }
    if entries.is_empty() {
        bail!("No devices to watch. Add [[devices]] entries to the config or pass --host");
    }

    let mut events = manager.subscribe();
    let mut directory = DeviceDirectory::new();

    let attempts: Vec<_> = entries
        .into_iter()
        .map(|entry| {
            let manager = manager.clone();
            let credentials = credentials_for(cli, &entry);
            async move {
                if let Err(e) = manager.connect_device(&entry.id, credentials).await {
                    warn!("{}: {}", entry.id, e);
                }
            }
        })
        .collect();
    tokio::spawn(futures::future::join_all(attempts));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(event) => {
                    let status = directory.apply(&event);
                    if json {
                        println!("{}", serde_json::to_string(status)?);
                    } else {
                        println!("{}", status);
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} status events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!(
        "{} of {} devices online",
        directory.online_count(),
        directory.entries().count()
    );
    Ok(())
}

async fn ping(session: &ConnectionSession, count: u32, interval: Duration) -> Result<()> {
    let mut failures = 0;
    for i in 0..count {
        let started = Instant::now();
        if session.ping().await {
            println!(
                "{}: reply in {} ms",
                session.device_id(),
                started.elapsed().as_millis()
            );
        } else {
            failures += 1;
            println!("{}: no reply", session.device_id());
        }
        if i + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }

    if failures > 0 {
        bail!("{} of {} probes failed", failures, count);
    }
    Ok(())
}

/// Resolve the device a single-device command talks to and connect it
async fn open(
    cli: &Cli,
    config: &Config,
    manager: &ConnectionManager,
    target: &Target,
) -> Result<Arc<ConnectionSession>> {
    let entry = resolve_target(cli, config, target)?;
    manager
        .connect_device(&entry.id, credentials_for(cli, &entry))
        .await
        .map_err(|e| anyhow!("{}: {}", entry.id, e.user_message()))
}

fn resolve_target(cli: &Cli, config: &Config, target: &Target) -> Result<DeviceEntry> {
    if let Some(id) = &target.device {
        return config
            .device(id)
            .cloned()
            .ok_or_else(|| anyhow!("Device '{}' is not in the configuration", id));
    }
    if let Some(host) = &cli.host {
        return Ok(adhoc_entry(host));
    }
    match config.devices.as_slice() {
        [only] => Ok(only.clone()),
        [] => bail!("No device given. Pass --host or add a [[devices]] entry to the config"),
        _ => bail!("Several devices are configured. Pick one with --device"),
    }
}

fn adhoc_entry(host: &str) -> DeviceEntry {
    DeviceEntry {
        id: host.to_string(),
        host: host.to_string(),
        username: "admin".to_string(),
    }
}

fn credentials_for(cli: &Cli, entry: &DeviceEntry) -> Credentials {
    let username = cli
        .username
        .clone()
        .unwrap_or_else(|| entry.username.clone());
    Credentials::new(entry.host.clone(), username, cli.password.clone())
}

fn rpc_handle(session: &ConnectionSession) -> Result<Arc<dyn RpcClient>> {
    session
        .rpc_handle()
        .ok_or_else(|| anyhow!("{} is not connected", session.device_id()))
}

/// JSON when it parses, text otherwise (`40` is a number, `Boardroom` a string)
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `Key=Value` pairs to a command argument object
fn parse_args(args: &[String]) -> Result<Value> {
    let mut object = Map::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("Argument '{}' is not Key=Value", arg))?;
        if key.is_empty() {
            bail!("Argument '{}' has an empty key", arg);
        }
        object.insert(key.to_string(), parse_value(value));
    }
    Ok(Value::Object(object))
}

fn print_value(value: &Value) -> Result<()> {
    match value {
        Value::Object(_) | Value::Array(_) => {
            println!("{}", serde_json::to_string_pretty(value)?)
        }
        leaf => println!("{}", value_to_text(leaf)),
    }
    Ok(())
}
