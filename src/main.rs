// src/main.rs
//
// Command-line front end: run a link session against a device or bridge and
// print its events, or list serial ports.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use wandi_link::settings::{default_settings_path, load_settings, LinkSettings};
use wandi_link::{
    channel_sink, logging, tlog, LinkConfig, LinkEvent, LinkSession, PolicySink, TransportMode,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and stream events; stdin lines are sent as commands
    Run(RunArgs),
    /// List available serial ports
    ListPorts,
}

#[derive(Args)]
struct RunArgs {
    /// Settings file (defaults to the per-user config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path, e.g. /dev/ttyUSB0
    #[arg(short, long, conflicts_with = "bridge")]
    device: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Bridge endpoint (ws://, wss:// or tcp://)
    #[arg(long)]
    bridge: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Write diagnostics to a log file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::ListPorts => list_ports(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tlog!("[cli] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn resolve_settings(args: &RunArgs) -> Result<LinkSettings, String> {
    let path = args.config.clone().or_else(default_settings_path);
    let mut settings = match path {
        Some(path) => load_settings(&path)?,
        None => LinkSettings::default(),
    };

    if let Some(url) = &args.bridge {
        settings.link = LinkConfig {
            mode: TransportMode::Bridge,
            endpoint_url: Some(url.clone()),
            ..settings.link
        };
    }
    if let Some(port) = &args.device {
        settings.link.mode = TransportMode::Device;
        settings.link.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        settings.link.baud_rate = Some(baud);
    }
    if let Some(dir) = &args.log_dir {
        settings.log_dir = Some(dir.clone());
    }

    settings.validate()?;
    Ok(settings)
}

fn format_event(event: &LinkEvent) -> Option<String> {
    match event {
        LinkEvent::Status { online } => Some(format!(
            "[status] {}",
            if *online { "online" } else { "offline" }
        )),
        LinkEvent::Value { value, raw } => Some(format!("[value] {} ({})", value, raw)),
        LinkEvent::Log { text } => Some(text.clone()),
        LinkEvent::State { state } => Some(format!("[link] {}", state)),
        // Accepted commands are echoed through the log already
        LinkEvent::Command { .. } => None,
    }
}

async fn run(args: RunArgs) -> Result<(), String> {
    let settings = resolve_settings(&args)?;

    if let Some(dir) = &settings.log_dir {
        logging::init_file_logging(dir)?;
    }

    let (sink, mut events) = channel_sink();
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tlog!("[cli] Failed to encode event: {}", e),
                }
            } else if let Some(line) = format_event(&event) {
                println!("{}", line);
            }
        }
    });

    let session = LinkSession::new(
        Arc::new(PolicySink::new(sink, settings.policy.clone())),
        settings.session_options(),
    );
    session.connect(settings.link.clone()).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if stdin_open => match line {
                // Failures are reported through the event stream
                Ok(Some(line)) => { let _ = session.send(&line).await; }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tlog!("[cli] stdin closed: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    session.disconnect().await;
    drop(session);
    let _ = printer.await;
    logging::stop_file_logging();
    Ok(())
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
fn list_ports() -> Result<(), String> {
    let ports = wandi_link::io::serial::list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" {:04x}:{:04x}", vid, pid),
            _ => String::new(),
        };
        let label = port.product.or(port.manufacturer).unwrap_or_default();
        println!("{}\t{}{}\t{}", port.port_name, port.port_type, ids, label);
    }
    Ok(())
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn list_ports() -> Result<(), String> {
    Err("serial devices are not supported on this platform".to_string())
}
