//! Entry point for `monlink`.
//!
//! Terminal front end for the communication engine: prints the event stream
//! through the line formatter, forwards typed input as write commands, and
//! downloads an assembled image on request. All protocol work lives in
//! `monlink-core`; this binary owns only process setup and terminal I/O.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use monlink_core::engine::serial::list_ports;
use monlink_core::engine::{
    Command, EngineConfig, EngineError, Event, LineFormatter, ProtocolEngine,
};

/// Serial console and program loader for the R-31JP teaching board.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Primary serial port, tried before the builtin candidates.
    #[arg(short, long)]
    port: Option<String>,

    /// Line speed.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Load engine settings from a JSON file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Download this image once connected, then open the console.
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Echo typed lines locally.
    #[arg(long)]
    echo: bool,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

fn main() -> Result<()> {
    // set RUST_LOG to control engine diagnostics
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        for port in list_ports() {
            match port.product {
                Some(product) => println!("{}\t{}", port.name, product),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port_names.insert(0, port);
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }

    let (engine, events) = ProtocolEngine::start(config);
    let printer = thread::spawn(move || print_events(events));

    if let Some(path) = &cli.image {
        download_at_startup(&engine, path)?;
    }

    console(&engine, cli.echo)?;

    engine.shutdown();
    let _ = printer.join();
    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("could not parse config file {}", path.display()))
}

/// Drain the event stream onto stdout until the engine goes away.
fn print_events(events: Receiver<Event>) {
    let mut formatter = LineFormatter::new();
    let mut stdout = io::stdout();
    for event in events {
        if let Some(text) = formatter.render(&event) {
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    }
}

/// Read an assembled image and push it through the download handshake.
fn download(engine: &ProtocolEngine, path: &Path) -> Result<()> {
    let image = fs::read(path)
        .with_context(|| format!("could not read image {}", path.display()))?;
    engine
        .submit_and_await(Command::Download(image))
        .with_context(|| format!("download of {} failed", path.display()))
}

/// Push an image as soon as the engine has a connection.
fn download_at_startup(engine: &ProtocolEngine, path: &Path) -> Result<()> {
    let image = fs::read(path)
        .with_context(|| format!("could not read image {}", path.display()))?;

    // the engine may still be scanning ports; keep trying for a while
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        match engine.submit_and_await(Command::Download(image.clone())) {
            Err(EngineError::NoConnection) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(200));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("download of {} failed", path.display()));
            }
            Ok(()) => return Ok(()),
        }
    }
}

/// Interactive console: lines go to the device, `:load <file>` downloads,
/// `:quit` exits.
fn console(engine: &ProtocolEngine, echo: bool) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("could not read stdin")?;
        let trimmed = line.trim();

        if trimmed == ":quit" || trimmed == ":q" {
            break;
        }
        if let Some(path) = trimmed.strip_prefix(":load ") {
            if let Err(err) = download(engine, Path::new(path.trim())) {
                eprintln!("{:#}", err);
            }
            continue;
        }

        if echo {
            println!("{}", line);
        }
        // the monitor wants CR line endings
        let mut data = line.into_bytes();
        data.push(b'\r');
        if let Err(err) = engine.submit(Command::Write(data)) {
            // the rejection is already on the event stream; stay in the loop
            tracing::debug!("write rejected: {}", err);
        }
    }
    Ok(())
}
