//! mobilelink - Mobile adapter protocol tool
//!
//! Talks to an emulator over its link cable as the adapter's console, or
//! analyzes captured serial traffic.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mobilelink::config::{self, Config};
use mobilelink::link::LinkListener;
use mobilelink::protocol::DeviceClass;
use mobilelink::session::SessionDriver;
use mobilelink::trace::{Capture, TraceRecord};

/// mobilelink - Mobile adapter serial protocol tool
#[derive(Parser)]
#[command(name = "mobilelink")]
#[command(author = "MobileLink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Drive and analyze the mobile adapter serial protocol", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the emulator and run a short session against its adapter
    Probe {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Decode a dual-column capture log
    Analyze {
        /// Capture file (console and adapter byte per line, tab separated)
        capture: PathBuf,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Probe { port } => {
            run_probe(config, port).await?;
        }
        Commands::Analyze { capture } => {
            run_analyze(&config, &capture)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Accept the emulator and run begin-session, telephone-status, end-session
async fn run_probe(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let mut link_config = config.link_config();
    if let Some(port) = port {
        link_config.port = port;
    }

    let listener = LinkListener::bind(link_config).await?;
    println!("Waiting for the emulator on {}...", listener.local_addr()?);

    let (link, addr) = listener.accept().await?;
    tracing::info!("Emulator connected from {}", addr);

    let mut driver = SessionDriver::with_policy(link, config.wait_policy())
        .with_local_device(config.session.local_device);

    driver.begin_session().await?;
    let status = driver.telephone_status().await?;
    driver.end_session().await?;

    println!("\nTelephone status");
    println!("  State:   {:02X}", status.state);
    println!("  Service: {:02X}", status.service);
    println!("  Flags:   {:02X}", status.flags);
    if let Some(device) = driver.session().peer_device_id() {
        match DeviceClass::from_wire(device) {
            Some(class) => println!("  Adapter: {:?} ({:02X})", class, device),
            None => println!("  Adapter: unknown ({:02X})", device),
        }
    }

    let mut link = driver.into_link();
    tracing::debug!("Link stats: {:?}", link.stats());
    link.shutdown().await?;

    Ok(())
}

fn run_analyze(config: &Config, path: &Path) -> anyhow::Result<()> {
    let capture = Capture::load(path)?;
    let report = capture.analyze(config.initiator());

    for record in &report.records {
        print_record(record);
    }
    for finding in &report.findings {
        println!("!! {}", finding);
    }

    println!(
        "\n{} frame(s) in {} byte(s), {}",
        report.records.len(),
        capture.len(),
        if report.is_clean() {
            "no findings".to_string()
        } else {
            format!("{} finding(s)", report.all_findings().count())
        }
    );

    Ok(())
}

fn print_record(record: &TraceRecord) {
    print!("{}", record);
    for finding in &record.findings {
        print!(" [{}]", finding);
    }
    println!();

    for chunk in record.frame.payload.chunks(0x10) {
        let line: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
        println!("\t{}", line.join(" "));
    }
}
