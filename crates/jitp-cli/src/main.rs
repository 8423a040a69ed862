//! JITP command-line interface

use anyhow::{Context, Result};
use clap::Parser;
use jitp_cli::handlers::{
    handle_create_ca, handle_device_cert, handle_event, handle_issue, handle_register,
    read_payload,
};
use jitp_cli::logging::log_filter;
use jitp_cli::{Commands, Runtime};
use jitp_core::JitpConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jitp")]
#[command(about = "Just-in-time provisioning of IoT device certificates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".jitp/config.toml")]
    config: PathBuf,
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_paths(paths: &[PathBuf]) {
    for path in paths {
        println!("{}", path.display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let runtime = || -> Result<Runtime> {
        let config = JitpConfig::load(&cli.config)?;
        Ok(Runtime::from_config(&config)?)
    };

    match &cli.command {
        Commands::Handle { entry, payload } => {
            let runtime = runtime()?;
            let event = read_payload(payload.as_deref()).await?;
            let status = handle_event(&runtime, *entry, &event).await?;
            print_json(&status)?;
        }

        Commands::Issue { out_dir } => {
            let runtime = runtime()?;
            let (issued, written) = handle_issue(&runtime, out_dir.as_deref()).await?;
            if written.is_empty() {
                print_json(&issued)?;
            } else {
                print_paths(&written);
            }
        }

        Commands::Register { cert, activate } => {
            let runtime = runtime()?;
            let (event, status) = handle_register(&runtime, cert, *activate).await?;
            match status {
                Some(status) => print_json(&status)?,
                None => print_json(&event)?,
            }
        }

        Commands::Ca {
            dir,
            common_name,
            force,
        } => {
            let written = handle_create_ca(dir, common_name, *force).await?;
            print_paths(&written);
        }

        Commands::DeviceCert {
            device_id,
            ca_dir,
            out_dir,
            register,
            activate,
        } => {
            let written = handle_device_cert(ca_dir, device_id, out_dir).await?;
            print_paths(&written);
            if *register || *activate {
                let runtime = runtime()?;
                let cert = written.first().context("no certificate written")?;
                let (event, status) = handle_register(&runtime, cert, *activate).await?;
                match status {
                    Some(status) => print_json(&status)?,
                    None => print_json(&event)?,
                }
            }
        }
    }

    Ok(())
}
