//! Command-line surface.

use clap::Subcommand;
use jitp_core::DeviceId;
use jitp_provisioning::EntryPoint;
use std::path::PathBuf;

fn parse_entry_point(value: &str) -> Result<EntryPoint, String> {
    value.parse().map_err(|e: jitp_core::JitpError| e.to_string())
}

fn parse_device_id(value: &str) -> Result<DeviceId, String> {
    DeviceId::new(value).map_err(|e| e.to_string())
}

/// Operator commands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run one trigger entry point on a JSON event
    Handle {
        /// Entry point: certificate-registered, activation-requested,
        /// thing-creation, create-thing, delete-thing, device-data or upload
        #[arg(value_parser = parse_entry_point)]
        entry: EntryPoint,

        /// Event file; reads stdin when omitted or `-`
        #[arg(short, long)]
        payload: Option<PathBuf>,
    },

    /// Issue a certificate carrying the bootstrap policy
    Issue {
        /// Write `<id>.cert.pem`, `<id>.private.key` and `<id>.public.key` here
        /// instead of printing the credential
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Register a device certificate as pending activation
    Register {
        /// PEM certificate file
        cert: PathBuf,

        /// Also deliver the registration event
        #[arg(long)]
        activate: bool,
    },

    /// Create a certificate authority for signing device certificates
    Ca {
        /// Directory for `root.cert` and `root.key`
        #[arg(long, default_value = ".jitp/ca")]
        dir: PathBuf,

        /// Subject common name of the CA
        #[arg(long, default_value = "JITP Root CA")]
        common_name: String,

        /// Replace an existing CA
        #[arg(long)]
        force: bool,
    },

    /// Sign a device certificate with `CN=<device id>`
    DeviceCert {
        /// Device identity to embed
        #[arg(long, value_parser = parse_device_id)]
        device_id: DeviceId,

        /// Directory holding the CA
        #[arg(long, default_value = ".jitp/ca")]
        ca_dir: PathBuf,

        /// Write `<device>.cert.pem` and `<device>.private.key` here
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Register the certificate as pending activation
        #[arg(long)]
        register: bool,

        /// Also deliver the registration event (implies `--register`)
        #[arg(long)]
        activate: bool,
    },
}
