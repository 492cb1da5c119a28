//! # Device Pass Client CLI
//!
//! Command-line tool for the device pass service:
//! - Register and manage devices
//! - Grant, revoke and check viewer access passes
//! - Browse passes and the event log
//!
//! ## Usage
//!
//! ```bash
//! export PASS_CALLER=0x00000000000000000000000000000000000000a1
//!
//! # Register a device
//! pass-client register --did did:iot:thermo-17 --name "Greenhouse sensor"
//!
//! # Give a viewer one hour of access
//! pass-client grant --device 0x... --viewer 0x...b2 --duration 3600
//!
//! # Check it
//! pass-client check --device 0x... --viewer 0x...b2
//! ```

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use pass_client::PassClient;
use shared::{
    config::ClientConfig,
    constants::{ENV_CALLER, ENV_SERVICE_URL},
    types::{Device, DeviceRegistrationRequest, PassView},
};

#[derive(Parser)]
#[command(name = "pass-client")]
#[command(about = "Device registry and access pass client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pass service URL
    #[arg(long, env = ENV_SERVICE_URL, default_value = "http://localhost:8080")]
    service_url: String,

    /// Identity to act as (0x + 40 hex digits)
    #[arg(long, env = ENV_CALLER)]
    caller: Option<String>,

    /// Log requests
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a device owned by the caller
    Register {
        /// Decentralized identifier of the device
        #[arg(long)]
        did: String,

        /// Display name
        #[arg(long)]
        name: String,

        #[arg(long, short = 't', default_value = "")]
        device_type: String,

        #[arg(long, default_value = "")]
        manufacturer: String,

        #[arg(long, default_value = "")]
        model: String,

        #[arg(long, default_value = "")]
        serial_number: String,

        #[arg(long, short = 'l', default_value = "")]
        location: String,

        #[arg(long, default_value = "")]
        public_key: String,
    },

    /// Change name and location of a device
    Update {
        #[arg(long, short = 'd')]
        device: String,

        #[arg(long)]
        name: String,

        #[arg(long, short = 'l', default_value = "")]
        location: String,
    },

    /// Flip the active flag of a device
    Toggle {
        #[arg(long, short = 'd')]
        device: String,
    },

    /// Show a device by id or by registration index
    Show {
        #[arg(long, short = 'd', conflicts_with = "index")]
        device: Option<String>,

        #[arg(long, short = 'i')]
        index: Option<u64>,
    },

    /// Count registered devices
    Count,

    /// List devices of an owner (defaults to the caller)
    Owned {
        #[arg(long, short = 'o')]
        owner: Option<String>,
    },

    /// Grant a viewer time-boxed access
    Grant {
        #[arg(long, short = 'd')]
        device: String,

        #[arg(long)]
        viewer: String,

        /// Pass length in seconds
        #[arg(long, default_value = "3600")]
        duration: u64,
    },

    /// Revoke a viewer's access
    Revoke {
        #[arg(long, short = 'd')]
        device: String,

        #[arg(long)]
        viewer: String,
    },

    /// Check whether a viewer has access
    Check {
        #[arg(long, short = 'd')]
        device: String,

        #[arg(long)]
        viewer: String,
    },

    /// List passes granted on a device
    Passes {
        #[arg(long, short = 'd')]
        device: String,
    },

    /// List passes granted to a viewer (defaults to the caller)
    ViewerPasses {
        #[arg(long)]
        viewer: Option<String>,
    },

    /// Print ledger events after a sequence number
    Events {
        #[arg(long, default_value = "0")]
        after: u64,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check service health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let config = ClientConfig {
        service_url: cli.service_url,
        caller: cli.caller,
    };
    let client = PassClient::new(&config);

    match cli.command {
        Commands::Register {
            did,
            name,
            device_type,
            manufacturer,
            model,
            serial_number,
            location,
            public_key,
        } => {
            let request = DeviceRegistrationRequest {
                did,
                name,
                device_type,
                manufacturer,
                model,
                serial_number,
                location,
                public_key,
            };
            let device_id = client.register(&request).await?;

            println!("\n✓ Device registered successfully!");
            println!("  Device ID: {}", device_id);
        }
        Commands::Update {
            device,
            name,
            location,
        } => {
            client.update(&device, &name, &location).await?;
            println!("✓ Device {} updated", device);
        }
        Commands::Toggle { device } => {
            let status = client.toggle(&device).await?;
            println!(
                "✓ Device {} is now {}",
                status.device_id,
                if status.is_active { "active" } else { "inactive" }
            );
        }
        Commands::Show { device, index } => {
            let device = match (device, index) {
                (Some(id), _) => client.device(&id).await?,
                (None, Some(index)) => client.device_at(index).await?,
                (None, None) => anyhow::bail!("pass --device or --index"),
            };
            print_device(&device);
        }
        Commands::Count => {
            println!("{}", client.count().await?);
        }
        Commands::Owned { owner } => {
            let owner = owner
                .or_else(|| client.caller().map(str::to_string))
                .ok_or_else(|| anyhow::anyhow!("pass --owner or --caller"))?;
            let devices = client.devices_of(&owner).await?;

            if devices.is_empty() {
                println!("\nNo devices registered by {}", owner);
            }
            for device in &devices {
                print_device(device);
            }
        }
        Commands::Grant {
            device,
            viewer,
            duration,
        } => {
            let expires_at = client.grant(&device, &viewer, duration).await?;
            println!("\n✓ Access granted");
            println!("  Viewer: {}", viewer);
            println!("  Expires: {}", format_timestamp(expires_at));
        }
        Commands::Revoke { device, viewer } => {
            client.revoke(&device, &viewer).await?;
            println!("✓ Access for {} on {} revoked", viewer, device);
        }
        Commands::Check { device, viewer } => {
            let check = client.check(&device, &viewer).await?;
            if check.has_access {
                println!("✓ {} has access to {}", viewer, device);
            } else {
                println!("✗ {} has no access to {}", viewer, device);
            }
            if check.expires_at > 0 {
                println!("  Expires: {}", format_timestamp(check.expires_at));
            }
        }
        Commands::Passes { device } => {
            print_passes(&client.passes(&device).await?);
        }
        Commands::ViewerPasses { viewer } => {
            let viewer = viewer
                .or_else(|| client.caller().map(str::to_string))
                .ok_or_else(|| anyhow::anyhow!("pass --viewer or --caller"))?;
            print_passes(&client.viewer_passes(&viewer).await?);
        }
        Commands::Events { after, limit } => {
            for event in client.events(after, limit).await? {
                println!(
                    "#{:<6} {} {:<20} device={} actor={}",
                    event.sequence,
                    event.timestamp.to_rfc3339(),
                    event.kind.name(),
                    event.device_id,
                    event.actor
                );
            }
        }
        Commands::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}

fn print_device(device: &Device) {
    println!("\nDevice {}:", device.device_id);
    println!("  DID: {}", device.did);
    println!("  Name: {}", device.name);
    if !device.device_type.is_empty() {
        println!("  Type: {}", device.device_type);
    }
    if !device.location.is_empty() {
        println!("  Location: {}", device.location);
    }
    println!("  Owner: {}", device.owner);
    println!("  Registered: {}", device.registered_at.to_rfc3339());
    println!("  Active: {}", device.is_active);
}

fn print_passes(passes: &[PassView]) {
    if passes.is_empty() {
        println!("\nNo passes found.");
        return;
    }

    for view in passes {
        let pass = &view.pass;
        println!(
            "{}  device={} viewer={} expires={}{}",
            pass.pass_id,
            pass.device_id,
            pass.viewer,
            pass.expires_at.to_rfc3339(),
            if view.is_expired { " (expired)" } else { "" }
        );
    }
}

fn format_timestamp(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(at) => format!("{} ({})", at.to_rfc3339(), secs),
        None => secs.to_string(),
    }
}
