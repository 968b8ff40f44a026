// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence - compliant SMS follow-up scheduling.
//!
//! This is the binary entry point for the Cadence service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod webhook;

use std::path::PathBuf;

use cadence_config::model::CadenceConfig;
use clap::{Parser, Subcommand};

/// Cadence - compliant SMS follow-up scheduling.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the delivery triggers and the inbound webhook until signalled.
    Serve,
    /// Run a single sweep over due and stalled touchpoints, then exit.
    Sweep,
    /// Build the follow-up timetable for a contact.
    Schedule {
        /// Contact identifier.
        contact_id: String,
    },
    /// Cancel every pending touchpoint of a contact.
    Cancel {
        /// Contact identifier.
        contact_id: String,
    },
    /// Mark a contact active again and restore its future touchpoints.
    Reactivate {
        /// Contact identifier.
        contact_id: String,
    },
    /// Print a contact's touchpoints as JSON.
    Status {
        /// Contact identifier.
        contact_id: String,
    },
    /// Add a contact and build its follow-up timetable.
    Enroll(commands::EnrollArgs),
    /// Write the built-in templates into the database.
    SeedTemplates {
        /// Replace templates that already exist for a day and variant.
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration and exit.
    CheckConfig {
        /// Print the effective configuration as TOML.
        #[arg(long)]
        print: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> CadenceConfig {
    let loaded = match path {
        Some(path) => cadence_config::load_and_validate_path(path),
        None => cadence_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            cadence_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config, cli.config).await,
        Some(Commands::Sweep) => commands::run_sweep(config).await,
        Some(Commands::Schedule { contact_id }) => {
            commands::run_schedule(config, &contact_id).await
        }
        Some(Commands::Cancel { contact_id }) => commands::run_cancel(config, &contact_id).await,
        Some(Commands::Reactivate { contact_id }) => {
            commands::run_reactivate(config, &contact_id).await
        }
        Some(Commands::Status { contact_id }) => commands::run_status(config, &contact_id).await,
        Some(Commands::Enroll(args)) => commands::run_enroll(config, args).await,
        Some(Commands::SeedTemplates { force }) => {
            commands::run_seed_templates(config, force).await
        }
        Some(Commands::CheckConfig { print }) => {
            if print {
                match cadence_config::render_effective(&config) {
                    Ok(rendered) => print!("{rendered}"),
                    Err(e) => eprintln!("cadence: could not render config: {e}"),
                }
            }
            println!(
                "cadence: config OK (service.name={}, trigger={:?})",
                config.service.name, config.delivery.trigger
            );
            Ok(())
        }
        None => {
            println!("cadence: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("cadence: {e}");
        std::process::exit(1);
    }
}
