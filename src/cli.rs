use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::gateway::GatewayRegistry;
use crate::startup::validate_config;

#[derive(Parser)]
#[command(name = "payment-router")]
#[command(about = "Payment Router - routes deposits and withdrawals across payment gateways", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file (defaults to CONFIG_PATH or config/config.yaml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Validate the configuration and print a report
    Config,
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    let report = validate_config(config, &GatewayRegistry::with_builtin_protocols());
    report.print();

    println!("Gateways (round-robin order):");
    for (id, gateway) in &config.gateways {
        println!(
            "  {} [{}] {} {}",
            id,
            gateway.protocol,
            gateway.url,
            if gateway.enabled { "enabled" } else { "disabled" }
        );
    }

    if !report.is_valid() {
        anyhow::bail!("configuration validation failed");
    }

    Ok(())
}
