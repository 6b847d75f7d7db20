use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "vscsi-probe",
    version,
    about = "Attach the units described by an adapter config and walk each one through enumeration, INQUIRY, READ CAPACITY and two reads."
)]
struct Args {
    /// Adapter configuration (JSON).
    ///
    /// Environment variable: `VSCSI_CONFIG`.
    #[arg(long, env = "VSCSI_CONFIG", value_name = "PATH")]
    config: PathBuf,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `VSCSI_LOG_LEVEL`.
    #[arg(long, env = "VSCSI_LOG_LEVEL")]
    log_level: Option<String>,

    /// First block of the probe reads.
    #[arg(long, value_name = "LBA", default_value_t = 0)]
    lba: u32,

    /// Blocks per probe read.
    #[arg(long, value_name = "BLOCKS", default_value_t = 8)]
    blocks: u32,

    /// Seconds to wait for a deferred request to complete.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Print the report as JSON instead of one line per unit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub log_level: String,
    pub lba: u32,
    pub blocks: u32,
    pub timeout_secs: u64,
    pub json: bool,
}

impl Config {
    pub fn load() -> Self {
        let args = Args::parse();

        let log_level = args
            .log_level
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string());

        Self {
            config_path: args.config,
            log_level,
            lba: args.lba,
            blocks: args.blocks.max(1),
            timeout_secs: args.timeout_secs,
            json: args.json,
        }
    }
}
