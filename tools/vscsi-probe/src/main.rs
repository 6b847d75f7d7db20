use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use vscsi_emu::AdapterConfig;

mod config;
mod probe;

use config::Config;
use probe::Session;

fn main() -> anyhow::Result<()> {
    let config = Config::load();

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(&config)
}

fn run(config: &Config) -> anyhow::Result<()> {
    let adapter_config = AdapterConfig::from_path(&config.config_path)
        .with_context(|| format!("load {}", config.config_path.display()))?;

    let session = Session::start(&adapter_config, Duration::from_secs(config.timeout_secs))?;
    let reports = session.probe_all(config.lba, config.blocks);
    session.shutdown()?;
    let reports = reports?;

    if config.json {
        let json = serde_json::to_string_pretty(&reports).context("serialize report")?;
        println!("{json}");
        return Ok(());
    }

    for report in &reports {
        let reads: Vec<String> = report
            .reads
            .iter()
            .map(|read| format!("{}:{:#04x}", read.completion, read.srb_status))
            .collect();
        println!(
            "{} {:?} luns={:?} {} {} {} max_lba={} block_size={} reads=[{}]",
            report.device,
            report.device_type,
            report.luns_on_target,
            report.vendor,
            report.product,
            report.revision,
            report.max_lba,
            report.block_size,
            reads.join(", ")
        );
    }
    Ok(())
}
