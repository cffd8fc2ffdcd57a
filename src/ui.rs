use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use toml::Table;

use crate::netz::bitmap::{argmax, parse_bitmap, LABELS};
use crate::netz::dump::parse_network_dump;
use crate::sim::config::{Config, NetzpConfig};
use crate::sim::top::NetzpTop;

#[derive(Parser)]
#[command(version, about = "Cycle-accurate simulator of a small neural-inference accelerator")]
pub struct NetzpArgs {
    #[arg(help = "Path to the 7x7 input bitmap")]
    pub input_path: PathBuf,
    #[arg(help = "Path to the network weight dump")]
    pub network_path: PathBuf,
    #[arg(long, help = "Path to config.toml")]
    pub config_path: Option<PathBuf>,
    #[arg(long, help = "Override number of computation cores")]
    pub cores: Option<usize>,
    #[arg(long, help = "Override simulation cycle cap")]
    pub timeout: Option<u64>,
}

/// Build a config from the optional TOML file, then let CLI arguments
/// override it.
pub fn make_config(args: &NetzpArgs) -> Result<NetzpConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            let table: Table = toml::from_str(&text).context("cannot parse config toml")?;
            NetzpConfig::from_section(table.get("sim"))
        }
        None => NetzpConfig::default(),
    };

    config.core_count = args.cores.unwrap_or(config.core_count);
    config.timeout = args.timeout.unwrap_or(config.timeout);
    Ok(config)
}

pub fn run(args: &NetzpArgs) -> Result<()> {
    let config = make_config(args)?;

    let bitmap_text = fs::read_to_string(&args.input_path)
        .with_context(|| format!("cannot read input file {}", args.input_path.display()))?;
    let bitmap = parse_bitmap(&bitmap_text)
        .with_context(|| format!("bad bitmap in {}", args.input_path.display()))?;

    let dump_text = fs::read_to_string(&args.network_path)
        .with_context(|| format!("cannot read network dump {}", args.network_path.display()))?;
    let netz = parse_network_dump(&dump_text)
        .with_context(|| format!("bad weight dump in {}", args.network_path.display()))?;

    let mut top = NetzpTop::new(&config);
    let outputs = top.run_inference(&bitmap, &netz)?;

    for (index, score) in outputs.iter().enumerate() {
        let label = LABELS.get(index).copied().unwrap_or("?");
        println!("output {index} ({label}): {score:.6}");
    }
    match argmax(&outputs) {
        Some(best) => println!(
            "classified as: {}",
            LABELS.get(best).copied().unwrap_or("?")
        ),
        None => println!("network produced no outputs"),
    }
    Ok(())
}
