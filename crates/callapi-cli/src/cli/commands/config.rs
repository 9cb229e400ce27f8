//! `callapi config` – show where the config lives and what is in effect.

use anyhow::Result;
use callapi_core::config::{self, CallConfig};

pub fn run_config(cfg: &CallConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
