//! Config command handlers.

use anyhow::{Context, Result};
use signon_core::config;

pub fn path() -> Result<()> {
    println!("{}", config::paths::config_path().display());
    Ok(())
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    let created = config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    if created {
        println!("Created config at {}", config_path.display());
    } else {
        println!("Refreshed config at {}", config_path.display());
    }
    Ok(())
}
