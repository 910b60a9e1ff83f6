pub mod status;
pub mod sync;
pub mod watch;

use std::path::Path;

use anyhow::Result;

use bridgecal_core::config::BridgeConfig;

pub(crate) fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::load_from(path)?,
        None => BridgeConfig::load()?,
    };
    Ok(config)
}
