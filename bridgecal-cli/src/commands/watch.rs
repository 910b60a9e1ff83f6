use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use bridgecal_core::adapter::SubprocessAdapter;
use bridgecal_core::driver::TickDriver;
use bridgecal_core::error::exit;
use bridgecal_core::event::Origin;
use bridgecal_core::store::MappingStore;
use bridgecal_core::sync::Engine;

pub async fn run(config_path: Option<&Path>, interval: Option<&str>) -> Result<i32> {
    let config = super::load_config(config_path)?;

    let interval = match interval {
        Some(text) => humantime::parse_duration(text)
            .map_err(|e| anyhow::anyhow!("invalid interval '{text}': {e}"))?,
        None => Duration::from_secs(config.interval_seconds),
    };

    let store = MappingStore::open(&config.store_path()).await?;
    let outlook = SubprocessAdapter::new(Origin::Outlook, &config.outlook);
    let google = SubprocessAdapter::new(Origin::Google, &config.google);

    let engine = Engine::new(
        &outlook,
        &google,
        &store,
        config.window(),
        config.redaction_mode,
    );
    let driver = TickDriver::new(engine);

    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing current tick");
            handle.cancel();
        }
    });

    tracing::info!(interval = ?interval, "watching");
    driver.run_loop(interval, &cancel).await?;

    Ok(exit::OK)
}
