use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use bridgecal_core::adapter::SubprocessAdapter;
use bridgecal_core::driver::TickDriver;
use bridgecal_core::event::Origin;
use bridgecal_core::store::MappingStore;
use bridgecal_core::sync::Engine;

pub async fn run(config_path: Option<&Path>) -> Result<i32> {
    let config = super::load_config(config_path)?;
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

    let summary = driver.run_once(&CancellationToken::new()).await?;
    println!("{summary}");

    Ok(summary.exit_code())
}
