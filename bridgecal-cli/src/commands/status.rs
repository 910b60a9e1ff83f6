use std::path::Path;

use anyhow::Result;

use bridgecal_core::error::exit;
use bridgecal_core::event::Origin;
use bridgecal_core::store::{
    MappingStore, CURSOR_GOOGLE_SYNC_TOKEN, CURSOR_LAST_OUTLOOK_SCAN_AT,
};

pub async fn run(config_path: Option<&Path>) -> Result<i32> {
    let config = super::load_config(config_path)?;
    let store = MappingStore::open(&config.store_path()).await?;

    let rows = store.list_all().await?;
    let outlook_origin = rows.iter().filter(|r| r.origin == Origin::Outlook).count();
    let google_origin = rows.len() - outlook_origin;

    println!("Mapping store: {}", config.store_path().display());
    println!(
        "Pairs: {} ({} outlook-origin, {} google-origin)",
        rows.len(),
        outlook_origin,
        google_origin
    );

    match store.get_cursor(CURSOR_GOOGLE_SYNC_TOKEN).await? {
        Some(_) => println!("Google sync token: present"),
        None => println!("Google sync token: none"),
    }
    if let Some(at) = store.get_cursor(CURSOR_LAST_OUTLOOK_SCAN_AT).await? {
        println!("Last outlook scan: {at}");
    }

    Ok(exit::OK)
}
