//! News commands

use anyhow::Result;
use skylift_core::Engine;
use skylift_core::auth::Caller;
use skylift_schema::repo::NewsItem;

/// Add or replace a news item in the repository manifest.
#[allow(clippy::too_many_arguments)]
pub async fn add(
    engine: &Engine,
    caller: &Caller,
    identifier: String,
    title: String,
    caption: String,
    app_id: Option<String>,
    image_url: Option<String>,
    notify: bool,
) -> Result<()> {
    let item = NewsItem {
        identifier,
        title,
        caption,
        date: chrono::Utc::now().to_rfc3339(),
        tint_color: String::new(),
        image_url,
        notify,
        app_id,
    };
    let id = item.identifier.clone();
    engine.upsert_news(item, caller).await?;
    println!("  Published news item '{id}'.");
    Ok(())
}

/// Remove a news item from the repository manifest.
pub async fn remove(engine: &Engine, caller: &Caller, identifier: &str) -> Result<()> {
    engine.remove_news(identifier, caller).await?;
    println!("  Removed news item '{identifier}'.");
    Ok(())
}
