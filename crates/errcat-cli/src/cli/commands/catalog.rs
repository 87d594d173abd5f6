//! `warm`, `lookup`, `status` and `clear`.

use errcat_catalog::{CatalogConfig, CatalogEntry, ErrorCatalog};
use serde_json::json;
use tracing::info;

use crate::cli::args::{LookupArgs, WarmArgs};
use crate::exit_codes::{NOT_FOUND, SUCCESS};

pub async fn warm(catalog: &ErrorCatalog, args: WarmArgs) -> anyhow::Result<i32> {
    if let Err(e) = catalog.init_catalog(args.force).await {
        eprintln!("error: {}", e);
        return Ok(e.exit_code());
    }

    let stats = catalog.stats();
    info!(codes = stats.codes, keys = stats.keys, "catalog ready");
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "codes": stats.codes,
            "keys": stats.keys,
            "populated_at": stats.populated_at.map(|ts| ts.to_rfc3339()),
        }))?
    );
    Ok(SUCCESS)
}

pub async fn lookup(catalog: &ErrorCatalog, args: LookupArgs) -> anyhow::Result<i32> {
    if let Err(e) = catalog.init_catalog(false).await {
        eprintln!("error: {}", e);
        return Ok(e.exit_code());
    }

    let entry = match (args.code, args.key.as_deref()) {
        (Some(code), _) => catalog.by_code(code),
        (None, Some(key)) => catalog.by_key(key),
        (None, None) => None,
    };

    match entry {
        Some(entry) => {
            println!("{}", entry_json(&entry)?);
            Ok(SUCCESS)
        }
        None => {
            eprintln!("no catalog entry found");
            Ok(NOT_FOUND)
        }
    }
}

pub async fn status(catalog: &ErrorCatalog, config: &CatalogConfig) -> anyhow::Result<i32> {
    let restored = catalog.restore_from_store().await;
    let stats = catalog.stats();

    let endpoint = config.endpoint().map(|url| url.to_string()).ok();
    let store = config
        .resolved_store_path()
        .map(|path| path.display().to_string());

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "endpoint": endpoint,
            "store": store,
            "ttl_secs": config.ttl_secs,
            "timeout_secs": config.timeout().as_secs(),
            "snapshot": {
                "fresh": restored,
                "codes": stats.codes,
                "keys": stats.keys,
                "populated_at": stats.populated_at.map(|ts| ts.to_rfc3339()),
            },
        }))?
    );
    Ok(SUCCESS)
}

pub fn clear(catalog: &ErrorCatalog) -> anyhow::Result<i32> {
    catalog.clear_cache();
    println!("catalog cleared");
    Ok(SUCCESS)
}

fn entry_json(entry: &CatalogEntry) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(entry)?)
}
