use super::args::*;

pub mod catalog;
pub mod resolve;

use errcat_catalog::{CatalogConfig, ErrorCatalog};

/// Build the catalog config once: environment first, flags on top.
pub fn build_config(global: &GlobalArgs) -> CatalogConfig {
    let mut config = CatalogConfig::from_env();
    if let Some(url) = &global.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(path) = &global.catalog_path {
        config = config.with_catalog_path(path.clone());
    }
    if let Some(secs) = global.timeout.filter(|secs| *secs > 0) {
        config = config.with_timeout_secs(secs);
    }
    if let Some(path) = &global.store {
        config = config.with_store_path(path.clone());
    }
    if global.no_store {
        config = config.without_persistence();
    }
    config
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = build_config(&cli.global);
    let catalog = match ErrorCatalog::from_config(&config) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(e.exit_code());
        }
    };

    let code = match cli.cmd {
        Command::Warm(args) => catalog::warm(&catalog, args).await,
        Command::Resolve(args) => resolve::run(&catalog, args).await,
        Command::Lookup(args) => catalog::lookup(&catalog, args).await,
        Command::Status => catalog::status(&catalog, &config).await,
        Command::Clear => catalog::clear(&catalog),
    };

    // Let snapshot writes and deletes land before the process exits.
    catalog.flush_background().await;
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn flags_override_config() {
        let global = GlobalArgs {
            base_url: Some("http://flags.test".into()),
            catalog_path: Some("/errors".into()),
            timeout: Some(3),
            store: Some(PathBuf::from("/tmp/errcat-test.db")),
            no_store: false,
            json_logs: false,
        };
        let config = build_config(&global);
        assert_eq!(config.base_url, "http://flags.test");
        assert_eq!(config.endpoint().unwrap().as_str(), "http://flags.test/errors");
        assert_eq!(config.timeout(), std::time::Duration::from_secs(3));
        assert_eq!(
            config.resolved_store_path(),
            Some(PathBuf::from("/tmp/errcat-test.db"))
        );
    }

    #[test]
    fn no_store_disables_persistence() {
        let global = GlobalArgs {
            no_store: true,
            ..GlobalArgs::default()
        };
        assert_eq!(build_config(&global).resolved_store_path(), None);
    }
}
