//! Error catalog cache and message resolution.
//!
//! This crate turns backend error payloads into user-facing text, backed by a
//! catalog of messages fetched from the host application:
//!
//! - HTTP fetcher for the catalog list route with a hard timeout
//! - Two-tier cache (in-memory indexes + durable SQLite snapshot) with a TTL
//! - Single-flight refresh shared by concurrent callers
//! - Resolver with a connectivity sentinel and a fixed fallback chain
//!
//! # Quick Start
//!
//! ```no_run
//! use errcat_catalog::{CatalogConfig, ErrorCatalog, MessageResolver};
//!
//! # async fn example() -> Result<(), errcat_catalog::CatalogError> {
//! let catalog = ErrorCatalog::from_config(&CatalogConfig::from_env())?;
//! let resolver = MessageResolver::new(catalog);
//!
//! let payload = serde_json::json!({"digitalMessageException": {"code": 1001}});
//! let text = resolver.resolve_message(&payload, Some("Request failed")).await;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `ERRCAT_BASE_URL` | Host application origin (also `ERRCAT_ORIGIN`, `APP_BASE_URL`; default: `http://localhost:3000`) |
//! | `ERRCAT_CATALOG_PATH` | Catalog route path or absolute URL (default: `/api/error-catalog`) |
//! | `ERRCAT_TIMEOUT_SECS` | Fetch timeout in seconds (default: 10) |
//! | `ERRCAT_TTL_SECS` | Snapshot TTL in seconds (default: 86400) |
//! | `ERRCAT_STORE_PATH` | SQLite database path (default: `<cache dir>/errcat/catalog.db`) |
//! | `ERRCAT_NO_STORE` | Disable the durable snapshot |

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod resolver;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::{BackgroundFailure, CatalogIndex, CatalogStats, ErrorCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CatalogConfig;
pub use error::{CatalogError, CatalogResult, StoreError, StoreResult};
pub use fetcher::{CatalogSource, HttpCatalogFetcher};
pub use resolver::{
    extract_exception, ExceptionFields, ExceptionPayload, MessageResolver, ResolverMessages,
    CONNECTIVITY_ERROR_CODE,
};
pub use store::KvStore;
pub use types::CatalogEntry;
