//! Exit codes for `errcat`.
//!
//! Catalog failures exit with `CatalogError::exit_code`: 1 for configuration
//! errors, 5 when the endpoint is unreachable, times out or answers non-2xx,
//! 6 when the refresh task dies.

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 2; // Unexpected failure (bad input, I/O)
pub const NOT_FOUND: i32 = 3; // Lookup found no entry
