//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CatalogResult;
use crate::fetcher::CatalogSource;
use crate::types::CatalogEntry;

/// Catalog source that counts calls and answers with a canned response.
#[derive(Debug)]
pub(crate) struct FakeSource {
    calls: AtomicUsize,
    response: Mutex<CatalogResult<Vec<CatalogEntry>>>,
    delay: Duration,
}

impl FakeSource {
    pub(crate) fn new(entries: Vec<CatalogEntry>) -> Arc<Self> {
        Self::slow(entries, Duration::ZERO)
    }

    pub(crate) fn slow(entries: Vec<CatalogEntry>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Ok(entries)),
            delay,
        })
    }

    pub(crate) fn failing(error: crate::error::CatalogError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Err(error)),
            delay: Duration::ZERO,
        })
    }

    pub(crate) fn respond(&self, response: CatalogResult<Vec<CatalogEntry>>) {
        *self.response.lock().unwrap() = response;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn fetch_entries(&self) -> CatalogResult<Vec<CatalogEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response.lock().unwrap().clone()
    }
}
