//! Unit price resolution with a run-wide cache
//!
//! Quotes are keyed by [`PriceKey`] and written at most once per run. A miss
//! triggers one remote lookup for the (region, size) pair, which fills the
//! entries of both billing classes. The cache is persisted as
//! `pricing_data.json` so later runs can skip the remote lookups.

mod retail;

pub use retail::{quote_from_items, RetailPriceClient, RetailPriceItem, DEFAULT_PRICING_ENDPOINT};

use crate::collector::Fetched;
use crate::error::ReportError;
use crate::models::{BillingClass, PriceKey, PriceQuote};
use crate::observability::RunLogger;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Source of raw retail price meters
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch every meter for a VM size in a region
    async fn fetch(&self, region: &str, size: &str) -> anyhow::Result<Vec<RetailPriceItem>>;
}

/// Price quotes resolved so far
#[derive(Debug, Default)]
pub struct PriceCache {
    quotes: BTreeMap<PriceKey, PriceQuote>,
    /// Keys that resolved to nothing; `Some` holds the failure reason
    unresolved: HashMap<PriceKey, Option<String>>,
    remote_lookups: usize,
    logger: RunLogger,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Number of remote lookups performed by this cache
    pub fn remote_lookups(&self) -> usize {
        self.remote_lookups
    }

    /// Look up a key without resolving it
    pub fn get(&self, key: &PriceKey) -> Fetched<&PriceQuote> {
        if let Some(quote) = self.quotes.get(key) {
            return Fetched::Value(quote);
        }
        match self.unresolved.get(key) {
            Some(Some(reason)) => Fetched::Failed(reason.clone()),
            _ => Fetched::NoData,
        }
    }

    /// Store a quote unless the key already has one
    pub fn insert(&mut self, key: PriceKey, quote: PriceQuote) -> bool {
        if self.quotes.contains_key(&key) {
            return false;
        }
        self.unresolved.remove(&key);
        self.quotes.insert(key, quote);
        true
    }

    fn resolved(&self, key: &PriceKey) -> bool {
        self.quotes.contains_key(key) || self.unresolved.contains_key(key)
    }

    fn mark_unresolved(&mut self, key: PriceKey, reason: Option<String>) {
        if !self.resolved(&key) {
            self.unresolved.insert(key, reason);
        }
    }

    /// Resolve a key, asking `source` only when it has not been seen yet
    pub async fn quote(&mut self, source: &dyn PriceSource, key: &PriceKey) -> Fetched<PriceQuote> {
        let hit = self.resolved(key);
        self.logger.log_price_lookup(&key.to_string(), hit);

        if !hit {
            self.remote_lookups += 1;
            let classes = [BillingClass::Linux, BillingClass::Windows];
            match source.fetch(&key.region, &key.size).await {
                Ok(items) => {
                    for class in classes {
                        let class_key = key.with_class(class);
                        match quote_from_items(&items, class) {
                            Some(quote) => {
                                self.insert(class_key, quote);
                            }
                            None => self.mark_unresolved(class_key, None),
                        }
                    }
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    self.logger.log_price_failure(&key.to_string(), &reason);
                    for class in classes {
                        self.mark_unresolved(key.with_class(class), Some(reason.clone()));
                    }
                }
            }
        }

        match self.get(key) {
            Fetched::Value(quote) => Fetched::Value(quote.clone()),
            Fetched::NoData => Fetched::NoData,
            Fetched::Failed(reason) => Fetched::Failed(reason),
        }
    }

    /// Load a cache file written by [`PriceCache::save`].
    ///
    /// A missing file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(ReportError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let entries: BTreeMap<String, PriceQuote> = serde_json::from_str(&raw)?;
        let mut cache = Self::new();
        for (key, quote) in entries {
            let key: PriceKey = key.parse().map_err(ReportError::CacheEntry)?;
            cache.insert(key, quote);
        }
        Ok(cache)
    }

    /// Write every resolved quote as a flat `region|size|class` map
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let entries: BTreeMap<String, &PriceQuote> = self
            .quotes
            .iter()
            .map(|(key, quote)| (key.to_string(), quote))
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
