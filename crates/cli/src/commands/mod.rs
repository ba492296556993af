//! Subcommand implementations

pub mod quote;
pub mod report;

use anyhow::{Context, Result};
use std::path::Path;
use vmcost_lib::pricing::PriceCache;

use crate::output::print_warning;

/// Load the persisted price cache, starting empty when it cannot be read
pub(crate) fn load_price_cache(path: &Path, refresh: bool) -> PriceCache {
    if refresh {
        return PriceCache::new();
    }
    match PriceCache::load(path) {
        Ok(cache) => cache,
        Err(e) => {
            print_warning(&format!("Ignoring unreadable price cache: {}", e));
            PriceCache::new()
        }
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}
