pub mod disk;
pub mod memory;

use crate::core::cache::PriceCache;
use crate::core::config::AppConfig;
use disk::DiskPriceCache;
use memory::MemoryPriceCache;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens the persistent price cache under the configured data path.
///
/// Falls back to an in-memory cache when the disk store is unavailable, so a
/// locked or unwritable data directory degrades to re-fetching instead of
/// failing the run.
pub fn open_price_cache(config: &AppConfig) -> Arc<dyn PriceCache> {
    let disk = config
        .default_data_path()
        .map(|path| path.join("cache"))
        .and_then(|path| {
            debug!("Opening price cache at {}", path.display());
            DiskPriceCache::open(&path)
        });

    match disk {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Price cache unavailable, using memory: {e:#}");
            Arc::new(MemoryPriceCache::new())
        }
    }
}
