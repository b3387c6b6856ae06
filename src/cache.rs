use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use foyer::{
    BlockEngineBuilder, Cache as FoyerCache, CacheBuilder, Compression, DeviceBuilder,
    FsDeviceBuilder, HybridCache, HybridCacheBuilder, RecoverMode,
};
use serde::Deserialize;
use thiserror::Error;

const MODE_MEMORY: &str = "memory";
const MODE_HYBRID: &str = "hybrid";

/// Size of TTL prefix (u64 timestamp).
const TTL_PREFIX_SIZE: usize = 8;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// TTL duration string (e.g., "72h", "30m", "1d").
    #[serde(default = "default_cache_ttl")]
    pub ttl: String,

    /// Cache mode: "memory" or "hybrid".
    #[serde(default = "default_cache_mode")]
    pub mode: String,

    /// Maximum memory in MB for in-memory cache.
    #[serde(default = "default_cache_memory")]
    pub max_memory_mb: u64,

    /// Maximum disk size in MB for hybrid mode.
    #[serde(default = "default_cache_disk")]
    pub max_disk_mb: u64,

    /// Directory for disk cache (hybrid mode only).
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> String {
    "72h".to_string()
}

fn default_cache_mode() -> String {
    "memory".to_string()
}

fn default_cache_memory() -> u64 {
    32
}

fn default_cache_disk() -> u64 {
    256
}

fn default_cache_dir() -> String {
    "/tmp/lexicache-enrichment".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl: default_cache_ttl(),
            mode: default_cache_mode(),
            max_memory_mb: default_cache_memory(),
            max_disk_mb: default_cache_disk(),
            dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache build error: {0}")]
    Build(String),

    #[error("invalid duration: {0}")]
    InvalidTtl(String),

    #[error("invalid cache mode: {0}")]
    InvalidMode(String),
}

/// Cache backend abstraction.
enum CacheBackend {
    Memory(FoyerCache<String, Bytes>),
    Hybrid(HybridCache<String, Bytes>),
}

/// Byte cache with TTL support.
pub struct Cache {
    backend: CacheBackend,
    ttl: Duration,
}

impl Cache {
    /// Create a new cache instance.
    pub async fn new(cfg: &CacheConfig) -> Result<Self, CacheError> {
        let ttl = parse_duration(&cfg.ttl)?;
        let memory_bytes = (cfg.max_memory_mb * 1024 * 1024) as usize;

        let backend = match cfg.mode.as_str() {
            MODE_MEMORY => {
                let cache = CacheBuilder::new(memory_bytes)
                    .with_weighter(|_key, value: &Bytes| value.len())
                    .build();
                CacheBackend::Memory(cache)
            }

            MODE_HYBRID => {
                let disk_bytes = (cfg.max_disk_mb * 1024 * 1024) as usize;

                let device = FsDeviceBuilder::new(&cfg.dir)
                    .with_capacity(disk_bytes)
                    .build()
                    .map_err(|e| CacheError::Build(e.to_string()))?;

                let cache = HybridCacheBuilder::new()
                    .memory(memory_bytes)
                    .storage()
                    .with_compression(Compression::None)
                    .with_engine_config(BlockEngineBuilder::new(device))
                    .with_recover_mode(RecoverMode::Quiet)
                    .build()
                    .await
                    .map_err(|e| CacheError::Build(e.to_string()))?;

                CacheBackend::Hybrid(cache)
            }
            _ => return Err(CacheError::InvalidMode(cfg.mode.clone())),
        };

        Ok(Self { backend, ttl })
    }

    /// Get a value from the cache. Returns None if not found or expired.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let raw = match &self.backend {
            CacheBackend::Memory(c) => c.get(key).map(|e| e.value().clone()),
            CacheBackend::Hybrid(c) => match c.get(key).await {
                Ok(Some(entry)) => Some(entry.value().clone()),
                Ok(None) => None,
                Err(e) => {
                    log::warn!("cache get (hybrid) key={}: error: {}", key, e);
                    None
                }
            },
        }?;

        if raw.len() < TTL_PREFIX_SIZE {
            return None;
        }

        // Creation time is in the first 8 bytes.
        let created_at = u64::from_le_bytes(raw[..TTL_PREFIX_SIZE].try_into().ok()?);
        if now_secs().saturating_sub(created_at) > self.ttl.as_secs() {
            return None;
        }

        Some(raw.slice(TTL_PREFIX_SIZE..))
    }

    /// Store a value in the cache with current timestamp prefix.
    pub fn put(&self, key: &str, value: &[u8]) {
        let mut buf = BytesMut::with_capacity(TTL_PREFIX_SIZE + value.len());
        buf.put_u64_le(now_secs());
        buf.extend_from_slice(value);
        let data = buf.freeze();

        match &self.backend {
            CacheBackend::Memory(c) => {
                c.insert(key.to_string(), data);
            }
            CacheBackend::Hybrid(c) => {
                c.insert(key.to_string(), data);
            }
        }
    }

    /// Close the cache and flush pending writes.
    pub async fn close(&self) {
        if let CacheBackend::Hybrid(c) = &self.backend {
            c.close().await.ok();
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Cache key for a word's morphological analysis.
pub fn make_enrichment_cache_key(lang: &str, normalized_word: &str) -> String {
    let key = format!("e:{}:{}", lang, normalized_word);
    let digest = md5::compute(key.as_bytes());
    format!("e:{:x}", digest)
}

/// Parse a duration string like "1500ms", "2s", "72h", "1d" into Duration.
pub fn parse_duration(s: &str) -> Result<Duration, CacheError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CacheError::InvalidTtl("empty duration".to_string()));
    }

    if let Some(num) = s.strip_suffix("ms") {
        let ms: u64 = num
            .parse()
            .map_err(|_| CacheError::InvalidTtl(s.to_string()))?;
        return Ok(Duration::from_millis(ms));
    }

    let split = s.char_indices().last().map(|(i, _)| i).unwrap_or(0);
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| CacheError::InvalidTtl(s.to_string()))?;

    let secs = match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        _ => return Err(CacheError::InvalidTtl(s.to_string())),
    };

    Ok(Duration::from_secs(secs))
}
