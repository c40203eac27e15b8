use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use parley_db::StoreConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub store: StoreConfig,
}

impl Config {
    /// Read `PARLEY_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        let defaults = StoreConfig::default();
        Ok(Self {
            db_path: PathBuf::from(
                std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into()),
            ),
            store: StoreConfig {
                reader_pool_size: parse_var("PARLEY_READER_POOL", defaults.reader_pool_size)?,
                cache_capacity: parse_var("PARLEY_CACHE_CAPACITY", defaults.cache_capacity)?,
                max_thread_depth: parse_var("PARLEY_MAX_THREAD_DEPTH", defaults.max_thread_depth)?,
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
