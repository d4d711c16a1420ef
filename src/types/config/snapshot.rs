use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::paginator::{
    PaginationSettings, WindowStrategy, DEFAULT_BLOCKS_PER_DAY, DEFAULT_BLOCKS_PER_PAGE,
    DEFAULT_PAGES_PER_DAY,
};
use crate::rpc::{RateLimitConfig, RetryConfig};
use crate::snapshot::SnapshotSettings;
use crate::types::config::contract::ContractAddresses;

pub const DEFAULT_POOL_COUNT: u64 = 5;

fn default_rpc_urls_env_var() -> String {
    "RPC_URLS".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/snapshots")
}

fn default_pool_count() -> u64 {
    DEFAULT_POOL_COUNT
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowConfig {
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub days: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub blocks_per_day: u64,
    pub pages_per_day: u64,
    pub blocks_per_page: u64,
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            blocks_per_day: DEFAULT_BLOCKS_PER_DAY,
            pages_per_day: DEFAULT_PAGES_PER_DAY,
            blocks_per_page: DEFAULT_BLOCKS_PER_PAGE,
            batch_size: 50,
            inter_batch_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfigRaw {
    #[serde(default = "default_rpc_urls_env_var")]
    pub rpc_urls_env_var: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default = "default_pool_count")]
    pub pool_count: u64,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub archive_raw_events: bool,
    #[serde(default)]
    pub retry: RetrySettings,
    pub rate_limit: Option<RateLimitSettings>,
    #[serde(default)]
    pub contracts: ContractAddresses,
}

/// Everything the pipeline needs, after environment overrides.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub rpc_urls: Vec<String>,
    pub retry: RetryConfig,
    pub rate_limit: Option<RateLimitConfig>,
    pub settings: SnapshotSettings,
}

impl SnapshotConfigRaw {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file at {}", path.display()))
    }

    /// Applies environment overrides. `env` is a variable lookup so that
    /// resolution can be exercised without touching the process environment.
    pub fn resolve<F>(self, env: F) -> anyhow::Result<SnapshotConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_urls: Vec<String> = env(&self.rpc_urls_env_var)
            .with_context(|| format!("env var {} not set", self.rpc_urls_env_var))?
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        anyhow::ensure!(
            !rpc_urls.is_empty(),
            "env var {} contains no endpoint URLs",
            self.rpc_urls_env_var
        );

        let start_block = parse_override(&env, "START_BLOCK")?.or(self.window.start_block);
        let end_block = parse_override(&env, "END_BLOCK")?.or(self.window.end_block);
        let days = parse_override(&env, "DAYS")?.or(self.window.days);

        let window = match (start_block, end_block, days) {
            (Some(from), Some(to), _) => {
                anyhow::ensure!(
                    from <= to,
                    "start block {} is after end block {}",
                    from,
                    to
                );
                WindowStrategy::FixedRange { from, to }
            }
            (_, _, Some(days)) => WindowStrategy::LatestRelative { days },
            _ => anyhow::bail!(
                "no scan window configured: set START_BLOCK and END_BLOCK, or DAYS"
            ),
        };

        let pool_count = parse_override(&env, "POOL_COUNT")?.unwrap_or(self.pool_count);
        let batch_size =
            parse_override(&env, "RPC_BATCH_SIZE")?.unwrap_or(self.pagination.batch_size);
        anyhow::ensure!(batch_size > 0, "batch size must be at least 1");
        let inter_batch_delay_ms = parse_override(&env, "INTER_BATCH_DELAY_MS")?
            .unwrap_or(self.pagination.inter_batch_delay_ms);

        let retry = RetryConfig {
            max_retries: parse_override(&env, "RPC_MAX_RETRIES")?
                .unwrap_or(self.retry.max_retries),
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
        };

        let requests_per_second = parse_override::<u32, _>(&env, "RPC_REQUESTS_PER_SECOND")?
            .or(self.rate_limit.map(|r| r.requests_per_second));
        let rate_limit = requests_per_second
            .and_then(NonZeroU32::new)
            .map(RateLimitConfig::per_second);

        Ok(SnapshotConfig {
            rpc_urls,
            retry,
            rate_limit,
            settings: SnapshotSettings {
                output_dir: self.output_dir,
                window,
                pagination: PaginationSettings {
                    blocks_per_day: self.pagination.blocks_per_day,
                    pages_per_day: self.pagination.pages_per_day,
                    blocks_per_page: self.pagination.blocks_per_page,
                    batch_size,
                    inter_batch_delay: Duration::from_millis(inter_batch_delay_ms),
                },
                contracts: self.contracts,
                pool_count,
                archive_raw_events: self.archive_raw_events,
            },
        })
    }
}

fn parse_override<T, F>(env: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("invalid value {:?} for {}", value, key))
        })
        .transpose()
}
