use serde::Serialize;
use std::env;

use crate::error::ConfigError;

/// Base units per coin. All amounts in the simulator are integer base units.
pub const COIN: u64 = 100_000_000;

/// Basis-point denominator for `redistribution_bps`.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Two hours, the accepted drift of a block timestamp around validation time.
pub const DEFAULT_MAX_TIMESTAMP_DRIFT_MS: i64 = 2 * 60 * 60 * 1000;

/// Immutable parameter bundle consumed by every part of the simulator.
///
/// Built once (from defaults or the environment), validated, then shared as
/// `Arc<SimConfig>`. Nothing downstream falls back to its own defaults.
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Coinbase reward in base units.
    pub block_reward: u64,
    /// Proof-of-work target as a hex magnitude (optional `0x` prefix).
    pub ceiling: String,
    /// Share of each reward redistributed to peers, in basis points.
    pub redistribution_bps: u32,
    /// `sourceOutputId` marking a block-reward input.
    pub reward_sentinel: String,
    /// `previousHeaderHash` of every genesis block.
    pub genesis_prev_sentinel: String,
    /// Nonce attempts per mining batch before yielding.
    pub mining_batch_size: u32,
    pub min_network_delay_ms: u64,
    pub max_network_delay_ms: u64,
    pub max_timestamp_drift_ms: i64,
    pub node_count: usize,
    pub height_probe_interval_ms: u64,
    pub host: String,
    pub port: u16,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            block_reward: 4 * COIN,
            ceiling: format!("0x0001{}", "0".repeat(60)),
            redistribution_bps: 5_000,
            reward_sentinel: String::from("COINBASE-REWARD"),
            genesis_prev_sentinel: "0".repeat(64),
            mining_batch_size: 1_000,
            min_network_delay_ms: 50,
            max_network_delay_ms: 200,
            max_timestamp_drift_ms: DEFAULT_MAX_TIMESTAMP_DRIFT_MS,
            node_count: 4,
            height_probe_interval_ms: 2_000,
            host: String::from("127.0.0.1"),
            port: 8080,
        }
    }
}

impl SimConfig {
    /// Load from environment variables (call `dotenvy::dotenv()` first).
    /// Unset or unparsable variables keep the reference value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let cfg = Self {
            block_reward: parse_env("BLOCK_REWARD", d.block_reward),
            ceiling: env::var("CEILING").unwrap_or(d.ceiling),
            redistribution_bps: parse_env("REDISTRIBUTION_BPS", d.redistribution_bps),
            reward_sentinel: env::var("REWARD_SENTINEL").unwrap_or(d.reward_sentinel),
            genesis_prev_sentinel: env::var("GENESIS_PREV_SENTINEL")
                .unwrap_or(d.genesis_prev_sentinel),
            mining_batch_size: parse_env("MINING_BATCH_SIZE", d.mining_batch_size),
            min_network_delay_ms: parse_env("MIN_NETWORK_DELAY_MS", d.min_network_delay_ms),
            max_network_delay_ms: parse_env("MAX_NETWORK_DELAY_MS", d.max_network_delay_ms),
            max_timestamp_drift_ms: parse_env("MAX_TIMESTAMP_DRIFT_MS", d.max_timestamp_drift_ms),
            node_count: parse_env("NODE_COUNT", d.node_count),
            height_probe_interval_ms: parse_env(
                "HEIGHT_PROBE_INTERVAL_MS",
                d.height_probe_interval_ms,
            ),
            host: env::var("HOST").unwrap_or(d.host),
            port: parse_env("PORT", d.port),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_reward == 0 {
            return Err(ConfigError::ZeroReward);
        }
        if u64::from(self.redistribution_bps) > BPS_DENOMINATOR {
            return Err(ConfigError::RatioOutOfRange(self.redistribution_bps));
        }
        let ceiling = strip_hex_prefix(&self.ceiling);
        if ceiling.is_empty() || !ceiling.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidCeiling(self.ceiling.clone()));
        }
        if self.mining_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.min_network_delay_ms > self.max_network_delay_ms {
            return Err(ConfigError::DelayBounds {
                min: self.min_network_delay_ms,
                max: self.max_network_delay_ms,
            });
        }
        if self.height_probe_interval_ms == 0 {
            return Err(ConfigError::ZeroProbeInterval);
        }
        if self.reward_sentinel.is_empty() || self.genesis_prev_sentinel.is_empty() {
            return Err(ConfigError::EmptySentinel);
        }
        Ok(())
    }
}

pub(crate) fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
