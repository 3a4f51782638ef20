use serde::Deserialize;

use crate::bus::BusConfig;
use crate::gate::GateConfig;

pub const REPLAY_BUFFER: usize = 10;
pub const EXTRA_BUFFER: usize = 200;
pub const THROTTLE_THRESHOLD_MS: u64 = 8;
pub const MIN_DELTA_THRESHOLD: f64 = 0.01;
pub const BURST_WINDOW_MS: u64 = 3;
pub const JITTER_HISTORY_CAP: usize = 60;
pub const QUIC_WARMUP_TIMEOUT_MS: u64 = 10_000;
pub const QUIC_READY_FRACTION: f64 = 0.7;
pub const WARMUP_TICK_MS: u64 = 1_000;
pub const INBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Aggregation engine tuning. Every field defaults to the built-in constant.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub replay_buffer: usize,
    pub extra_buffer: usize,
    pub throttle_threshold_ms: u64,
    pub min_delta_threshold: f64,
    pub burst_window_ms: u64,
    pub jitter_history_cap: usize,
    pub quic_warmup_timeout_ms: u64,
    pub quic_ready_fraction: f64,
    pub warmup_tick_ms: u64,
    /// Pending update messages before subscribers wait on the aggregator.
    pub inbox_capacity: usize,
    /// How often the aggregator logs gate stats at INFO (0 disables).
    pub stats_log_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            replay_buffer: REPLAY_BUFFER,
            extra_buffer: EXTRA_BUFFER,
            throttle_threshold_ms: THROTTLE_THRESHOLD_MS,
            min_delta_threshold: MIN_DELTA_THRESHOLD,
            burst_window_ms: BURST_WINDOW_MS,
            jitter_history_cap: JITTER_HISTORY_CAP,
            quic_warmup_timeout_ms: QUIC_WARMUP_TIMEOUT_MS,
            quic_ready_fraction: QUIC_READY_FRACTION,
            warmup_tick_ms: WARMUP_TICK_MS,
            inbox_capacity: INBOX_CAPACITY,
            stats_log_interval_secs: 0,
        }
    }
}

impl EngineConfig {
    pub fn bus(&self) -> BusConfig {
        BusConfig {
            replay: self.replay_buffer,
            extra_buffer: self.extra_buffer,
        }
    }

    pub fn gate(&self) -> GateConfig {
        GateConfig {
            throttle_ms: self.throttle_threshold_ms,
            min_delta: self.min_delta_threshold,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.replay_buffer > 0,
            "engine.replay_buffer must be > 0, got {}",
            self.replay_buffer
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&self.min_delta_threshold),
            "engine.min_delta_threshold must be in [0, 1), got {}",
            self.min_delta_threshold
        );
        anyhow::ensure!(
            self.burst_window_ms > 0,
            "engine.burst_window_ms must be > 0, got {}",
            self.burst_window_ms
        );
        anyhow::ensure!(
            self.jitter_history_cap > 0,
            "engine.jitter_history_cap must be > 0, got {}",
            self.jitter_history_cap
        );
        anyhow::ensure!(
            self.quic_warmup_timeout_ms > 0,
            "engine.quic_warmup_timeout_ms must be > 0, got {}",
            self.quic_warmup_timeout_ms
        );
        anyhow::ensure!(
            self.quic_ready_fraction > 0.0 && self.quic_ready_fraction <= 1.0,
            "engine.quic_ready_fraction must be in (0, 1], got {}",
            self.quic_ready_fraction
        );
        anyhow::ensure!(
            self.warmup_tick_ms > 0,
            "engine.warmup_tick_ms must be > 0, got {}",
            self.warmup_tick_ms
        );
        anyhow::ensure!(
            self.inbox_capacity > 0,
            "engine.inbox_capacity must be > 0, got {}",
            self.inbox_capacity
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Sample host interfaces with sysinfo and feed the throughput dimension.
    pub enabled: bool,
    pub sample_interval_ms: u64,
    /// Interfaces to ignore (loopback by default).
    pub exclude_interfaces: Vec<String>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_ms: 1000,
            exclude_interfaces: vec!["lo".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often to log app stats (ws clients, gate decisions) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Engine config with the monitoring log interval applied.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            stats_log_interval_secs: self.monitoring.stats_log_interval_secs,
            ..self.engine.clone()
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        self.engine.validate()?;
        anyhow::ensure!(
            self.traffic.sample_interval_ms > 0,
            "traffic.sample_interval_ms must be > 0, got {}",
            self.traffic.sample_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}
