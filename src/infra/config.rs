//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "kigali-lot-1")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "parkgate".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlateConfig {
    /// Series marker the OCR extractor hunts for in raw text
    #[serde(default = "default_plate_marker")]
    pub marker: String,
    /// Corroborating reads required before a vote resolves
    #[serde(default = "default_vote_quorum")]
    pub vote_quorum: usize,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self { marker: default_plate_marker(), vote_quorum: default_vote_quorum() }
    }
}

fn default_plate_marker() -> String {
    crate::domain::plate::DEFAULT_PLATE_MARKER.to_string()
}

fn default_vote_quorum() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaneConfig {
    #[serde(default = "default_lane_enabled")]
    pub enabled: bool,
    /// TCP port the external vision process connects to
    pub vision_port: u16,
    /// Serial device for the lane's gate controller board
    pub serial_device: String,
    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,
    /// Lane-specific cooldown in seconds (re-admission window on entry,
    /// post-violation suppression on exit)
    pub cooldown_secs: u64,
}

fn default_lane_enabled() -> bool {
    true
}

fn default_serial_baud() -> u32 {
    9600
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_lane_enabled")]
    pub enabled: bool,
    pub serial_device: String,
    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            serial_device: "/dev/ttyACM2".to_string(),
            serial_baud: default_serial_baud(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    /// Charged per hour, prorated per minute, in whole currency units
    #[serde(default = "default_rate_per_hour")]
    pub rate_per_hour: u64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self { rate_per_hour: default_rate_per_hour() }
    }
}

fn default_rate_per_hour() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// How long the barrier stays open after an admit/release
    #[serde(default = "default_gate_dwell_secs")]
    pub dwell_secs: u64,
    /// Gate worker tick interval driving the state machine
    #[serde(default = "default_gate_tick_ms")]
    pub tick_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { dwell_secs: default_gate_dwell_secs(), tick_ms: default_gate_tick_ms() }
    }
}

fn default_gate_dwell_secs() -> u64 {
    15
}

fn default_gate_tick_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for session/alert egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "sessions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub plate: PlateConfig,
    pub entry: LaneConfig,
    pub exit: LaneConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    plate_marker: String,
    vote_quorum: usize,
    entry_enabled: bool,
    entry_vision_port: u16,
    entry_serial_device: String,
    entry_serial_baud: u32,
    entry_cooldown_secs: u64,
    exit_enabled: bool,
    exit_vision_port: u16,
    exit_serial_device: String,
    exit_serial_baud: u32,
    exit_cooldown_secs: u64,
    payment_enabled: bool,
    payment_serial_device: String,
    payment_serial_baud: u32,
    rate_per_hour: u64,
    gate_dwell_secs: u64,
    gate_tick_ms: u64,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "parkgate".to_string(),
            plate_marker: default_plate_marker(),
            vote_quorum: 3,
            entry_enabled: true,
            entry_vision_port: 25901,
            entry_serial_device: "/dev/ttyACM0".to_string(),
            entry_serial_baud: 9600,
            entry_cooldown_secs: 300,
            exit_enabled: true,
            exit_vision_port: 25902,
            exit_serial_device: "/dev/ttyACM1".to_string(),
            exit_serial_baud: 9600,
            exit_cooldown_secs: 30,
            payment_enabled: true,
            payment_serial_device: "/dev/ttyACM2".to_string(),
            payment_serial_baud: 9600,
            rate_per_hour: 500,
            gate_dwell_secs: 15,
            gate_tick_ms: 100,
            egress_file: "sessions.jsonl".to_string(),
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            plate_marker: toml_config.plate.marker,
            vote_quorum: toml_config.plate.vote_quorum,
            entry_enabled: toml_config.entry.enabled,
            entry_vision_port: toml_config.entry.vision_port,
            entry_serial_device: toml_config.entry.serial_device,
            entry_serial_baud: toml_config.entry.serial_baud,
            entry_cooldown_secs: toml_config.entry.cooldown_secs,
            exit_enabled: toml_config.exit.enabled,
            exit_vision_port: toml_config.exit.vision_port,
            exit_serial_device: toml_config.exit.serial_device,
            exit_serial_baud: toml_config.exit.serial_baud,
            exit_cooldown_secs: toml_config.exit.cooldown_secs,
            payment_enabled: toml_config.payment.enabled,
            payment_serial_device: toml_config.payment.serial_device,
            payment_serial_baud: toml_config.payment.serial_baud,
            rate_per_hour: toml_config.tariff.rate_per_hour,
            gate_dwell_secs: toml_config.gate.dwell_secs,
            gate_tick_ms: toml_config.gate.tick_ms,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        let config_path = Self::resolve_config_path(args);
        Self::load_from_path(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn plate_marker(&self) -> &str {
        &self.plate_marker
    }

    pub fn vote_quorum(&self) -> usize {
        self.vote_quorum
    }

    pub fn entry_enabled(&self) -> bool {
        self.entry_enabled
    }

    pub fn entry_vision_port(&self) -> u16 {
        self.entry_vision_port
    }

    pub fn entry_serial_device(&self) -> &str {
        &self.entry_serial_device
    }

    pub fn entry_serial_baud(&self) -> u32 {
        self.entry_serial_baud
    }

    pub fn entry_cooldown_secs(&self) -> u64 {
        self.entry_cooldown_secs
    }

    pub fn exit_enabled(&self) -> bool {
        self.exit_enabled
    }

    pub fn exit_vision_port(&self) -> u16 {
        self.exit_vision_port
    }

    pub fn exit_serial_device(&self) -> &str {
        &self.exit_serial_device
    }

    pub fn exit_serial_baud(&self) -> u32 {
        self.exit_serial_baud
    }

    pub fn exit_cooldown_secs(&self) -> u64 {
        self.exit_cooldown_secs
    }

    pub fn payment_enabled(&self) -> bool {
        self.payment_enabled
    }

    pub fn payment_serial_device(&self) -> &str {
        &self.payment_serial_device
    }

    pub fn payment_serial_baud(&self) -> u32 {
        self.payment_serial_baud
    }

    pub fn rate_per_hour(&self) -> u64 {
        self.rate_per_hour
    }

    pub fn gate_dwell_secs(&self) -> u64 {
        self.gate_dwell_secs
    }

    pub fn gate_tick_ms(&self) -> u64 {
        self.gate_tick_ms
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
