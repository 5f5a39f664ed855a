use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "FEED_CLARITY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(default = "default_rescan_interval", with = "humantime_serde")]
    pub rescan_interval: Duration,
    #[serde(default = "default_frame_interval", with = "humantime_serde")]
    pub frame_interval: Duration,
    #[serde(default = "default_body_poll_interval", with = "humantime_serde")]
    pub body_poll_interval: Duration,
    #[serde(default = "default_observer_throttle", with = "humantime_serde")]
    pub observer_throttle: Duration,
    #[serde(default = "default_batch_debounce", with = "humantime_serde")]
    pub batch_debounce: Duration,
    #[serde(default = "default_prune_interval", with = "humantime_serde")]
    pub prune_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            rescan_interval: default_rescan_interval(),
            frame_interval: default_frame_interval(),
            body_poll_interval: default_body_poll_interval(),
            observer_throttle: default_observer_throttle(),
            batch_debounce: default_batch_debounce(),
            prune_interval: default_prune_interval(),
        }
    }
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_rescan_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(16)
}

fn default_body_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_observer_throttle() -> Duration {
    Duration::from_millis(300)
}

fn default_batch_debounce() -> Duration {
    Duration::from_millis(500)
}

fn default_prune_interval() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_min_post_text")]
    pub min_post_text: usize,
    #[serde(default = "default_min_fallback_text")]
    pub min_fallback_text: usize,
    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_processed_capacity")]
    pub processed_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_post_text: default_min_post_text(),
            min_fallback_text: default_min_fallback_text(),
            content_max_chars: default_content_max_chars(),
            max_images: default_max_images(),
            max_batch_size: default_max_batch_size(),
            processed_capacity: default_processed_capacity(),
        }
    }
}

fn default_min_post_text() -> usize {
    50
}

fn default_min_fallback_text() -> usize {
    200
}

fn default_content_max_chars() -> usize {
    500
}

fn default_max_images() -> usize {
    5
}

fn default_max_batch_size() -> usize {
    50
}

fn default_processed_capacity() -> usize {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.facebook.com/".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    base.timing = other.timing;

    let limits = other.limits;
    if limits.min_post_text != 0 {
        base.limits.min_post_text = limits.min_post_text;
    }
    if limits.min_fallback_text != 0 {
        base.limits.min_fallback_text = limits.min_fallback_text;
    }
    if limits.content_max_chars != 0 {
        base.limits.content_max_chars = limits.content_max_chars;
    }
    if limits.max_images != 0 {
        base.limits.max_images = limits.max_images;
    }
    if limits.max_batch_size != 0 {
        base.limits.max_batch_size = limits.max_batch_size;
    }
    if limits.processed_capacity != 0 {
        base.limits.processed_capacity = limits.processed_capacity;
    }

    if !other.page.base_url.is_empty() {
        base.page.base_url = other.page.base_url;
    }
    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }
    if !other.log.level.is_empty() {
        base.log.level = other.log.level;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    let duration = |value: &str| humantime::parse_duration(value).ok();
    let number = |value: &str| value.parse::<usize>().ok().filter(|n| *n != 0);

    match key {
        "timing.initial_delay" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.initial_delay = parsed;
            }
        }
        "timing.rescan_interval" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.rescan_interval = parsed;
            }
        }
        "timing.frame_interval" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.frame_interval = parsed;
            }
        }
        "timing.body_poll_interval" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.body_poll_interval = parsed;
            }
        }
        "timing.observer_throttle" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.observer_throttle = parsed;
            }
        }
        "timing.batch_debounce" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.batch_debounce = parsed;
            }
        }
        "timing.prune_interval" => {
            if let Some(parsed) = duration(&value) {
                cfg.timing.prune_interval = parsed;
            }
        }
        "limits.min_post_text" => {
            if let Some(parsed) = number(&value) {
                cfg.limits.min_post_text = parsed;
            }
        }
        "limits.min_fallback_text" => {
            if let Some(parsed) = number(&value) {
                cfg.limits.min_fallback_text = parsed;
            }
        }
        "limits.content_max_chars" => {
            if let Some(parsed) = number(&value) {
                cfg.limits.content_max_chars = parsed;
            }
        }
        "limits.max_images" => {
            if let Some(parsed) = number(&value) {
                cfg.limits.max_images = parsed;
            }
        }
        "limits.max_batch_size" => {
            if let Some(parsed) = number(&value) {
                cfg.limits.max_batch_size = parsed;
            }
        }
        "limits.processed_capacity" => {
            if let Some(parsed) = number(&value) {
                cfg.limits.processed_capacity = parsed;
            }
        }
        "page.base_url" => cfg.page.base_url = value,
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feed-clarity").join("config.yaml"))
}
