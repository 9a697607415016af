use clap::Parser;
use crawlctl_core::client::DEFAULT_API_BASE;
use crawlctl_core::run::clamp_depth;
use crawlctl_core::{parse_base_url, stream_endpoint, ConfigError};
use std::{env, path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "crawlctl", about = "Operator console for the crawl service")]
pub struct Args {
    /// Backend base address (http or https).
    #[arg(long, default_value = "")]
    pub api_url: String,
    /// Target URL to prefill.
    #[arg(long, default_value = "")]
    pub url: String,
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub max_depth: i64,
    #[arg(long)]
    pub status_interval_ms: Option<u64>,
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value = "")]
    pub download_dir: String,
    #[arg(long, default_value = "")]
    pub log_dir: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base: Url,
    pub stream_url: Url,
    pub target_url: String,
    pub max_depth: u8,
    pub status_interval: Duration,
    pub request_timeout: Duration,
    pub download_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
}

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn load_config(args: Args) -> Result<Config, ConfigError> {
    resolve_config(args, &|key: &str| env::var(key).ok())
}

fn resolve_config(args: Args, lookup: EnvLookup) -> Result<Config, ConfigError> {
    let api_base = parse_base_url(&resolve_api_url(&args.api_url, lookup))?;
    let stream_url = stream_endpoint(&api_base);
    let status_interval_ms = resolve_status_interval_ms(args.status_interval_ms, lookup)?;
    if args.request_timeout_secs == 0 {
        return Err(ConfigError::NonPositive {
            name: "request timeout",
            value: 0,
        });
    }
    Ok(Config {
        api_base,
        stream_url,
        target_url: resolve_target_url(&args.url, lookup),
        max_depth: clamp_depth(args.max_depth),
        status_interval: Duration::from_millis(status_interval_ms),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        download_dir: resolve_download_dir(&args.download_dir, lookup),
        log_dir: resolve_log_dir(&args.log_dir, lookup),
        log_level: resolve_log_level(lookup),
    })
}

fn env_value(lookup: EnvLookup, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn resolve_api_url(flag: &str, lookup: EnvLookup) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Some(value) = env_value(lookup, "CRAWLCTL_API_URL") {
        return value;
    }
    DEFAULT_API_BASE.to_string()
}

fn resolve_target_url(flag: &str, lookup: EnvLookup) -> String {
    if !flag.trim().is_empty() {
        return flag.trim().to_string();
    }
    env_value(lookup, "CRAWLCTL_TARGET_URL")
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn resolve_status_interval_ms(flag: Option<u64>, lookup: EnvLookup) -> Result<u64, ConfigError> {
    let value = match flag {
        Some(value) => value,
        None => env_value(lookup, "CRAWLCTL_STATUS_INTERVAL_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_STATUS_INTERVAL_MS),
    };
    if value == 0 {
        return Err(ConfigError::NonPositive {
            name: "status interval",
            value,
        });
    }
    Ok(value)
}

fn resolve_download_dir(flag: &str, lookup: EnvLookup) -> PathBuf {
    if !flag.trim().is_empty() {
        return PathBuf::from(flag);
    }
    if let Some(value) = env_value(lookup, "CRAWLCTL_DOWNLOAD_DIR") {
        return PathBuf::from(value);
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn resolve_log_dir(flag: &str, lookup: EnvLookup) -> PathBuf {
    if !flag.trim().is_empty() {
        return PathBuf::from(flag);
    }
    if let Some(value) = env_value(lookup, "CRAWLCTL_LOG_DIR") {
        return PathBuf::from(value);
    }
    if let Some(value) = env_value(lookup, "XDG_STATE_HOME") {
        return PathBuf::from(value).join("crawlctl");
    }
    if let Some(value) = env_value(lookup, "HOME") {
        return PathBuf::from(value)
            .join(".local")
            .join("state")
            .join("crawlctl");
    }
    PathBuf::from(".crawlctl/logs")
}

fn resolve_log_level(lookup: EnvLookup) -> String {
    env_value(lookup, "CRAWLCTL_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}
