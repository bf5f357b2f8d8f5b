use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::learning::clamp_difficulty;

const DEFAULT_INITIAL_DIFFICULTY: u8 = 5;
const DEFAULT_SESSION_IDLE_MINUTES: u64 = 30;
const DEFAULT_COMPLETION_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_RECORDER_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_RECORDER_MAX_RETRIES: u32 = 3;
const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Daily-rolling log file directory; `None` logs to stdout only.
    pub log_dir: Option<PathBuf>,
    pub baas_url: Option<String>,
    pub baas_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub initial_difficulty: u8,
    pub session_idle_timeout: Duration,
    pub completion_cache_ttl: Duration,
    pub recorder_queue_capacity: usize,
    pub recorder_max_retries: u32,
    pub workers_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            log_level: "info".to_string(),
            log_dir: None,
            baas_url: None,
            baas_api_key: None,
            jwt_secret: None,
            initial_difficulty: DEFAULT_INITIAL_DIFFICULTY,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_MINUTES * 60),
            completion_cache_ttl: Duration::from_secs(DEFAULT_COMPLETION_CACHE_TTL_SECS),
            recorder_queue_capacity: DEFAULT_RECORDER_QUEUE_CAPACITY,
            recorder_max_retries: DEFAULT_RECORDER_MAX_RETRIES,
            workers_enabled: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse::<u16>("PORT").unwrap_or(defaults.port);
        let host = env_parse::<IpAddr>("HOST").unwrap_or(defaults.host);
        let log_level = std::env::var("RUST_LOG").unwrap_or(defaults.log_level);
        let log_dir = env_bool("ENABLE_FILE_LOGS")
            .unwrap_or(false)
            .then(|| PathBuf::from(env_string("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())));

        let initial_difficulty = env_parse::<i64>("TUTOR_INITIAL_DIFFICULTY")
            .map(clamp_difficulty)
            .unwrap_or(defaults.initial_difficulty);

        let session_idle_timeout = env_parse::<u64>("TUTOR_SESSION_IDLE_MINUTES")
            .map(|minutes| Duration::from_secs(minutes.max(1) * 60))
            .unwrap_or(defaults.session_idle_timeout);

        let completion_cache_ttl = env_parse::<u64>("COMPLETION_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.completion_cache_ttl);

        Self {
            host,
            port,
            log_level,
            log_dir,
            baas_url: env_string("BAAS_URL"),
            baas_api_key: env_string("BAAS_API_KEY"),
            jwt_secret: env_string("JWT_SECRET"),
            initial_difficulty,
            session_idle_timeout,
            completion_cache_ttl,
            recorder_queue_capacity: env_parse::<usize>("RECORDER_QUEUE_CAPACITY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.recorder_queue_capacity),
            recorder_max_retries: env_parse::<u32>("RECORDER_MAX_RETRIES")
                .unwrap_or(defaults.recorder_max_retries),
            workers_enabled: env_bool("WORKERS_ENABLED").unwrap_or(defaults.workers_enabled),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.trim().parse().ok()
}

pub fn env_bool(key: &str) -> Option<bool> {
    parse_bool(&std::env::var(key).ok()?)
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr().port(), 3000);
        assert_eq!(config.initial_difficulty, 5);
        assert!(config.baas_url.is_none());
        assert!(config.log_dir.is_none());
    }
}
