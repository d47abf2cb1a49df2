use crate::error::{BookerError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Public plain-text proxy feeds used when `POOL_FEED_URLS` is not set
pub const DEFAULT_FEED_URLS: &[&str] = &[
    "https://api.proxyscrape.com/v2/?request=get&format=textplain&protocol=http&timeout=5000&country=all&ssl=all&anonymity=all",
    "https://www.proxy-list.download/api/v1/get?type=http",
];

/// Stable echo endpoints used to prove an endpoint can carry a request
pub const DEFAULT_ECHO_URLS: &[&str] = &[
    "http://httpbin.org/ip",
    "http://icanhazip.com",
    "http://ident.me",
    "http://api.ipify.org?format=json",
    "http://checkip.amazonaws.com",
];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Proxy pool configuration
    pub pool: PoolConfig,
    /// Attempt loop configuration
    pub run: RunConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Where the verified set is persisted (None disables persistence)
    pub cache_path: Option<PathBuf>,
    /// Feeds polled for raw candidate endpoints
    pub feed_urls: Vec<String>,
    /// Echo endpoints tried in turn by the liveness probe
    pub echo_urls: Vec<Url>,
    /// Upper bound for probing one candidate
    pub probe_timeout: Duration,
    /// Timeout for one feed download
    pub feed_timeout: Duration,
    /// Maximum candidates validated per refill
    pub batch_cap: usize,
    /// Concurrent probes during validation
    pub validation_workers: usize,
    /// Verified count below which a refill fetches feeds
    pub min_verified: usize,
    /// Consecutive soft failures before an endpoint is banned
    pub max_soft_failures: u32,
    /// Endpoints inserted when the cache starts out empty
    pub seed_endpoints: Vec<String>,
    /// Period of the background maintenance refill
    pub maintenance_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cache_path: Some(PathBuf::from("data/working_proxies.json")),
            feed_urls: DEFAULT_FEED_URLS.iter().map(|s| s.to_string()).collect(),
            echo_urls: DEFAULT_ECHO_URLS
                .iter()
                .filter_map(|s| Url::parse(s).ok())
                .collect(),
            probe_timeout: Duration::from_secs(8),
            feed_timeout: Duration::from_secs(15),
            batch_cap: 50,
            validation_workers: 20,
            min_verified: 5,
            max_soft_failures: 3,
            seed_endpoints: Vec::new(),
            maintenance_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Page the booking workflow starts from
    pub booking_url: String,
    /// Attempt budget for one run
    pub max_retries: u32,
    /// Timeout for opening a session
    pub session_timeout: Duration,
    /// Timeout for the booking page to become ready
    pub page_timeout: Duration,
    /// Timeout for the appointment-phase response capture
    pub response_timeout: Duration,
    /// Timeout for the post-submit page transition
    pub transition_timeout: Duration,
    /// Pause after an attempt found no endpoint
    pub no_proxy_backoff: Duration,
    /// Lower bound of the randomized pause after a mismatch
    pub mismatch_delay_min: Duration,
    /// Upper bound of the randomized pause after a mismatch
    pub mismatch_delay_max: Duration,
    /// End the run when booking fails after a match instead of drawing a new assignment
    pub abort_on_booking_failure: bool,
    /// Facility the run is looking for
    pub target: Option<String>,
    /// Candidate record file
    pub candidates_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            booking_url: "https://wafid.com/book-appointment".to_string(),
            max_retries: 100,
            session_timeout: Duration::from_secs(30),
            page_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(30),
            transition_timeout: Duration::from_secs(5),
            no_proxy_backoff: Duration::from_secs(5),
            mismatch_delay_min: Duration::from_millis(1000),
            mismatch_delay_max: Duration::from_millis(3000),
            abort_on_booking_failure: false,
            target: None,
            candidates_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let pool_defaults = PoolConfig::default();
        let run_defaults = RunConfig::default();

        let cache_path = get_env_or("POOL_CACHE_PATH", "data/working_proxies.json");
        let cache_path = if cache_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(cache_path.trim()))
        };

        let feed_urls = match split_list("POOL_FEED_URLS") {
            Some(list) => list,
            None => pool_defaults.feed_urls.clone(),
        };

        let echo_urls = match split_list("POOL_ECHO_URLS") {
            Some(list) => parse_echo_urls(&list)?,
            None => pool_defaults.echo_urls.clone(),
        };
        if echo_urls.is_empty() {
            return Err(BookerError::InvalidConfig(
                "POOL_ECHO_URLS must name at least one endpoint".into(),
            ));
        }

        let mismatch_delay_min = Duration::from_millis(parse_env("RUN_MISMATCH_DELAY_MIN_MS", 1000)?);
        let mismatch_delay_max = Duration::from_millis(parse_env("RUN_MISMATCH_DELAY_MAX_MS", 3000)?);
        if mismatch_delay_min > mismatch_delay_max {
            return Err(BookerError::InvalidConfig(
                "RUN_MISMATCH_DELAY_MIN_MS must not exceed RUN_MISMATCH_DELAY_MAX_MS".into(),
            ));
        }

        Ok(Config {
            pool: PoolConfig {
                cache_path,
                feed_urls,
                echo_urls,
                probe_timeout: Duration::from_secs(parse_env("POOL_PROBE_TIMEOUT_SECS", 8)?),
                feed_timeout: Duration::from_secs(parse_env("POOL_FEED_TIMEOUT_SECS", 15)?),
                batch_cap: parse_env("POOL_BATCH_CAP", pool_defaults.batch_cap)?,
                validation_workers: parse_env(
                    "POOL_VALIDATION_WORKERS",
                    pool_defaults.validation_workers,
                )?
                .max(1),
                min_verified: parse_env("POOL_MIN_VERIFIED", pool_defaults.min_verified)?,
                max_soft_failures: parse_env(
                    "POOL_MAX_SOFT_FAILURES",
                    pool_defaults.max_soft_failures,
                )?
                .max(1),
                seed_endpoints: split_list("POOL_SEED_ENDPOINTS").unwrap_or_default(),
                maintenance_interval: Duration::from_secs(
                    parse_env::<u64>("POOL_MAINTENANCE_INTERVAL_SECS", 300)?.max(1),
                ),
            },
            run: RunConfig {
                booking_url: get_env_or("BOOKING_URL", &run_defaults.booking_url),
                max_retries: parse_env("RUN_MAX_RETRIES", run_defaults.max_retries)?,
                session_timeout: Duration::from_secs(parse_env("RUN_SESSION_TIMEOUT_SECS", 30)?),
                page_timeout: Duration::from_secs(parse_env("RUN_PAGE_TIMEOUT_SECS", 30)?),
                response_timeout: Duration::from_secs(parse_env("RUN_RESPONSE_TIMEOUT_SECS", 30)?),
                transition_timeout: Duration::from_secs(parse_env(
                    "RUN_TRANSITION_TIMEOUT_SECS",
                    5,
                )?),
                no_proxy_backoff: Duration::from_secs(parse_env("RUN_NO_PROXY_BACKOFF_SECS", 5)?),
                mismatch_delay_min,
                mismatch_delay_max,
                abort_on_booking_failure: parse_flag(
                    "RUN_ABORT_ON_BOOKING_FAILURE",
                    run_defaults.abort_on_booking_failure,
                )?,
                target: non_empty_env("BOOKING_TARGET"),
                candidates_path: non_empty_env("CANDIDATES_PATH").map(PathBuf::from),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }
}

fn parse_echo_urls(raw: &[String]) -> Result<Vec<Url>> {
    raw.iter()
        .map(|s| {
            let url = Url::parse(s).map_err(|e| {
                BookerError::InvalidConfig(format!("POOL_ECHO_URLS entry {} is invalid: {}", s, e))
            })?;
            if url.scheme() != "http" {
                return Err(BookerError::InvalidConfig(format!(
                    "POOL_ECHO_URLS entry {} must use http://",
                    s
                )));
            }
            if url.host_str().is_none() {
                return Err(BookerError::InvalidConfig(format!(
                    "POOL_ECHO_URLS entry {} must include a host",
                    s
                )));
            }
            Ok(url)
        })
        .collect()
}

/// Parse a numeric environment variable, falling back to `default` when unset
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| BookerError::InvalidConfig(format!("{} must be a valid number", key))),
        _ => Ok(default),
    }
}

/// Parse a boolean environment variable, falling back to `default` when unset
fn parse_flag(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(BookerError::InvalidConfig(format!(
                "{} must be true or false",
                key
            ))),
        },
        _ => Ok(default),
    }
}

/// Comma-separated list; None when the variable is unset or blank
fn split_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "POOL_CACHE_PATH",
        "POOL_FEED_URLS",
        "POOL_ECHO_URLS",
        "POOL_PROBE_TIMEOUT_SECS",
        "POOL_FEED_TIMEOUT_SECS",
        "POOL_BATCH_CAP",
        "POOL_VALIDATION_WORKERS",
        "POOL_MIN_VERIFIED",
        "POOL_MAX_SOFT_FAILURES",
        "POOL_SEED_ENDPOINTS",
        "POOL_MAINTENANCE_INTERVAL_SECS",
        "BOOKING_URL",
        "RUN_MAX_RETRIES",
        "RUN_SESSION_TIMEOUT_SECS",
        "RUN_PAGE_TIMEOUT_SECS",
        "RUN_RESPONSE_TIMEOUT_SECS",
        "RUN_TRANSITION_TIMEOUT_SECS",
        "RUN_NO_PROXY_BACKOFF_SECS",
        "RUN_MISMATCH_DELAY_MIN_MS",
        "RUN_MISMATCH_DELAY_MAX_MS",
        "RUN_ABORT_ON_BOOKING_FAILURE",
        "BOOKING_TARGET",
        "CANDIDATES_PATH",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(
            config.pool.cache_path,
            Some(PathBuf::from("data/working_proxies.json"))
        );
        assert_eq!(config.pool.feed_urls.len(), DEFAULT_FEED_URLS.len());
        assert_eq!(config.pool.echo_urls.len(), DEFAULT_ECHO_URLS.len());
        assert_eq!(config.pool.probe_timeout, Duration::from_secs(8));
        assert_eq!(config.pool.batch_cap, 50);
        assert_eq!(config.pool.validation_workers, 20);
        assert_eq!(config.pool.min_verified, 5);
        assert!(config.pool.seed_endpoints.is_empty());

        assert_eq!(config.run.booking_url, "https://wafid.com/book-appointment");
        assert_eq!(config.run.max_retries, 100);
        assert_eq!(config.run.response_timeout, Duration::from_secs(30));
        assert_eq!(config.run.mismatch_delay_min, Duration::from_secs(1));
        assert_eq!(config.run.mismatch_delay_max, Duration::from_secs(3));
        assert!(!config.run.abort_on_booking_failure);
        assert!(config.run.target.is_none());

        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_CACHE_PATH", "/tmp/pool.json");
        env::set_var("POOL_FEED_URLS", "https://a.example/list, https://b.example/list");
        env::set_var("POOL_ECHO_URLS", "http://echo.example/ip");
        env::set_var("POOL_BATCH_CAP", "10");
        env::set_var("POOL_SEED_ENDPOINTS", "1.2.3.4:80,5.6.7.8:3128");
        env::set_var("RUN_MAX_RETRIES", "7");
        env::set_var("RUN_ABORT_ON_BOOKING_FAILURE", "true");
        env::set_var("BOOKING_TARGET", "  Green Crescent  ");
        env::set_var("LOG_FORMAT", "pretty");
        env::set_var("CANDIDATES_PATH", "data/candidate.json");

        let config = Config::from_env().unwrap();

        assert_eq!(config.pool.cache_path, Some(PathBuf::from("/tmp/pool.json")));
        assert_eq!(
            config.pool.feed_urls,
            vec![
                "https://a.example/list".to_string(),
                "https://b.example/list".to_string()
            ]
        );
        assert_eq!(config.pool.echo_urls.len(), 1);
        assert_eq!(config.pool.echo_urls[0].host_str(), Some("echo.example"));
        assert_eq!(config.pool.batch_cap, 10);
        assert_eq!(
            config.pool.seed_endpoints,
            vec!["1.2.3.4:80".to_string(), "5.6.7.8:3128".to_string()]
        );
        assert_eq!(config.run.max_retries, 7);
        assert!(config.run.abort_on_booking_failure);
        assert_eq!(config.run.target.as_deref(), Some("Green Crescent"));
        assert_eq!(
            config.run.candidates_path,
            Some(PathBuf::from("data/candidate.json"))
        );
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_config_blank_cache_path_disables_persistence() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_CACHE_PATH", " ");
        let config = Config::from_env().unwrap();
        assert!(config.pool.cache_path.is_none());
    }

    #[test]
    fn test_config_from_env_invalid_number() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RUN_MAX_RETRIES", "lots");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BookerError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_invalid_abort_flag() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RUN_ABORT_ON_BOOKING_FAILURE", "maybe");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BookerError::InvalidConfig(_)));

        env::set_var("RUN_ABORT_ON_BOOKING_FAILURE", "YES");
        assert!(Config::from_env().unwrap().run.abort_on_booking_failure);
    }

    #[test]
    fn test_config_rejects_https_echo_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_ECHO_URLS", "https://api.ipify.org");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BookerError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_inverted_mismatch_window() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("RUN_MISMATCH_DELAY_MIN_MS", "5000");
        env::set_var("RUN_MISMATCH_DELAY_MAX_MS", "1000");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BookerError::InvalidConfig(_)));
    }
}
