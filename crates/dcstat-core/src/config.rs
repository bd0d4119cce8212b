//! dcstat.toml configuration parser.
//!
//! The file form keeps every field optional so that CLI flags and
//! environment variables can fill the gaps. [`DcstatConfig::resolve`]
//! applies defaults and validation and yields typed [`Settings`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DcOption, EndpointAddress, Identity};

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_DOWN_AFTER: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_METRICS_ADDR: &str = "127.0.0.1:8081";
/// Upper bound for `backoff.max`.
pub const MAX_BACKOFF: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DcstatConfig {
    pub app: Option<AppConfig>,
    pub probe: Option<ProbeConfig>,
    pub backoff: Option<BackoffConfig>,
    pub http: Option<HttpConfig>,
    pub transport: Option<TransportConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub id: Option<i32>,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub bootstrap_timeout: Option<String>,
    pub session_ttl: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial: Option<String>,
    pub max: Option<String>,
    pub multiplier: Option<f64>,
    pub jitter: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub addr: Option<String>,
    pub metrics_addr: Option<String>,
    pub down_after: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    pub bootstrap_address: Option<String>,
    pub catalog: Option<Vec<DcOption>>,
}

/// Reconnect backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSettings {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Relative jitter in `[0, 1)`; 0.5 spreads a delay over ±50 %.
    pub jitter: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 1.5,
            jitter: 0.5,
        }
    }
}

/// Resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub identity: Identity,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub bootstrap_timeout: Duration,
    pub session_ttl: Duration,
    pub backoff: BackoffSettings,
    pub http_addr: String,
    pub metrics_addr: String,
    pub down_after: Duration,
    pub bootstrap_address: Option<EndpointAddress>,
    pub catalog: Vec<DcOption>,
}

impl DcstatConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn set_app_id(&mut self, id: i32) {
        self.app.get_or_insert_with(AppConfig::default).id = Some(id);
    }

    pub fn set_app_hash(&mut self, hash: impl Into<String>) {
        self.app.get_or_insert_with(AppConfig::default).hash = Some(hash.into());
    }

    pub fn set_http_addr(&mut self, addr: impl Into<String>) {
        self.http.get_or_insert_with(HttpConfig::default).addr = Some(addr.into());
    }

    pub fn set_metrics_addr(&mut self, addr: impl Into<String>) {
        self.http.get_or_insert_with(HttpConfig::default).metrics_addr = Some(addr.into());
    }

    /// Apply defaults and validate.
    pub fn resolve(&self) -> ConfigResult<Settings> {
        let app = self.app.clone().unwrap_or_default();
        let app_id = app.id.ok_or(ConfigError::MissingCredentials("APP_ID not set"))?;
        let app_hash = app
            .hash
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::MissingCredentials("no APP_HASH provided"))?;

        let probe = self.probe.clone().unwrap_or_default();
        let probe_interval = duration_field("probe.interval", &probe.interval, DEFAULT_PROBE_INTERVAL)?;
        let probe_timeout = duration_field("probe.timeout", &probe.timeout, DEFAULT_PROBE_TIMEOUT)?;
        let bootstrap_timeout = duration_field(
            "probe.bootstrap_timeout",
            &probe.bootstrap_timeout,
            DEFAULT_BOOTSTRAP_TIMEOUT,
        )?;
        let session_ttl = duration_field("probe.session_ttl", &probe.session_ttl, DEFAULT_SESSION_TTL)?;
        non_zero("probe.interval", probe_interval)?;
        non_zero("probe.timeout", probe_timeout)?;
        non_zero("probe.bootstrap_timeout", bootstrap_timeout)?;

        let backoff = self.backoff.clone().unwrap_or_default();
        let defaults = BackoffSettings::default();
        let backoff = BackoffSettings {
            initial: duration_field("backoff.initial", &backoff.initial, defaults.initial)?,
            max: duration_field("backoff.max", &backoff.max, defaults.max)?,
            multiplier: backoff.multiplier.unwrap_or(defaults.multiplier),
            jitter: backoff.jitter.unwrap_or(defaults.jitter),
        };
        non_zero("backoff.initial", backoff.initial)?;
        if backoff.max > MAX_BACKOFF {
            return Err(ConfigError::InvalidValue {
                field: "backoff.max",
                reason: format!("must not exceed {}s", MAX_BACKOFF.as_secs()),
            });
        }
        if backoff.initial > backoff.max {
            return Err(ConfigError::InvalidValue {
                field: "backoff.max",
                reason: "must not be smaller than backoff.initial".to_string(),
            });
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff.multiplier",
                reason: format!("{} is not a finite value of at least 1.0", backoff.multiplier),
            });
        }
        if !(0.0..1.0).contains(&backoff.jitter) {
            return Err(ConfigError::InvalidValue {
                field: "backoff.jitter",
                reason: format!("{} is outside [0, 1)", backoff.jitter),
            });
        }

        let http = self.http.clone().unwrap_or_default();
        let down_after = duration_field("http.down_after", &http.down_after, DEFAULT_DOWN_AFTER)?;

        let transport = self.transport.clone().unwrap_or_default();
        let bootstrap_address = match transport.bootstrap_address {
            Some(raw) => Some(EndpointAddress::parse(&raw).ok_or(ConfigError::InvalidAddress(raw))?),
            None => None,
        };

        Ok(Settings {
            identity: Identity::new(app_id, app_hash),
            probe_interval,
            probe_timeout,
            bootstrap_timeout,
            session_ttl,
            backoff,
            http_addr: http.addr.unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            metrics_addr: http
                .metrics_addr
                .unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string()),
            down_after,
            bootstrap_address,
            catalog: transport.catalog.unwrap_or_default(),
        })
    }
}

fn duration_field(
    field: &'static str,
    raw: &Option<String>,
    default: Duration,
) -> ConfigResult<Duration> {
    match raw {
        None => Ok(default),
        Some(value) => parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
            field,
            value: value.clone(),
        }),
    }
}

fn non_zero(field: &'static str, value: Duration) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
