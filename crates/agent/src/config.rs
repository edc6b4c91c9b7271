//! Agent configuration

use agent_lib::sync::DEFAULT_METRIC_API_URL;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_SERVICE: &str = "My Application";
const DEFAULT_WORKLOAD: &str = "My Workload";
const DEFAULT_PREFIX: &str = "container";
const DEFAULT_LOG_FILE: &str = "./infra-lite.log";
const DEFAULT_POLL_INTERVAL: &str = "30s";
const DEFAULT_REQUEST_TIMEOUT: &str = "30s";

/// Environment variables as read, before defaults and validation
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    new_relic_license_key: Option<String>,
    new_relic_app_name: Option<String>,
    workload_name: Option<String>,
    metric_prefix: Option<String>,
    nria_log_file: Option<String>,
    nria_verbose: Option<String>,
    poll_interval: Option<String>,
    request_timeout: Option<String>,
    metric_api_url: Option<String>,
    infra_lite_api_port: Option<String>,
}

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    File(PathBuf),
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub license_key: String,
    /// Reported as the `service` attribute
    pub service: String,
    pub workload: String,
    pub metric_prefix: String,
    pub log_target: LogTarget,
    pub verbose: bool,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub endpoint: Url,
    /// Health/metrics port; the API server is off when unset
    pub api_port: Option<u16>,
}

impl AgentConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let raw: RawConfig = config::Config::builder()
            .add_source(environment)
            .build()
            .context("Failed to read environment")?
            .try_deserialize()
            .context("Failed to parse environment")?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let license_key = non_empty(raw.new_relic_license_key)
            .context("NEW_RELIC_LICENSE_KEY must be set")?;

        let poll_interval = parse_duration(
            &non_empty(raw.poll_interval).unwrap_or_else(|| DEFAULT_POLL_INTERVAL.to_string()),
        )
        .context("Invalid POLL_INTERVAL")?;
        if poll_interval.is_zero() {
            bail!("POLL_INTERVAL must be positive");
        }

        let request_timeout = parse_duration(
            &non_empty(raw.request_timeout).unwrap_or_else(|| DEFAULT_REQUEST_TIMEOUT.to_string()),
        )
        .context("Invalid REQUEST_TIMEOUT")?;
        if request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT must be positive");
        }

        let endpoint = non_empty(raw.metric_api_url)
            .unwrap_or_else(|| DEFAULT_METRIC_API_URL.to_string());
        let endpoint = Url::parse(&endpoint).context("Invalid METRIC_API_URL")?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("METRIC_API_URL must be an http(s) URL, got {}", endpoint);
        }

        let api_port = non_empty(raw.infra_lite_api_port)
            .map(|port| {
                port.trim()
                    .parse::<u16>()
                    .with_context(|| format!("Invalid INFRA_LITE_API_PORT {:?}", port))
            })
            .transpose()?;

        let log_target = match non_empty(raw.nria_log_file) {
            Some(target) if target.eq_ignore_ascii_case("stdout") => LogTarget::Stdout,
            Some(path) => LogTarget::File(PathBuf::from(path)),
            None => LogTarget::File(PathBuf::from(DEFAULT_LOG_FILE)),
        };

        let verbose = non_empty(raw.nria_verbose).is_some_and(|v| v.trim() != "0");

        Ok(Self {
            license_key,
            service: non_empty(raw.new_relic_app_name)
                .unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            workload: non_empty(raw.workload_name).unwrap_or_else(|| DEFAULT_WORKLOAD.to_string()),
            metric_prefix: non_empty(raw.metric_prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            log_target,
            verbose,
            poll_interval,
            request_timeout,
            endpoint,
            api_port,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a duration such as `30s`, `1m30s`, `1.5h` or `250ms`
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is allowed;
/// negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        bail!("empty duration");
    }
    if s.starts_with('-') {
        bail!("negative duration {:?}", input);
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => bail!("missing unit in duration {:?}", input),
            other => bail!("unknown unit {:?} in duration {:?}", other, input),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            bail!("invalid duration {:?}", input);
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .with_context(|| format!("invalid duration {:?}", input))?
        };
        let mut value = whole
            .checked_mul(scale)
            .with_context(|| format!("duration {:?} overflows", input))?;

        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(18)];
            let numerator: u128 = digits
                .parse()
                .with_context(|| format!("invalid duration {:?}", input))?;
            value += numerator * scale / 10u128.pow(digits.len() as u32);
        }

        nanos = nanos
            .checked_add(value)
            .with_context(|| format!("duration {:?} overflows", input))?;
        rest = tail;
    }

    let nanos = u64::try_from(nanos).with_context(|| format!("duration {:?} overflows", input))?;
    Ok(Duration::from_nanos(nanos))
}
