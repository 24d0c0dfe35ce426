//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use common::AccountId;
use saga::{DEFAULT_TASK_QUEUE, RetryPolicy, SagaConfig};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Server, worker and saga configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `WORKFLOW_TASK_QUEUE` — task queue name (default: `TRANSFER_MONEY_TASK_QUEUE`)
/// - `WORKFLOW_RETRY_INITIAL_INTERVAL_MS` (default: `1000`)
/// - `WORKFLOW_RETRY_BACKOFF_COEFF` (default: `2.0`)
/// - `WORKFLOW_RETRY_MAX_INTERVAL_MS` (default: `100000`)
/// - `WORKFLOW_RETRY_MAX_ATTEMPTS` — 0 means unbounded (default: `500`)
/// - `WORKFLOW_ACTIVITY_TIMEOUT_MS` — per-attempt timeout (default: `60000`)
/// - `WORKER_QUEUE_CAPACITY` (default: `1024`)
/// - `DATABASE_URL` — Postgres history store; in-memory when unset
/// - `LEDGER_SEED_ACCOUNTS` — `account=balance` pairs (default: `85-150=2000,43-812=0`)
///
/// Values that fail to parse fall back to their default. Configuration is
/// read before the tracing subscriber exists, so the offending keys are kept
/// in `invalid_keys` for the caller to report.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub saga: SagaConfig,
    pub worker_queue_capacity: usize,
    pub database_url: Option<String>,
    pub ledger_seed: Vec<(AccountId, i64)>,
    /// Keys whose values could not be parsed.
    pub invalid_keys: Vec<String>,
}

const DEFAULT_LEDGER_SEED: &str = "85-150=2000,43-812=0";

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut invalid = Vec::new();
        let retry_defaults = &defaults.saga.retry_policy;

        let retry_policy = RetryPolicy {
            initial_interval: Duration::from_millis(parse_or(
                &lookup,
                &mut invalid,
                "WORKFLOW_RETRY_INITIAL_INTERVAL_MS",
                retry_defaults.initial_interval.as_millis() as u64,
            )),
            backoff_coefficient: parse_or(
                &lookup,
                &mut invalid,
                "WORKFLOW_RETRY_BACKOFF_COEFF",
                retry_defaults.backoff_coefficient,
            ),
            maximum_interval: Duration::from_millis(parse_or(
                &lookup,
                &mut invalid,
                "WORKFLOW_RETRY_MAX_INTERVAL_MS",
                retry_defaults.maximum_interval.as_millis() as u64,
            )),
            maximum_attempts: parse_or(
                &lookup,
                &mut invalid,
                "WORKFLOW_RETRY_MAX_ATTEMPTS",
                retry_defaults.maximum_attempts,
            ),
            non_retryable: retry_defaults.non_retryable.clone(),
        };

        let saga = SagaConfig {
            task_queue: lookup("WORKFLOW_TASK_QUEUE")
                .filter(|q| !q.trim().is_empty())
                .unwrap_or(defaults.saga.task_queue),
            retry_policy,
            step_timeout: Duration::from_millis(parse_or(
                &lookup,
                &mut invalid,
                "WORKFLOW_ACTIVITY_TIMEOUT_MS",
                defaults.saga.step_timeout.as_millis() as u64,
            )),
        };

        let ledger_seed = match lookup("LEDGER_SEED_ACCOUNTS") {
            Some(raw) => parse_ledger_seed(&raw),
            None => defaults.ledger_seed,
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, &mut invalid, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or(&lookup, &mut invalid, "LOG_FORMAT", defaults.log_format),
            saga,
            worker_queue_capacity: parse_or(
                &lookup,
                &mut invalid,
                "WORKER_QUEUE_CAPACITY",
                defaults.worker_queue_capacity,
            ),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            ledger_seed,
            invalid_keys: invalid,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            saga: SagaConfig::default().with_task_queue(DEFAULT_TASK_QUEUE),
            worker_queue_capacity: 1024,
            database_url: None,
            ledger_seed: parse_ledger_seed(DEFAULT_LEDGER_SEED),
            invalid_keys: Vec::new(),
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    invalid: &mut Vec<String>,
    key: &str,
    default: T,
) -> T
where
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            invalid.push(key.to_string());
            default
        }),
    }
}

/// Parses `account=balance` pairs separated by commas. Malformed entries are
/// skipped with a warning.
pub fn parse_ledger_seed(raw: &str) -> Vec<(AccountId, i64)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = entry
                .split_once('=')
                .and_then(|(account, balance)| {
                    let account = account.trim();
                    let balance = balance.trim().parse::<i64>().ok()?;
                    (!account.is_empty()).then(|| (AccountId::new(account), balance))
                });
            if parsed.is_none() {
                tracing::warn!(entry, "ignoring malformed ledger seed entry");
            }
            parsed
        })
        .collect()
}
