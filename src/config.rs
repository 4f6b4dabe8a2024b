//! Configuration loaded from environment variables.
//!
//! Configuration is loaded once at startup and validated before any component
//! is built.
//!
//! ## Logging
//!
//! - `RUST_LOG` - Log filter (default: `info`)
//! - `LOG_FORMAT` - Log format: `text` or `json` (default: `text`)
//!
//! ## Click accounting
//!
//! - `CLICK_QUEUE_CAPACITY` - Pending click buffer size (default: 10000)
//! - `CLICK_WORKER_CONCURRENCY` - Worker tasks writing clicks (default: 4)
//! - `CLICK_RETRY_ATTEMPTS` - Retries per failed click write (default: 3)
//! - `CLICK_RETRY_BASE_DELAY_MS` - Backoff base delay (default: 50)
//! - `CLICK_RETRY_MAX_DELAY_MS` - Backoff ceiling (default: 2000)
//! - `SHUTDOWN_TIMEOUT_SECONDS` - Time allowed to drain clicks on stop (default: 10)
//!
//! ## Short codes
//!
//! - `CODE_LENGTH` - Characters per code (default: 8)
//! - `CODE_ALPHABET` - Characters codes are drawn from (default: `A-Za-z0-9`)
//! - `CODE_MAX_ATTEMPTS` - Existence checks per allocation (default: 5)
//! - `LINK_CREATE_MAX_ATTEMPTS` - Inserts per link creation (default: 5)

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::link_service::DEFAULT_CREATE_ATTEMPTS;
use crate::domain::click_aggregator::AggregatorConfig;
use crate::domain::code_allocator::{AllocatorConfig, DEFAULT_MAX_ATTEMPTS};
use crate::utils::code_generator::{
    CodeAlphabet, DEFAULT_ALPHABET, DEFAULT_CODE_LENGTH, code_space_size, collision_probability,
};

/// Smallest accepted code space. Keeps a fresh draw's collision probability
/// under 1e-6 with a million existing links.
pub const MIN_CODE_SPACE: f64 = 1e12;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: String,

    // ── Click accounting ────────────────────────────────────────────────────
    pub click_queue_capacity: usize,
    pub click_worker_concurrency: usize,
    pub click_retry_attempts: usize,
    pub click_retry_base_delay_ms: u64,
    pub click_retry_max_delay_ms: u64,
    pub shutdown_timeout_seconds: u64,

    // ── Short codes ─────────────────────────────────────────────────────────
    pub code_length: usize,
    pub code_alphabet: String,
    /// Existence checks per allocation before giving up.
    pub code_max_attempts: u32,
    /// Inserts per link creation before giving up on uniqueness conflicts.
    pub link_create_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            click_queue_capacity: 10_000,
            click_worker_concurrency: 4,
            click_retry_attempts: 3,
            click_retry_base_delay_ms: 50,
            click_retry_max_delay_ms: 2000,
            shutdown_timeout_seconds: 10,
            code_length: DEFAULT_CODE_LENGTH,
            code_alphabet: DEFAULT_ALPHABET.to_string(),
            code_max_attempts: DEFAULT_MAX_ATTEMPTS,
            link_create_max_attempts: DEFAULT_CREATE_ATTEMPTS,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Unset or unparsable numeric variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `CODE_ALPHABET` is set but empty.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let code_alphabet = match env::var("CODE_ALPHABET") {
            Ok(alphabet) if alphabet.is_empty() => {
                anyhow::bail!("CODE_ALPHABET must not be empty when set")
            }
            Ok(alphabet) => alphabet,
            Err(_) => defaults.code_alphabet,
        };

        Ok(Self {
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
            click_queue_capacity: env_or("CLICK_QUEUE_CAPACITY", defaults.click_queue_capacity),
            click_worker_concurrency: env_or(
                "CLICK_WORKER_CONCURRENCY",
                defaults.click_worker_concurrency,
            ),
            click_retry_attempts: env_or("CLICK_RETRY_ATTEMPTS", defaults.click_retry_attempts),
            click_retry_base_delay_ms: env_or(
                "CLICK_RETRY_BASE_DELAY_MS",
                defaults.click_retry_base_delay_ms,
            ),
            click_retry_max_delay_ms: env_or(
                "CLICK_RETRY_MAX_DELAY_MS",
                defaults.click_retry_max_delay_ms,
            ),
            shutdown_timeout_seconds: env_or(
                "SHUTDOWN_TIMEOUT_SECONDS",
                defaults.shutdown_timeout_seconds,
            ),
            code_length: env_or("CODE_LENGTH", defaults.code_length),
            code_alphabet,
            code_max_attempts: env_or("CODE_MAX_ATTEMPTS", defaults.code_max_attempts),
            link_create_max_attempts: env_or(
                "LINK_CREATE_MAX_ATTEMPTS",
                defaults.link_create_max_attempts,
            ),
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `log_format` is not `text` or `json`
    /// - a click queue, worker or retry setting is out of range
    /// - the code alphabet is empty or repeats a character
    /// - the code space is smaller than [`MIN_CODE_SPACE`]
    /// - an attempt cap is out of range
    pub fn validate(&self) -> Result<()> {
        if self.log_format != "text" && self.log_format != "json" {
            anyhow::bail!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                self.log_format
            );
        }

        if self.click_queue_capacity == 0 || self.click_queue_capacity > 1_000_000 {
            anyhow::bail!(
                "CLICK_QUEUE_CAPACITY must be between 1 and 1000000, got {}",
                self.click_queue_capacity
            );
        }

        if self.click_worker_concurrency == 0 || self.click_worker_concurrency > 256 {
            anyhow::bail!(
                "CLICK_WORKER_CONCURRENCY must be between 1 and 256, got {}",
                self.click_worker_concurrency
            );
        }

        if self.click_retry_attempts > 10 {
            anyhow::bail!(
                "CLICK_RETRY_ATTEMPTS must be at most 10, got {}",
                self.click_retry_attempts
            );
        }

        if self.click_retry_max_delay_ms < self.click_retry_base_delay_ms {
            anyhow::bail!(
                "CLICK_RETRY_MAX_DELAY_MS ({}) must not be below CLICK_RETRY_BASE_DELAY_MS ({})",
                self.click_retry_max_delay_ms,
                self.click_retry_base_delay_ms
            );
        }

        if self.shutdown_timeout_seconds == 0 {
            anyhow::bail!("SHUTDOWN_TIMEOUT_SECONDS must be greater than 0");
        }

        if self.code_length == 0 || self.code_length > 32 {
            anyhow::bail!(
                "CODE_LENGTH must be between 1 and 32, got {}",
                self.code_length
            );
        }

        let alphabet = self.alphabet()?;
        let space = code_space_size(&alphabet, self.code_length);
        if space < MIN_CODE_SPACE {
            anyhow::bail!(
                "Code space too small: {} characters ^ {} = {:.3e} codes, need at least {:.0e}",
                alphabet.len(),
                self.code_length,
                space,
                MIN_CODE_SPACE
            );
        }

        if self.code_max_attempts == 0 || self.code_max_attempts > 100 {
            anyhow::bail!(
                "CODE_MAX_ATTEMPTS must be between 1 and 100, got {}",
                self.code_max_attempts
            );
        }

        if self.link_create_max_attempts == 0 || self.link_create_max_attempts > 100 {
            anyhow::bail!(
                "LINK_CREATE_MAX_ATTEMPTS must be between 1 and 100, got {}",
                self.link_create_max_attempts
            );
        }

        Ok(())
    }

    fn alphabet(&self) -> Result<CodeAlphabet> {
        CodeAlphabet::new(&self.code_alphabet).context("Invalid CODE_ALPHABET")
    }

    /// Settings for the click aggregator.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            queue_capacity: self.click_queue_capacity,
            workers: self.click_worker_concurrency,
            retry_attempts: self.click_retry_attempts,
            retry_base_delay: Duration::from_millis(self.click_retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.click_retry_max_delay_ms),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        }
    }

    /// Settings for the code allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the alphabet is invalid.
    pub fn allocator_config(&self) -> Result<AllocatorConfig> {
        Ok(AllocatorConfig {
            alphabet: self.alphabet()?,
            code_length: self.code_length,
            max_attempts: self.code_max_attempts,
        })
    }

    /// Prints configuration summary.
    pub fn print_summary(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Log level: {}", self.log_level);
        tracing::info!("  Log format: {}", self.log_format);
        tracing::info!("  Click queue capacity: {}", self.click_queue_capacity);
        tracing::info!("  Click workers: {}", self.click_worker_concurrency);
        tracing::info!(
            "  Click retries: {} (base {}ms, max {}ms)",
            self.click_retry_attempts,
            self.click_retry_base_delay_ms,
            self.click_retry_max_delay_ms
        );
        tracing::info!(
            "  Short codes: {} characters from a {}-character alphabet",
            self.code_length,
            self.code_alphabet.chars().count()
        );
        if let Ok(alphabet) = self.alphabet() {
            tracing::info!(
                "  Collision probability at 1M links: {:.2e}",
                collision_probability(&alphabet, self.code_length, 1_000_000)
            );
        }
        tracing::info!(
            "  Attempts: {} per allocation, {} per creation",
            self.code_max_attempts,
            self.link_create_max_attempts
        );
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Loads and validates configuration from environment variables.
///
/// # Errors
///
/// Returns an error if a variable is invalid or validation fails.
///
/// # Note
///
/// This function expects environment variables to be already loaded
/// (e.g., via `dotenvy::dotenv()` in `main.rs`).
pub fn load_from_env() -> Result<Config> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}
