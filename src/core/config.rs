use crate::core::errors::ConfigError;
use crate::core::types::{OverlayMode, OverlayStyle, SessionPolicy};
use crate::middleware::CircuitBreakerConfig;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
}

/// Page cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: String,
    /// Entries kept decoded in memory in front of the file store
    pub memory_entries: usize,
}

/// Session open policy
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub auto_translate: bool,
    pub always_show_cache: bool,
}

/// Guard applied around the detection and translation gateways
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub timeout_secs: u64,
    pub failure_threshold: usize,
    pub recovery_secs: u64,
    pub success_threshold: usize,
}

/// Default overlay style for new sessions
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub font: String,
    pub text_color: String,
    pub background_color: String,
    pub padding: u32,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub gateway: GatewayConfig,
    pub overlay: OverlayConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let defaults = OverlayStyle::default();

        Ok(Self {
            logging: LoggingConfig { log_level },
            cache: CacheConfig {
                cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| ".cache/pages".to_string()),
                memory_entries: parse_var("CACHE_MEMORY_ENTRIES", 64)?,
            },
            session: SessionConfig {
                auto_translate: parse_var("AUTO_TRANSLATE", false)?,
                always_show_cache: parse_var("ALWAYS_SHOW_CACHE", true)?,
            },
            gateway: GatewayConfig {
                timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", 60)?,
                failure_threshold: parse_var("CIRCUIT_FAILURE_THRESHOLD", 5)?,
                recovery_secs: parse_var("CIRCUIT_RECOVERY_SECS", 30)?,
                success_threshold: parse_var("CIRCUIT_SUCCESS_THRESHOLD", 2)?,
            },
            overlay: OverlayConfig {
                font: env::var("OVERLAY_FONT").unwrap_or(defaults.font),
                text_color: env::var("OVERLAY_TEXT_COLOR").unwrap_or(defaults.text_color),
                background_color: env::var("OVERLAY_BG_COLOR")
                    .unwrap_or(defaults.background_color),
                padding: parse_var("OVERLAY_PADDING", defaults.padding)?,
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.memory_entries == 0 {
            return Err(ConfigError::InvalidCacheConfig(
                "CACHE_MEMORY_ENTRIES must be > 0".to_string(),
            ));
        }

        // Parent of the cache directory must exist; the directory itself is created on demand
        let cache_path = Path::new(&self.cache.cache_dir);
        if let Some(parent) = cache_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidCacheConfig(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        if self.gateway.timeout_secs == 0 {
            return Err(ConfigError::InvalidGatewayConfig(
                "GATEWAY_TIMEOUT_SECS must be > 0".to_string(),
            ));
        }
        if self.gateway.failure_threshold == 0 || self.gateway.success_threshold == 0 {
            return Err(ConfigError::InvalidGatewayConfig(
                "circuit thresholds must be > 0".to_string(),
            ));
        }

        for (name, value) in [
            ("OVERLAY_TEXT_COLOR", &self.overlay.text_color),
            ("OVERLAY_BG_COLOR", &self.overlay.background_color),
        ] {
            if crate::utils::image_ops::parse_css_color(value).is_none() {
                return Err(ConfigError::InvalidOverlayConfig(format!(
                    "{} is not a recognised colour: {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        self.logging.log_level
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache.cache_dir
    }

    pub fn cache_memory_entries(&self) -> usize {
        self.cache.memory_entries
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_secs)
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.gateway.failure_threshold,
            timeout: Duration::from_secs(self.gateway.recovery_secs),
            success_threshold: self.gateway.success_threshold,
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            auto_translate: self.session.auto_translate,
            always_show_cache: self.session.always_show_cache,
        }
    }

    pub fn default_style(&self) -> OverlayStyle {
        OverlayStyle {
            font: self.overlay.font.clone(),
            text_color: self.overlay.text_color.clone(),
            background_color: self.overlay.background_color.clone(),
            padding: self.overlay.padding,
            mode: OverlayMode::Translation,
        }
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
/// A set-but-unparseable value is an error rather than a silent default.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::EnvVarError {
            name: name.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

// No Default implementation: Config::new() can fail
