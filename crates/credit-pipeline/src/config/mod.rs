use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub bureau: BureauConfig,
    pub assessment: AssessmentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let bureau = BureauConfig {
            base_url: env::var("BUREAU_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8490".to_string()),
            request_timeout_secs: env::var("BUREAU_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout)?,
            fallback_fixture: env::var("BUREAU_FALLBACK_FIXTURE").ok().map(PathBuf::from),
        };

        let assessment = AssessmentConfig {
            // An unreadable tolerance must never block assessments; the
            // gate silently falls back to the 30-day default.
            cycle_day_tolerance: env::var("ASSESSMENT_CYCLE_DAY_TOLERANCE")
                .ok()
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .unwrap_or(30),
            search_threshold: parse_threshold("ASSESSMENT_SEARCH_THRESHOLD", 0.8)?,
            report_name_threshold: parse_threshold("ASSESSMENT_REPORT_NAME_THRESHOLD", 0.8)?,
            report_mother_threshold: parse_threshold("ASSESSMENT_REPORT_MOTHER_THRESHOLD", 0.7)?,
            token_revalidate_buffer_mins: parse_minutes("TOKEN_REVALIDATE_BUFFER_MINS", 3)?,
            token_fallback_ttl_mins: parse_minutes("TOKEN_FALLBACK_TTL_MINS", 40)?,
            poll_interval_secs: env::var("REPORT_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidPollSettings)?,
            max_poll_attempts: env::var("REPORT_MAX_POLL_ATTEMPTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidPollSettings)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            bureau,
            assessment,
        })
    }
}

fn parse_threshold(var: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidThreshold { var })?,
        Err(_) => default,
    };

    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidThreshold { var })
    }
}

fn parse_minutes(var: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or(ConfigError::InvalidMinutes { var }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Upstream bureau endpoint settings.
#[derive(Debug, Clone)]
pub struct BureauConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// JSON fixture of canned responses; absent means no graceful
    /// degradation when the bureau is unreachable.
    pub fallback_fixture: Option<PathBuf>,
}

/// Business gates and polling tuning.
#[derive(Debug, Clone)]
pub struct AssessmentConfig {
    pub cycle_day_tolerance: i64,
    pub search_threshold: f64,
    pub report_name_threshold: f64,
    pub report_mother_threshold: f64,
    pub token_revalidate_buffer_mins: i64,
    pub token_fallback_ttl_mins: i64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout,
    InvalidThreshold { var: &'static str },
    InvalidMinutes { var: &'static str },
    InvalidPollSettings,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "BUREAU_TIMEOUT_SECS must be a positive integer")
            }
            ConfigError::InvalidThreshold { var } => {
                write!(f, "{var} must be a number between 0.0 and 1.0")
            }
            ConfigError::InvalidMinutes { var } => {
                write!(f, "{var} must be a positive number of minutes")
            }
            ConfigError::InvalidPollSettings => write!(
                f,
                "REPORT_POLL_INTERVAL_SECS and REPORT_MAX_POLL_ATTEMPTS must be positive integers"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
