//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default endpoint of the discount-eligibility service.
pub const DEFAULT_DISCOUNT_API_URL: &str = "https://portalmasterov.ru/api/discount";

/// Default Telegram Bot API base URL.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Which messaging channel drives the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Telegram,
    /// Local stdin/stdout session for manual testing.
    Cli,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Group probed by the diagnostics endpoint. Empty when not configured.
    pub target_group_id: String,
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
    /// Pause between two consecutive polls.
    pub poll_interval: Duration,
}

/// Discount verification settings.
#[derive(Debug, Clone)]
pub struct DiscountConfig {
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_DISCOUNT_API_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub channel: ChannelKind,
    /// Present whenever `BOT_TOKEN` is set; required for the Telegram channel.
    pub telegram: Option<TelegramConfig>,
    pub discount: DiscountConfig,
    /// Port of the health-check HTTP server.
    pub port: u16,
}

impl BotConfig {
    /// Load configuration from the process environment (and `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel = match lookup("SURVEY_CHANNEL").as_deref().map(str::trim) {
            None | Some("") | Some("telegram") => ChannelKind::Telegram,
            Some("cli") => ChannelKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SURVEY_CHANNEL".into(),
                    message: format!("expected 'telegram' or 'cli', got '{other}'"),
                });
            }
        };

        let bot_token = lookup("BOT_TOKEN").filter(|t| !t.trim().is_empty());
        if channel == ChannelKind::Telegram && bot_token.is_none() {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN".into()));
        }

        let telegram = match bot_token {
            Some(token) => Some(TelegramConfig {
                bot_token: SecretString::from(token.trim().to_string()),
                target_group_id: lookup("TARGET_GROUP_ID")
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
                api_base: lookup("TELEGRAM_API_BASE")
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
                poll_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "TELEGRAM_POLL_TIMEOUT_SECS",
                    10,
                )?),
                poll_interval: Duration::from_millis(parse_or(
                    &lookup,
                    "TELEGRAM_POLL_INTERVAL_MS",
                    300,
                )?),
            }),
            None => None,
        };

        let discount = DiscountConfig {
            api_url: lookup("DISCOUNT_API_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DISCOUNT_API_URL.to_string()),
            timeout: Duration::from_secs(parse_or(&lookup, "DISCOUNT_TIMEOUT_SECS", 15)?),
        };

        let port = parse_or(&lookup, "PORT", 400)?;

        Ok(Self {
            channel,
            telegram,
            discount,
            port,
        })
    }

    /// Whether a target group is configured for diagnostics.
    pub fn has_target_group(&self) -> bool {
        self.telegram
            .as_ref()
            .is_some_and(|t| !t.target_group_id.is_empty())
    }
}

/// Parse an optional variable, falling back to `default` when unset or blank.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
