use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::classifier::DEFAULT_TREND_THRESHOLD_PERCENT;

/// Longest accepted report interval, in days.
pub const MAX_INTERVAL_DAYS: u32 = 366;

#[derive(Debug, Clone)]
pub struct Config {
    /// Display name of the reported site, e.g. `example.com`.
    pub target_website: String,
    pub analysis: AnalysisConfig,
    pub schedule: ScheduleConfig,
    pub analytics: AnalyticsSourceConfig,
    pub llm: LlmConfig,
    pub smtp: SmtpConfig,
    pub logging: LoggingConfig,
}

/// Tunable thresholds used by the classifier and the generators. All values
/// are percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub trend_threshold_percent: f64,
    pub engagement_low_percent: f64,
    pub engagement_high_percent: f64,
    pub acquisition_concentration_percent: f64,
    pub geo_concentration_percent: f64,
    pub conversion_rate_low_percent: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trend_threshold_percent: DEFAULT_TREND_THRESHOLD_PERCENT,
            engagement_low_percent: 40.0,
            engagement_high_percent: 70.0,
            acquisition_concentration_percent: 80.0,
            geo_concentration_percent: 80.0,
            conversion_rate_low_percent: 1.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), String> {
        let bands = [
            ("trend threshold", self.trend_threshold_percent),
            ("engagement low band", self.engagement_low_percent),
            ("engagement high band", self.engagement_high_percent),
            (
                "acquisition concentration band",
                self.acquisition_concentration_percent,
            ),
            ("geo concentration band", self.geo_concentration_percent),
            ("conversion rate band", self.conversion_rate_low_percent),
        ];
        for (name, value) in bands {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(format!("{name} must be between 0 and 100, got {value}"));
            }
        }
        if self.trend_threshold_percent <= 0.0 {
            return Err("trend threshold must be above 0".to_string());
        }
        if self.engagement_low_percent >= self.engagement_high_percent {
            return Err("engagement low band must be below the high band".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub interval_days: u32,
    pub report_time: NaiveTime,
    pub timezone: Tz,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_days: 30,
            report_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            timezone: Tz::UTC,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsCredentials {
    /// Path to a service-account JSON key file.
    ServiceAccountFile(String),
    /// Base64-encoded service-account JSON key.
    ServiceAccountBase64(String),
    /// Pre-issued OAuth access token.
    AccessToken(String),
}

#[derive(Debug, Clone)]
pub struct AnalyticsSourceConfig {
    pub property_id: String,
    pub credentials: AnalyticsCredentials,
    pub api_base: String,
    /// Overrides the token endpoint named in the service-account key.
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    Gemini,
    OpenAiCompatible,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// STARTTLS when true, implicit TLS when false.
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub to_address: String,
    pub subject_prefix: String,
    pub error_notification_to: Option<String>,
    /// Log deliveries instead of dispatching them.
    pub noop: bool,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for a daily-rotated log file; stdout only when unset.
    pub dir: Option<String>,
}

const GA_API_BASE: &str = "https://analyticsdata.googleapis.com";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| format!("{key} is required"));
        let flag = |key: &str, default: bool| {
            get(key)
                .map(|v| {
                    v.eq_ignore_ascii_case("1")
                        || v.eq_ignore_ascii_case("true")
                        || v.eq_ignore_ascii_case("yes")
                })
                .unwrap_or(default)
        };
        let percent = |key: &str, default: f64| -> Result<f64, String> {
            get(key)
                .map(|v| v.parse::<f64>().map_err(|e| format!("invalid {key}: {e}")))
                .transpose()
                .map(|v| v.unwrap_or(default))
        };

        let defaults = AnalysisConfig::default();
        let analysis = AnalysisConfig {
            trend_threshold_percent: percent(
                "TRENDPOST_TREND_THRESHOLD_PERCENT",
                defaults.trend_threshold_percent,
            )?,
            engagement_low_percent: percent(
                "TRENDPOST_ENGAGEMENT_LOW_PERCENT",
                defaults.engagement_low_percent,
            )?,
            engagement_high_percent: percent(
                "TRENDPOST_ENGAGEMENT_HIGH_PERCENT",
                defaults.engagement_high_percent,
            )?,
            acquisition_concentration_percent: percent(
                "TRENDPOST_ACQUISITION_CONCENTRATION_PERCENT",
                defaults.acquisition_concentration_percent,
            )?,
            geo_concentration_percent: percent(
                "TRENDPOST_GEO_CONCENTRATION_PERCENT",
                defaults.geo_concentration_percent,
            )?,
            conversion_rate_low_percent: percent(
                "TRENDPOST_CONVERSION_RATE_LOW_PERCENT",
                defaults.conversion_rate_low_percent,
            )?,
        };
        analysis.validate()?;

        let schedule = ScheduleConfig {
            interval_days: match get("TRENDPOST_REPORT_INTERVAL_DAYS") {
                Some(raw) => {
                    let days = raw
                        .parse::<u32>()
                        .map_err(|e| format!("invalid TRENDPOST_REPORT_INTERVAL_DAYS: {e}"))?;
                    if !(1..=MAX_INTERVAL_DAYS).contains(&days) {
                        return Err(format!(
                            "TRENDPOST_REPORT_INTERVAL_DAYS must be between 1 and {MAX_INTERVAL_DAYS}"
                        ));
                    }
                    days
                }
                None => 30,
            },
            report_time: parse_report_time(
                &get("TRENDPOST_REPORT_TIME").unwrap_or_else(|| "09:00".to_string()),
            )?,
            timezone: get("TRENDPOST_TIMEZONE")
                .unwrap_or_else(|| "UTC".to_string())
                .parse::<Tz>()
                .map_err(|_| "invalid TRENDPOST_TIMEZONE".to_string())?,
        };

        let credentials = if let Some(token) = get("TRENDPOST_GA_ACCESS_TOKEN") {
            AnalyticsCredentials::AccessToken(token)
        } else if let Some(path) = get("TRENDPOST_GA_CREDENTIALS_FILE") {
            AnalyticsCredentials::ServiceAccountFile(path)
        } else if let Some(encoded) = get("TRENDPOST_GA_CREDENTIALS_JSON_BASE64") {
            AnalyticsCredentials::ServiceAccountBase64(encoded)
        } else {
            return Err("no Google Analytics credentials: set TRENDPOST_GA_CREDENTIALS_FILE, \
                 TRENDPOST_GA_CREDENTIALS_JSON_BASE64 or TRENDPOST_GA_ACCESS_TOKEN"
                .to_string());
        };
        let analytics = AnalyticsSourceConfig {
            property_id: require("TRENDPOST_GA_PROPERTY_ID")?,
            credentials,
            api_base: get("TRENDPOST_GA_API_BASE")
                .unwrap_or_else(|| GA_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token_uri: get("TRENDPOST_GA_TOKEN_URI"),
        };

        let provider = match get("TRENDPOST_LLM_PROVIDER").as_deref() {
            None | Some("gemini") => LlmProvider::Gemini,
            Some("openai_compatible") => LlmProvider::OpenAiCompatible,
            Some(other) => {
                return Err(format!(
                    "unsupported TRENDPOST_LLM_PROVIDER {other}: expected gemini or openai_compatible"
                ))
            }
        };
        let model = get("TRENDPOST_LLM_MODEL").unwrap_or_else(|| match provider {
            LlmProvider::Gemini => "gemini-2.5-flash".to_string(),
            LlmProvider::OpenAiCompatible => "gpt-4o-mini".to_string(),
        });
        if provider == LlmProvider::Gemini && !model.starts_with("gemini") {
            return Err(format!("unsupported Gemini model: {model}"));
        }
        let api_key = get("TRENDPOST_LLM_API_KEY");
        if provider == LlmProvider::Gemini && api_key.is_none() {
            return Err("TRENDPOST_LLM_API_KEY is required for the gemini provider".to_string());
        }
        let base_url = match (&provider, get("TRENDPOST_LLM_BASE_URL")) {
            (_, Some(url)) => url,
            (LlmProvider::Gemini, None) => GEMINI_API_BASE.to_string(),
            (LlmProvider::OpenAiCompatible, None) => {
                return Err(
                    "TRENDPOST_LLM_BASE_URL is required for the openai_compatible provider"
                        .to_string(),
                )
            }
        };
        let llm = LlmConfig {
            provider,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: get("TRENDPOST_LLM_TEMPERATURE")
                .map(|v| v.parse::<f32>().map_err(|e| format!("invalid TRENDPOST_LLM_TEMPERATURE: {e}")))
                .transpose()?
                .unwrap_or(0.7),
            max_output_tokens: get("TRENDPOST_LLM_MAX_OUTPUT_TOKENS")
                .map(|v| {
                    v.parse::<u32>()
                        .map_err(|e| format!("invalid TRENDPOST_LLM_MAX_OUTPUT_TOKENS: {e}"))
                })
                .transpose()?
                .unwrap_or(1000),
        };

        let smtp = SmtpConfig {
            host: require("TRENDPOST_SMTP_HOST")?,
            port: get("TRENDPOST_SMTP_PORT")
                .map(|v| v.parse::<u16>().map_err(|e| format!("invalid TRENDPOST_SMTP_PORT: {e}")))
                .transpose()?
                .unwrap_or(587),
            use_tls: flag("TRENDPOST_SMTP_USE_TLS", true),
            username: get("TRENDPOST_SMTP_USERNAME"),
            password: get("TRENDPOST_SMTP_PASSWORD"),
            from_address: require("TRENDPOST_EMAIL_FROM")?,
            from_name: get("TRENDPOST_EMAIL_FROM_NAME")
                .unwrap_or_else(|| "Analytics Reporter".to_string()),
            to_address: require("TRENDPOST_EMAIL_TO")?,
            subject_prefix: get("TRENDPOST_EMAIL_SUBJECT_PREFIX")
                .unwrap_or_else(|| "[Analytics Report]".to_string()),
            error_notification_to: get("TRENDPOST_ERROR_NOTIFICATION_EMAIL"),
            noop: flag("TRENDPOST_SMTP_NOOP", false),
        };

        Ok(Self {
            target_website: require("TRENDPOST_TARGET_WEBSITE")?,
            analysis,
            schedule,
            analytics,
            llm,
            smtp,
            logging: LoggingConfig {
                level: get("TRENDPOST_LOG_LEVEL")
                    .unwrap_or_else(|| "info".to_string())
                    .to_lowercase(),
                dir: get("TRENDPOST_LOG_DIR"),
            },
        })
    }
}

/// Parses a 24-hour `HH:MM` time of day.
pub fn parse_report_time(raw: &str) -> Result<NaiveTime, String> {
    let invalid = || "report time must be in HH:MM format (24-hour)".to_string();
    let (hours, minutes) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}
