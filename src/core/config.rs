use std::env;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    runtime: RuntimeSettings,
    database: DatabaseSettings,
    queue: QueueSettings,
    ai: AiSettings,
    grader: GraderSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct QueueSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) db: u16,
    pub(crate) password: String,
    pub(crate) queue_key: String,
    pub(crate) block_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct AiSettings {
    pub(crate) provider: ProviderKind,
    pub(crate) model_id: String,
    pub(crate) gemini_api_key: String,
    pub(crate) gemini_base_url: String,
    pub(crate) openai_api_key: String,
    pub(crate) openai_base_url: String,
    pub(crate) max_output_tokens: u32,
    pub(crate) request_timeout_seconds: u64,
    pub(crate) max_retries: u32,
    pub(crate) temperature: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct GraderSettings {
    pub(crate) max_task_attempts: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProviderKind {
    Google,
    OpenAi,
}

impl ProviderKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenAi => "openai",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("STUTRACK_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("STUTRACK_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "stutrack");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "stutrack_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");
        let queue_key = env_or_default("GRADER_QUEUE_KEY", "stutrack:grading:requests");
        let block_seconds = parse_u64(
            "GRADER_QUEUE_BLOCK_SECONDS",
            env_or_default("GRADER_QUEUE_BLOCK_SECONDS", "5"),
        )?;

        let provider = parse_provider(env_optional("AI_PROVIDER"))?;
        let model_id = env_or_default("MODEL_ID", "gemini-2.5-flash");
        let gemini_api_key = env_or_default("GEMINI_API_KEY", "");
        let gemini_base_url =
            env_or_default("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com");
        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let max_output_tokens =
            parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "3000"))?;
        let request_timeout_seconds =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;
        let max_retries = parse_u32("AI_MAX_RETRIES", env_or_default("AI_MAX_RETRIES", "2"))?;
        let temperature = parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.7"))?;

        let max_task_attempts =
            parse_i32("GRADER_MAX_ATTEMPTS", env_or_default("GRADER_MAX_ATTEMPTS", "6"))?;

        let log_level = env_or_default("STUTRACK_LOG_LEVEL", "info");
        let json = env_optional("STUTRACK_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            queue: QueueSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
                queue_key,
                block_seconds,
            },
            ai: AiSettings {
                provider,
                model_id,
                gemini_api_key,
                gemini_base_url,
                openai_api_key,
                openai_base_url,
                max_output_tokens,
                request_timeout_seconds,
                max_retries,
                temperature,
            },
            grader: GraderSettings { max_task_attempts },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn queue(&self) -> &QueueSettings {
        &self.queue
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn grader(&self) -> &GraderSettings {
        &self.grader
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.queue_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_QUEUE_KEY",
                value: String::from("<empty>"),
            });
        }

        if self.ai.model_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "MODEL_ID",
                value: String::from("<empty>"),
            });
        }

        if self.grader.max_task_attempts < 1 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_MAX_ATTEMPTS",
                value: self.grader.max_task_attempts.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        match self.ai.provider {
            ProviderKind::Google => {
                if self.ai.gemini_api_key.is_empty() {
                    return Err(ConfigError::MissingSecret("GEMINI_API_KEY"));
                }
            }
            ProviderKind::OpenAi => {
                if self.ai.openai_api_key.is_empty() {
                    return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
                }
                if self.ai.openai_base_url.is_empty() {
                    return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
                }
            }
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl QueueSettings {
    pub(crate) fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }

    pub(crate) fn processing_key(&self) -> String {
        format!("{}:processing", self.queue_key)
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_i32(field: &'static str, value: String) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_f64(field: &'static str, value: String) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_provider(value: Option<String>) -> Result<ProviderKind, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("google") | Some("gemini") => Ok(ProviderKind::Google),
        Some("openai") => Ok(ProviderKind::OpenAi),
        Some(other) => {
            Err(ConfigError::InvalidValue { field: "AI_PROVIDER", value: other.to_string() })
        }
    }
}
