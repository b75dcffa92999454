use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{SchemaRegistry, SlotDependencyTable, DEFAULT_MAX_PARTY_SIZE};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub dialogue: DialogueConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    pub planner: PlannerKind,
    pub history_window: usize,
    pub tool_timeout_secs: u64,
    pub tool_max_retries: u32,
    pub intent_switch_threshold: f32,
    pub max_party_size: u32,
    pub slot_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(alias = "openai")]
    OpenAi,
    Ollama,
    #[serde(alias = "huggingface")]
    HuggingFace,
}

impl LlmProvider {
    /// OpenAI-compatible chat completions root used when `llm.base_url` is unset.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::HuggingFace => "https://router.huggingface.co/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    Rules,
    Llm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_backend: Option<StoreBackend>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub planner: Option<PlannerKind>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: "sqlite://concierge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 20,
                max_tokens: 512,
            },
            dialogue: DialogueConfig {
                planner: PlannerKind::Rules,
                history_window: 20,
                tool_timeout_secs: 5,
                tool_max_retries: 1,
                intent_switch_threshold: 0.75,
                max_party_size: DEFAULT_MAX_PARTY_SIZE,
                slot_dependencies: BTreeMap::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported database backend `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "huggingface" | "hugging_face" | "hf" => Ok(Self::HuggingFace),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|huggingface)"
            ))),
        }
    }
}

impl std::str::FromStr for PlannerKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported planner `{other}` (expected rules|llm)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl DialogueConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn schema_registry(&self) -> SchemaRegistry {
        SchemaRegistry::new(self.max_party_size)
    }

    pub fn dependency_table(&self) -> Result<SlotDependencyTable, ConfigError> {
        SlotDependencyTable::from_config(&self.slot_dependencies).map_err(|error| {
            ConfigError::Validation(format!("dialogue.slot_dependencies: {error}"))
        })
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("concierge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(backend) = database.backend {
                self.database.backend = backend;
            }
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(planner) = dialogue.planner {
                self.dialogue.planner = planner;
            }
            if let Some(history_window) = dialogue.history_window {
                self.dialogue.history_window = history_window;
            }
            if let Some(tool_timeout_secs) = dialogue.tool_timeout_secs {
                self.dialogue.tool_timeout_secs = tool_timeout_secs;
            }
            if let Some(tool_max_retries) = dialogue.tool_max_retries {
                self.dialogue.tool_max_retries = tool_max_retries;
            }
            if let Some(threshold) = dialogue.intent_switch_threshold {
                self.dialogue.intent_switch_threshold = threshold;
            }
            if let Some(max_party_size) = dialogue.max_party_size {
                self.dialogue.max_party_size = max_party_size;
            }
            if let Some(slot_dependencies) = dialogue.slot_dependencies {
                self.dialogue.slot_dependencies = slot_dependencies;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CONCIERGE_DATABASE_BACKEND") {
            self.database.backend = value.parse()?;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("CONCIERGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("CONCIERGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONCIERGE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("CONCIERGE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_number("CONCIERGE_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_DIALOGUE_PLANNER") {
            self.dialogue.planner = value.parse()?;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOGUE_HISTORY_WINDOW") {
            self.dialogue.history_window =
                parse_number("CONCIERGE_DIALOGUE_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOGUE_TOOL_TIMEOUT_SECS") {
            self.dialogue.tool_timeout_secs =
                parse_number("CONCIERGE_DIALOGUE_TOOL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOGUE_TOOL_MAX_RETRIES") {
            self.dialogue.tool_max_retries =
                parse_number("CONCIERGE_DIALOGUE_TOOL_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOGUE_INTENT_SWITCH_THRESHOLD") {
            self.dialogue.intent_switch_threshold =
                parse_number("CONCIERGE_DIALOGUE_INTENT_SWITCH_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOGUE_MAX_PARTY_SIZE") {
            self.dialogue.max_party_size =
                parse_number("CONCIERGE_DIALOGUE_MAX_PARTY_SIZE", &value)?;
        }

        let log_level =
            read_env("CONCIERGE_LOGGING_LEVEL").or_else(|| read_env("CONCIERGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CONCIERGE_LOGGING_FORMAT").or_else(|| read_env("CONCIERGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend) = overrides.database_backend {
            self.database.backend = backend;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(planner) = overrides.planner {
            self.dialogue.planner = planner;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        if self.dialogue.planner == PlannerKind::Llm {
            validate_llm(&self.llm)?;
        }
        validate_dialogue(&self.dialogue)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("concierge.toml"), PathBuf::from("config/concierge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    if database.backend == StoreBackend::Sqlite {
        let url = database.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::HuggingFace => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/huggingface providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    let base_url = llm.resolved_base_url();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.history_window == 0 || dialogue.history_window > 200 {
        return Err(ConfigError::Validation(
            "dialogue.history_window must be in range 1..=200".to_string(),
        ));
    }

    if dialogue.tool_timeout_secs == 0 || dialogue.tool_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "dialogue.tool_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if dialogue.tool_max_retries > 1 {
        return Err(ConfigError::Validation(
            "dialogue.tool_max_retries must be 0 or 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&dialogue.intent_switch_threshold) {
        return Err(ConfigError::Validation(
            "dialogue.intent_switch_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if dialogue.max_party_size == 0 {
        return Err(ConfigError::Validation(
            "dialogue.max_party_size must be greater than zero".to_string(),
        ));
    }

    dialogue.dependency_table().map(|_| ())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    dialogue: Option<DialoguePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    backend: Option<StoreBackend>,
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    planner: Option<PlannerKind>,
    history_window: Option<usize>,
    tool_timeout_secs: Option<u64>,
    tool_max_retries: Option<u32>,
    intent_switch_threshold: Option<f32>,
    max_party_size: Option<u32>,
    slot_dependencies: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat, PlannerKind,
        StoreBackend,
    };
    use crate::domain::slot::SlotName;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_run_offline_with_rule_planner() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.backend == StoreBackend::Memory, "default store is in-memory")?;
        ensure(config.dialogue.planner == PlannerKind::Rules, "default planner is rules")?;
        ensure(config.dialogue.tool_max_retries == 1, "one retry by default")?;
        ensure(config.dialogue.history_window == 20, "history window defaults to 20")?;
        ensure(
            (config.dialogue.intent_switch_threshold - 0.75).abs() < f32::EPSILON,
            "intent switch threshold defaults to 0.75",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CONCIERGE_HF_TOKEN", "hf-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("concierge.toml");
            fs::write(
                &path,
                r#"
[dialogue]
planner = "llm"

[llm]
provider = "hugging_face"
api_key = "${TEST_CONCIERGE_HF_TOKEN}"
model = "meta-llama/Llama-3.1-8B-Instruct"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "hf-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            ensure(config.llm.provider == LlmProvider::HuggingFace, "provider from file")?;
            ensure(
                config.llm.resolved_base_url() == "https://router.huggingface.co/v1",
                "provider default base url should apply",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CONCIERGE_HF_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_LOG_LEVEL", "warn");
        env::set_var("CONCIERGE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_LOG_LEVEL", "CONCIERGE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CONCIERGE_DIALOGUE_MAX_PARTY_SIZE", "12");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("concierge.toml");
            fs::write(
                &path,
                r#"
[database]
backend = "sqlite"
url = "sqlite://from-file.db"

[dialogue]
max_party_size = 8
tool_timeout_secs = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.database.backend == StoreBackend::Sqlite, "backend comes from file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.dialogue.max_party_size == 12, "env party size should win over file")?;
            ensure(config.dialogue.tool_timeout_secs == 3, "file tool timeout should apply")?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_DATABASE_URL", "CONCIERGE_DIALOGUE_MAX_PARTY_SIZE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_DIALOGUE_PLANNER", "llm");
        env::set_var("CONCIERGE_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["CONCIERGE_DIALOGUE_PLANNER", "CONCIERGE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn retry_budget_above_one_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_DIALOGUE_TOOL_MAX_RETRIES", "3");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("three retries must be rejected".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("tool_max_retries")
                ),
                "validation failure should mention tool_max_retries",
            ),
        };

        clear_vars(&["CONCIERGE_DIALOGUE_TOOL_MAX_RETRIES"]);
        result
    }

    #[test]
    fn unknown_log_level_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_LOG_LEVEL", "off");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("`off` is not a supported log level".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("logging.level")
                ),
                "validation failure should mention logging.level",
            ),
        };

        clear_vars(&["CONCIERGE_LOG_LEVEL"]);
        result
    }

    #[test]
    fn slot_dependencies_are_loaded_and_checked() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let valid = dir.path().join("valid.toml");
        fs::write(
            &valid,
            r#"
[dialogue.slot_dependencies]
city = ["restaurant_id"]
date = ["time"]
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(valid), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;
        let table = config.dialogue.dependency_table().map_err(|err| err.to_string())?;
        ensure(table.dependents_of(SlotName::Date) == vec![SlotName::Time], "date -> time edge")?;

        let invalid = dir.path().join("invalid.toml");
        fs::write(
            &invalid,
            r#"
[dialogue.slot_dependencies]
city = ["restaurant"]
"#,
        )
        .map_err(|err| err.to_string())?;

        let options = LoadOptions { config_path: Some(invalid), ..LoadOptions::default() };
        let error = match AppConfig::load(options) {
            Ok(_) => return Err("unknown slot name must be rejected".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("restaurant")),
            "validation failure should name the unknown slot",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(config.llm.api_key.is_some(), "api key should still be loaded")?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_LLM_API_KEY"]);
        result
    }
}
