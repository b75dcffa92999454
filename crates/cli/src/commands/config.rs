use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use concierge_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Effective configuration with the source of every value. Secrets are redacted.
pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key: &str, env_key: &str| {
        field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for (key, env_key, value) in entries(&config) {
        lines.push(render_line(key, &value, source(key, env_key)));
    }
    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    let api_key = config.llm.api_key.as_ref().map(|key| redact_secret(key.expose_secret()));
    vec![
        (
            "database.backend",
            "CONCIERGE_DATABASE_BACKEND",
            format!("{:?}", config.database.backend).to_lowercase(),
        ),
        ("database.url", "CONCIERGE_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "CONCIERGE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "CONCIERGE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        (
            "llm.provider",
            "CONCIERGE_LLM_PROVIDER",
            format!("{:?}", config.llm.provider).to_lowercase(),
        ),
        ("llm.model", "CONCIERGE_LLM_MODEL", config.llm.model.clone()),
        ("llm.base_url", "CONCIERGE_LLM_BASE_URL", config.llm.resolved_base_url().to_string()),
        ("llm.api_key", "CONCIERGE_LLM_API_KEY", api_key.unwrap_or_else(|| "<unset>".to_string())),
        ("llm.timeout_secs", "CONCIERGE_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        ("llm.max_tokens", "CONCIERGE_LLM_MAX_TOKENS", config.llm.max_tokens.to_string()),
        (
            "dialogue.planner",
            "CONCIERGE_DIALOGUE_PLANNER",
            format!("{:?}", config.dialogue.planner).to_lowercase(),
        ),
        (
            "dialogue.history_window",
            "CONCIERGE_DIALOGUE_HISTORY_WINDOW",
            config.dialogue.history_window.to_string(),
        ),
        (
            "dialogue.tool_timeout_secs",
            "CONCIERGE_DIALOGUE_TOOL_TIMEOUT_SECS",
            config.dialogue.tool_timeout_secs.to_string(),
        ),
        (
            "dialogue.tool_max_retries",
            "CONCIERGE_DIALOGUE_TOOL_MAX_RETRIES",
            config.dialogue.tool_max_retries.to_string(),
        ),
        (
            "dialogue.intent_switch_threshold",
            "CONCIERGE_DIALOGUE_INTENT_SWITCH_THRESHOLD",
            format!("{:.2}", config.dialogue.intent_switch_threshold),
        ),
        (
            "dialogue.max_party_size",
            "CONCIERGE_DIALOGUE_MAX_PARTY_SIZE",
            config.dialogue.max_party_size.to_string(),
        ),
        ("logging.level", "CONCIERGE_LOGGING_LEVEL", config.logging.level.clone()),
        (
            "logging.format",
            "CONCIERGE_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("concierge.toml"), PathBuf::from("config/concierge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognisable prefix (`sk-`, `hf_`) and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find(['-', '_']) {
        Some(index) if index <= 4 => format!("{}***", &trimmed[..=index]),
        _ => "<redacted>".to_string(),
    }
}
