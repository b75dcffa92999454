use serde_json::{Map, Value};

use concierge_agent::tools::{ToolError, ToolErrorKind, ToolResponse};
use concierge_core::config::LoadOptions;

use crate::bootstrap::{bootstrap_with_config, init_logging, BootstrapError};
use crate::commands::{async_runtime, load_config, CommandResult};

/// Validates `args` against the tool's schema and runs it once, outside any session.
pub fn run(options: LoadOptions, name: &str, args: &str) -> CommandResult {
    let args = match parse_args(args) {
        Ok(args) => args,
        Err(message) => return CommandResult::failure("tool", "usage", message, 64),
    };
    let config = match load_config("tool", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config);
    let runtime = match async_runtime("tool") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config).await?;
        let response = app.runtime.tools().invoke(name, args).await;
        if let Some(pool) = app.db_pool {
            pool.close().await;
        }
        Ok::<_, BootstrapError>(response)
    });

    match result {
        Ok(Ok(response)) => {
            let message = match &response {
                ToolResponse::Completed { .. } => format!("{name} completed"),
                ToolResponse::Declined { reason, .. } => {
                    format!("{name} declined: {}", reason.as_str())
                }
            };
            let data = serde_json::to_value(&response).unwrap_or(Value::Null);
            CommandResult::success_with_data("tool", message, Some(data))
        }
        Ok(Err(error)) => tool_failure(&error),
        Err(error) => CommandResult::bootstrap_failure("tool", &error),
    }
}

fn parse_args(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(_) => Err("--args must be a JSON object".to_string()),
        Err(error) => Err(format!("--args is not valid JSON: {error}")),
    }
}

fn tool_failure(error: &ToolError) -> CommandResult {
    match error.kind() {
        ToolErrorKind::InvalidArguments | ToolErrorKind::UnknownTool => {
            CommandResult::failure("tool", "usage", error.to_string(), 64)
        }
        _ => CommandResult::failure("tool", "tool_failed", error.to_string(), 1),
    }
}
