use serde_json::Value;

use concierge_core::config::LoadOptions;
use concierge_core::domain::session::SessionId;

use crate::bootstrap::{bootstrap_with_config, init_logging, BootstrapError};
use crate::commands::{async_runtime, load_config, CommandResult};

/// Runs each message as one turn of a single session and reports every reply.
pub fn run(options: LoadOptions, session: Option<String>, messages: Vec<String>) -> CommandResult {
    if messages.is_empty() {
        return CommandResult::failure("ask", "usage", "at least one message is required", 64);
    }
    let config = match load_config("ask", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config);
    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let session_id = SessionId(
        session.unwrap_or_else(|| format!("cli-ask-{}", uuid::Uuid::new_v4().simple())),
    );
    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config).await?;
        let mut replies = Vec::with_capacity(messages.len());
        for message in &messages {
            replies.push(app.runtime.handle_turn(&session_id, message).await);
        }
        if let Some(pool) = app.db_pool {
            pool.close().await;
        }
        Ok::<_, BootstrapError>(replies)
    });

    match result {
        Ok(replies) => {
            let last = replies.last().map(|reply| reply.text.clone()).unwrap_or_default();
            let data = serde_json::to_value(&replies).unwrap_or(Value::Null);
            CommandResult::success_with_data("ask", last, Some(data))
        }
        Err(error) => CommandResult::bootstrap_failure("ask", &error),
    }
}
