use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use concierge_agent::AgentRuntime;
use concierge_core::config::LoadOptions;
use concierge_core::domain::session::SessionId;

use crate::bootstrap::{bootstrap_with_config, init_logging, BootstrapError};
use crate::commands::{async_runtime, load_config, CommandResult};

const GREETING: &str = "Hi! I'm your restaurant concierge. \
Ask me to find a place, check a table, book, cancel, or look up loyalty. \
Type /reset to start over, /state to inspect the session, /quit to leave.";

#[derive(Debug, Error)]
enum ChatError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Interactive session over stdin/stdout.
pub fn run(options: LoadOptions, session: Option<String>, json: bool) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config);
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let session_id =
        SessionId(session.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4().simple())));
    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config).await?;
        let mut stdout = tokio::io::stdout();
        let stdin = BufReader::new(tokio::io::stdin());
        let turns = converse(&app.runtime, &session_id, stdin, &mut stdout, json).await?;
        if let Some(pool) = app.db_pool {
            pool.close().await;
        }
        Ok::<u64, ChatError>(turns)
    });

    match result {
        Ok(turns) => {
            let message = format!("session {session_id} ended after {turns} turn(s)");
            CommandResult::success("chat", message)
        }
        Err(ChatError::Bootstrap(error)) => CommandResult::bootstrap_failure("chat", &error),
        Err(ChatError::Io(error)) => CommandResult::failure("chat", "io", error.to_string(), 74),
    }
}

/// Reads utterances line by line until EOF or `/quit`. Returns the number of turns handled.
pub async fn converse<R, W>(
    runtime: &AgentRuntime,
    session_id: &SessionId,
    input: R,
    output: &mut W,
    json: bool,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut turns = 0;
    if !json {
        write_line(output, GREETING).await?;
    }

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let rendered = match line {
            "/quit" | "/exit" => break,
            "/reset" => {
                let reply = runtime.reset_session(session_id).await;
                render(&reply, json)
            }
            "/state" => match runtime.session(session_id).await {
                Some(session) => {
                    serde_json::to_string_pretty(&session).map_err(std::io::Error::other)?
                }
                None => "no turns yet".to_string(),
            },
            text => {
                turns += 1;
                let reply = runtime.handle_turn(session_id, text).await;
                render(&reply, json)
            }
        };
        write_line(output, &rendered).await?;
    }
    Ok(turns)
}

fn render(reply: &concierge_agent::TurnReply, json: bool) -> String {
    if json {
        serde_json::to_string(reply).unwrap_or_else(|_| reply.text.clone())
    } else {
        format!("concierge> {}", reply.text)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
