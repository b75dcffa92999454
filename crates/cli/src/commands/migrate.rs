use concierge_core::config::LoadOptions;

use crate::bootstrap::{connect_database, BootstrapError};
use crate::commands::{async_runtime, load_config, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_database(&config).await?;
        pool.close().await;
        Ok::<(), BootstrapError>(())
    });

    match result {
        Ok(()) => {
            let message = format!("applied pending migrations to {}", config.database.url);
            CommandResult::success("migrate", message)
        }
        Err(error) => CommandResult::bootstrap_failure("migrate", &error),
    }
}
