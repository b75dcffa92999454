pub mod bootstrap;
pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use concierge_core::config::{ConfigOverrides, LoadOptions, PlannerKind, StoreBackend};

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    about = "Conversational restaurant reservation concierge",
    long_about = "Chat with the reservation concierge, run one-shot turns, \
                  and manage its catalog database.",
    after_help = "Examples:\
                  \n  concierge chat\
                  \n  concierge ask \"book karim's for 4 tomorrow at 8pm\"\
                  \n  concierge --backend sqlite migrate\
                  \n  concierge config"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Configuration file (must exist when given)"
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "memory|sqlite", help = "Override database.backend")]
    backend: Option<StoreBackend>,
    #[arg(long, global = true, value_name = "URL", help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, value_name = "rules|llm", help = "Override dialogue.planner")]
    planner: Option<PlannerKind>,
    #[arg(long, global = true, value_name = "FILTER", help = "Override logging.level")]
    log_level: Option<String>,
}

impl GlobalArgs {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                database_backend: self.backend,
                database_url: self.database_url,
                log_level: self.log_level,
                planner: self.planner,
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive conversation on stdin/stdout")]
    Chat {
        #[arg(long, help = "Resume or name a session id")]
        session: Option<String>,
        #[arg(long, help = "Emit one JSON reply per line")]
        json: bool,
    },
    #[command(
        about = "Run one or more messages as turns of a single session and print JSON replies"
    )]
    Ask {
        #[arg(long, help = "Session id shared by the messages")]
        session: Option<String>,
        #[arg(required = true, value_name = "MESSAGE")]
        messages: Vec<String>,
    },
    #[command(about = "Call one registry tool directly, e.g. get_menu or list_upcoming_events")]
    Tool {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(
            long,
            value_name = "JSON",
            default_value = "{}",
            help = "Tool arguments as a JSON object"
        )]
        args: String,
    },
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo catalog, loyalty profiles, menus and events into SQLite")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Chat { session, json } => commands::chat::run(options, session, json),
        Command::Ask { session, messages } => commands::ask::run(options, session, messages),
        Command::Tool { name, args } => commands::tool::run(options, &name, &args),
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => commands::config::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
