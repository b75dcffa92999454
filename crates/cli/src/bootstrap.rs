use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use concierge_agent::audit::TracingAuditSink;
use concierge_agent::llm::HttpCompletionClient;
use concierge_agent::planner::{
    CompletionPlanner, IntentGuard, Planner, RestaurantDirectory, RulePlanner,
};
use concierge_agent::prompts::PromptError;
use concierge_agent::responses::ResponseError;
use concierge_agent::tools::notify::LogNotifier;
use concierge_agent::tools::{ToolDependencies, ToolRegistry};
use concierge_agent::AgentRuntime;
use concierge_core::config::{AppConfig, ConfigError, LogFormat, PlannerKind, StoreBackend};
use concierge_core::dialogue::DialogueMachine;
use concierge_db::repositories::{
    CapacityStore, InMemoryCapacityStore, InMemoryLoyaltyRepository, InMemoryRestaurantRepository,
    InMemoryVenueRepository, LoyaltyRepository, RepositoryError, RestaurantRepository,
    SqlCapacityStore, SqlLoyaltyRepository, SqlRestaurantRepository, SqlVenueRepository,
    VenueRepository,
};
use concierge_db::{connect_with_settings, migrations, DbPool, DemoCatalog};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: Option<DbPool>,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("catalog load failed: {0}")]
    Catalog(#[from] RepositoryError),
    #[error("planner setup failed: {0}")]
    Planner(String),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Responses(#[from] ResponseError),
}

impl BootstrapError {
    /// Error class and exit code used by the CLI's JSON envelope.
    pub fn classify(&self) -> (&'static str, u8) {
        match self {
            Self::Config(_) => ("config_validation", 2),
            Self::DatabaseConnect(_) => ("db_connectivity", 4),
            Self::Migration(_) => ("migration", 5),
            Self::Catalog(_) => ("catalog", 5),
            Self::Planner(_) | Self::Prompt(_) | Self::Responses(_) => ("runtime_init", 3),
        }
    }
}

pub fn init_logging(config: &AppConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    // Logs go to stderr so stdout stays reserved for replies.
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (e.g. in tests) is ignored.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

struct Stores {
    restaurants: Arc<dyn RestaurantRepository>,
    capacity: Arc<dyn CapacityStore>,
    loyalty: Arc<dyn LoyaltyRepository>,
    venues: Arc<dyn VenueRepository>,
    pool: Option<DbPool>,
}

pub async fn connect_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );
    Ok(pool)
}

async fn open_stores(config: &AppConfig) -> Result<Stores, BootstrapError> {
    let stores = match config.database.backend {
        StoreBackend::Memory => {
            let restaurants: Arc<dyn RestaurantRepository> =
                Arc::new(InMemoryRestaurantRepository::default());
            Stores {
                capacity: Arc::new(InMemoryCapacityStore::new(restaurants.clone())),
                restaurants,
                loyalty: Arc::new(InMemoryLoyaltyRepository::default()),
                venues: Arc::new(InMemoryVenueRepository::default()),
                pool: None,
            }
        }
        StoreBackend::Sqlite => {
            let pool = connect_database(config).await?;
            Stores {
                restaurants: Arc::new(SqlRestaurantRepository::new(pool.clone())),
                capacity: Arc::new(SqlCapacityStore::new(pool.clone())),
                loyalty: Arc::new(SqlLoyaltyRepository::new(pool.clone())),
                venues: Arc::new(SqlVenueRepository::new(pool.clone())),
                pool: Some(pool),
            }
        }
    };

    if stores.restaurants.list_all().await?.is_empty() {
        let seeded =
            DemoCatalog::load_into(stores.restaurants.as_ref(), stores.loyalty.as_ref()).await?;
        let venues = DemoCatalog::load_venues_into(stores.venues.as_ref()).await?;
        info!(
            event_name = "system.bootstrap.catalog_seeded",
            restaurants = seeded.restaurants_seeded,
            loyalty_profiles = seeded.loyalty_profiles_seeded,
            menu_items = venues.menu_items_seeded,
            events = venues.events_seeded,
            correlation_id = "bootstrap",
            "demo catalog loaded"
        );
    }
    Ok(stores)
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        backend = ?config.database.backend,
        planner = ?config.dialogue.planner,
        correlation_id = "bootstrap",
        "starting concierge bootstrap"
    );
    let stores = open_stores(&config).await?;

    let schema = config.dialogue.schema_registry();
    let machine = DialogueMachine::new(schema.clone(), config.dialogue.dependency_table()?);
    let directory = RestaurantDirectory::from_restaurants(&stores.restaurants.list_all().await?);
    let guard = IntentGuard::new(config.dialogue.intent_switch_threshold);

    let planner: Arc<dyn Planner> = match config.dialogue.planner {
        PlannerKind::Rules => Arc::new(RulePlanner::new(directory, schema, guard)),
        PlannerKind::Llm => {
            let client = HttpCompletionClient::from_config(&config.llm)
                .map_err(|error| BootstrapError::Planner(error.to_string()))?;
            Arc::new(
                CompletionPlanner::new(client, schema, directory, guard)?
                    .with_history_window(config.dialogue.history_window)
                    .with_timeout(config.llm.timeout())
                    .with_max_tokens(config.llm.max_tokens),
            )
        }
    };

    let registry = ToolRegistry::standard(ToolDependencies {
        capacity: stores.capacity,
        restaurants: stores.restaurants,
        loyalty: stores.loyalty,
        venues: stores.venues,
        notifier: Arc::new(LogNotifier),
    });
    let runtime = AgentRuntime::builder(planner, Arc::new(registry))
        .machine(machine)
        .audit_sink(Arc::new(TracingAuditSink))
        .dialogue_config(&config.dialogue)
        .build()?;

    info!(
        event_name = "system.bootstrap.ready",
        planner = runtime.planner_name(),
        correlation_id = "bootstrap",
        "concierge runtime ready"
    );
    Ok(Application { config, db_pool: stores.pool, runtime })
}
