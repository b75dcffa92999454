use concierge_core::config::LoadOptions;
use concierge_db::repositories::{
    SqlLoyaltyRepository, SqlRestaurantRepository, SqlVenueRepository,
};
use concierge_db::{DemoCatalog, SeedResult, VenueSeedResult};

use crate::bootstrap::{connect_database, BootstrapError};
use crate::commands::{async_runtime, load_config, CommandResult};

/// Loads the demo restaurant catalog, loyalty profiles, menus and events into SQLite.
pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_database(&config).await?;
        let restaurants = SqlRestaurantRepository::new(pool.clone());
        let loyalty = SqlLoyaltyRepository::new(pool.clone());
        let venues = SqlVenueRepository::new(pool.clone());
        let seeded = async {
            let catalog = DemoCatalog::load_into(&restaurants, &loyalty).await?;
            let venues = DemoCatalog::load_venues_into(&venues).await?;
            Ok::<_, BootstrapError>((catalog, venues))
        }
        .await;
        pool.close().await;
        seeded
    });

    match result {
        Ok((catalog, venues)) => CommandResult::success("seed", summary(&catalog, &venues)),
        Err(error) => CommandResult::bootstrap_failure("seed", &error),
    }
}

fn summary(catalog: &SeedResult, venues: &VenueSeedResult) -> String {
    format!(
        "demo catalog loaded: {} restaurants, {} loyalty profiles, {} menu items, {} events",
        catalog.restaurants_seeded,
        catalog.loyalty_profiles_seeded,
        venues.menu_items_seeded,
        venues.events_seeded
    )
}

#[cfg(test)]
mod tests {
    use concierge_db::{SeedResult, VenueSeedResult};

    #[test]
    fn summary_counts_every_table() {
        let catalog = SeedResult { restaurants_seeded: 14, loyalty_profiles_seeded: 4 };
        let venues = VenueSeedResult { menu_items_seeded: 20, events_seeded: 6 };
        assert_eq!(
            super::summary(&catalog, &venues),
            "demo catalog loaded: 14 restaurants, 4 loyalty profiles, 20 menu items, 6 events"
        );
    }
}
