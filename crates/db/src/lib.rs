pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoCatalog, SeedResult, VenueSeedResult};
pub use repositories::{
    CapacityStore, InMemoryCapacityStore, InMemoryLoyaltyRepository,
    InMemoryRestaurantRepository, InMemoryVenueRepository, LoyaltyRepository, RepositoryError,
    RestaurantRepository, SqlCapacityStore, SqlLoyaltyRepository, SqlRestaurantRepository,
    SqlVenueRepository, VenueRepository,
};
