use chrono::NaiveDate;

use concierge_core::domain::loyalty::{LoyaltyProfile, LoyaltyTier};
use concierge_core::domain::restaurant::{Restaurant, RestaurantId};
use concierge_core::domain::venue::{MenuItem, VenueEvent};

use crate::repositories::{
    LoyaltyRepository, RepositoryError, RestaurantRepository, VenueRepository,
};

struct RestaurantSeed {
    id: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
    cuisine: &'static str,
    city: &'static str,
    neighborhood: &'static str,
    price_label: &'static str,
    avg_price_inr: u32,
    rating: f32,
    capacity: u32,
    veg_only: bool,
}

/// Deterministic catalog across five cities, used by the CLI demo and tests.
const RESTAURANTS: &[RestaurantSeed] = &[
    RestaurantSeed {
        id: "karims-delhi",
        name: "Karim's",
        aliases: &["karims", "karim"],
        cuisine: "Mughlai",
        city: "Delhi",
        neighborhood: "Chandni Chowk",
        price_label: "Mid",
        avg_price_inr: 700,
        rating: 4.5,
        capacity: 40,
        veg_only: false,
    },
    RestaurantSeed {
        id: "bukhara-delhi",
        name: "Bukhara",
        aliases: &[],
        cuisine: "North Indian",
        city: "Delhi",
        neighborhood: "Chanakyapuri",
        price_label: "Premium",
        avg_price_inr: 3500,
        rating: 4.7,
        capacity: 60,
        veg_only: false,
    },
    RestaurantSeed {
        id: "saravana-bhavan-delhi",
        name: "Saravana Bhavan",
        aliases: &["saravana"],
        cuisine: "South Indian",
        city: "Delhi",
        neighborhood: "Connaught Place",
        price_label: "Budget",
        avg_price_inr: 400,
        rating: 4.3,
        capacity: 80,
        veg_only: true,
    },
    RestaurantSeed {
        id: "gulati-delhi",
        name: "Gulati",
        aliases: &[],
        cuisine: "Punjabi",
        city: "Delhi",
        neighborhood: "Pandara Road",
        price_label: "Mid",
        avg_price_inr: 1500,
        rating: 4.4,
        capacity: 50,
        veg_only: false,
    },
    RestaurantSeed {
        id: "trishna-mumbai",
        name: "Trishna",
        aliases: &[],
        cuisine: "Seafood",
        city: "Mumbai",
        neighborhood: "Fort",
        price_label: "Premium",
        avg_price_inr: 2500,
        rating: 4.6,
        capacity: 35,
        veg_only: false,
    },
    RestaurantSeed {
        id: "britannia-mumbai",
        name: "Britannia & Co",
        aliases: &["britannia"],
        cuisine: "Parsi",
        city: "Mumbai",
        neighborhood: "Ballard Estate",
        price_label: "Mid",
        avg_price_inr: 900,
        rating: 4.4,
        capacity: 30,
        veg_only: false,
    },
    RestaurantSeed {
        id: "sardar-pav-bhaji-mumbai",
        name: "Sardar Pav Bhaji",
        aliases: &["sardar"],
        cuisine: "Mumbai Style",
        city: "Mumbai",
        neighborhood: "Tardeo",
        price_label: "Budget",
        avg_price_inr: 300,
        rating: 4.2,
        capacity: 45,
        veg_only: true,
    },
    RestaurantSeed {
        id: "gomantak-mumbai",
        name: "Gomantak",
        aliases: &[],
        cuisine: "Goan",
        city: "Mumbai",
        neighborhood: "Dadar",
        price_label: "Budget",
        avg_price_inr: 600,
        rating: 4.3,
        capacity: 25,
        veg_only: false,
    },
    RestaurantSeed {
        id: "6-ballygunge-kolkata",
        name: "6 Ballygunge Place",
        aliases: &["ballygunge place"],
        cuisine: "Bengali",
        city: "Kolkata",
        neighborhood: "Ballygunge",
        price_label: "Mid",
        avg_price_inr: 1200,
        rating: 4.5,
        capacity: 70,
        veg_only: false,
    },
    RestaurantSeed {
        id: "peter-cat-kolkata",
        name: "Peter Cat",
        aliases: &["petercat"],
        cuisine: "Continental",
        city: "Kolkata",
        neighborhood: "Park Street",
        price_label: "Mid",
        avg_price_inr: 1400,
        rating: 4.4,
        capacity: 55,
        veg_only: false,
    },
    RestaurantSeed {
        id: "mtr-bengaluru",
        name: "Mavalli Tiffin Rooms",
        aliases: &["mtr"],
        cuisine: "South Indian",
        city: "Bengaluru",
        neighborhood: "Lalbagh Road",
        price_label: "Budget",
        avg_price_inr: 350,
        rating: 4.6,
        capacity: 90,
        veg_only: true,
    },
    RestaurantSeed {
        id: "meghana-bengaluru",
        name: "Meghana Foods",
        aliases: &["meghana"],
        cuisine: "Andhra",
        city: "Bengaluru",
        neighborhood: "Koramangala",
        price_label: "Mid",
        avg_price_inr: 800,
        rating: 4.4,
        capacity: 65,
        veg_only: false,
    },
    RestaurantSeed {
        id: "vaishali-pune",
        name: "Vaishali",
        aliases: &[],
        cuisine: "South Indian",
        city: "Pune",
        neighborhood: "FC Road",
        price_label: "Budget",
        avg_price_inr: 350,
        rating: 4.3,
        capacity: 75,
        veg_only: true,
    },
    RestaurantSeed {
        id: "malaka-spice-pune",
        name: "Malaka Spice",
        aliases: &["malaka"],
        cuisine: "Fusion",
        city: "Pune",
        neighborhood: "Koregaon Park",
        price_label: "Premium",
        avg_price_inr: 1800,
        rating: 4.5,
        capacity: 50,
        veg_only: false,
    },
];

struct LoyaltySeed {
    phone: &'static str,
    name: &'static str,
    tier: LoyaltyTier,
    favorite_cuisine: Option<&'static str>,
    preferred_city: Option<&'static str>,
}

const LOYALTY_PROFILES: &[LoyaltySeed] = &[
    LoyaltySeed {
        phone: "9810012345",
        name: "Vikram Sethi",
        tier: LoyaltyTier::Gold,
        favorite_cuisine: Some("Mughlai"),
        preferred_city: Some("Delhi"),
    },
    LoyaltySeed {
        phone: "9820012345",
        name: "Asha Rao",
        tier: LoyaltyTier::Platinum,
        favorite_cuisine: Some("Goan"),
        preferred_city: Some("Mumbai"),
    },
    LoyaltySeed {
        phone: "9830012345",
        name: "Ritwik Ghosh",
        tier: LoyaltyTier::Silver,
        favorite_cuisine: Some("Bengali"),
        preferred_city: Some("Kolkata"),
    },
    LoyaltySeed {
        phone: "9845012345",
        name: "Meera Iyer",
        tier: LoyaltyTier::Gold,
        favorite_cuisine: None,
        preferred_city: Some("Bengaluru"),
    },
];

/// (restaurant, dish, category, price in INR, signature)
const MENU: &[(&str, &str, &str, u32, bool)] = &[
    ("karims-delhi", "Mutton Burra", "Main", 520, true),
    ("karims-delhi", "Chicken Jahangiri", "Main", 380, true),
    ("karims-delhi", "Mutton Korma", "Main", 340, false),
    ("karims-delhi", "Khamiri Roti", "Bread", 30, false),
    ("karims-delhi", "Phirni", "Dessert", 90, false),
    ("bukhara-delhi", "Dal Bukhara", "Main", 1250, true),
    ("bukhara-delhi", "Sikandari Raan", "Main", 2950, true),
    ("bukhara-delhi", "Naan Bukhara", "Bread", 450, false),
    ("bukhara-delhi", "Kulfi", "Dessert", 550, false),
    ("trishna-mumbai", "Butter Garlic Crab", "Main", 1800, true),
    ("trishna-mumbai", "Koliwada Prawns", "Starter", 750, false),
    ("britannia-mumbai", "Berry Pulav", "Main", 650, true),
    ("britannia-mumbai", "Caramel Custard", "Dessert", 200, false),
    ("peter-cat-kolkata", "Chelo Kebab", "Main", 520, true),
    ("peter-cat-kolkata", "Sizzling Brownie", "Dessert", 280, false),
    ("mtr-bengaluru", "Rava Idli", "Breakfast", 90, true),
    ("mtr-bengaluru", "Masala Dosa", "Breakfast", 110, true),
    ("mtr-bengaluru", "Chandrahara", "Dessert", 80, false),
    ("vaishali-pune", "SPDP", "Snack", 120, true),
    ("vaishali-pune", "Filter Coffee", "Beverage", 60, false),
];

struct EventSeed {
    id: &'static str,
    restaurant: &'static str,
    name: &'static str,
    date: (i32, u32, u32),
    description: &'static str,
}

const EVENTS: &[EventSeed] = &[
    EventSeed {
        id: "evt-karims-food-walk",
        restaurant: "karims-delhi",
        name: "Old Delhi Food Walk",
        date: (2026, 10, 24),
        description: "Guided walk ending with a tasting platter.",
    },
    EventSeed {
        id: "evt-bukhara-raan",
        restaurant: "bukhara-delhi",
        name: "Raan Carving Night",
        date: (2026, 11, 1),
        description: "Chef-led carving at the table.",
    },
    EventSeed {
        id: "evt-britannia-parsi",
        restaurant: "britannia-mumbai",
        name: "Parsi New Year Lunch",
        date: (2026, 11, 8),
        description: "Set menu of Parsi classics.",
    },
    EventSeed {
        id: "evt-peter-cat-jazz",
        restaurant: "peter-cat-kolkata",
        name: "Park Street Jazz Evening",
        date: (2026, 11, 14),
        description: "Live trio from 8 pm.",
    },
    EventSeed {
        id: "evt-mtr-dosa",
        restaurant: "mtr-bengaluru",
        name: "Dosa Masterclass",
        date: (2026, 12, 5),
        description: "Batter to crisp in ninety minutes.",
    },
    EventSeed {
        id: "evt-malaka-nye",
        restaurant: "malaka-spice-pune",
        name: "New Year's Eve Buffet",
        date: (2026, 12, 31),
        description: "Pan-Asian buffet and countdown.",
    },
];

pub struct DemoCatalog;

impl DemoCatalog {
    pub fn restaurants() -> Vec<Restaurant> {
        RESTAURANTS
            .iter()
            .map(|seed| Restaurant {
                id: RestaurantId(seed.id.to_string()),
                name: seed.name.to_string(),
                aliases: seed.aliases.iter().map(|alias| alias.to_string()).collect(),
                cuisine: seed.cuisine.to_string(),
                city: seed.city.to_string(),
                neighborhood: seed.neighborhood.to_string(),
                price_label: seed.price_label.to_string(),
                avg_price_inr: seed.avg_price_inr,
                rating: seed.rating,
                capacity: seed.capacity,
                veg_only: seed.veg_only,
            })
            .collect()
    }

    pub fn loyalty_profiles() -> Vec<LoyaltyProfile> {
        LOYALTY_PROFILES
            .iter()
            .map(|seed| LoyaltyProfile {
                phone: seed.phone.to_string(),
                name: seed.name.to_string(),
                tier: seed.tier,
                favorite_cuisine: seed.favorite_cuisine.map(str::to_string),
                preferred_city: seed.preferred_city.map(str::to_string),
            })
            .collect()
    }

    pub fn menu_items() -> Vec<MenuItem> {
        MENU.iter()
            .map(|(restaurant, name, category, price_inr, signature)| MenuItem {
                restaurant_id: RestaurantId(restaurant.to_string()),
                name: name.to_string(),
                category: category.to_string(),
                price_inr: *price_inr,
                signature: *signature,
            })
            .collect()
    }

    pub fn events() -> Vec<VenueEvent> {
        EVENTS
            .iter()
            .filter_map(|seed| {
                let (year, month, day) = seed.date;
                Some(VenueEvent {
                    id: seed.id.to_string(),
                    restaurant_id: RestaurantId(seed.restaurant.to_string()),
                    name: seed.name.to_string(),
                    date: NaiveDate::from_ymd_opt(year, month, day)?,
                    description: seed.description.to_string(),
                })
            })
            .collect()
    }

    /// Upserts the catalog; loading twice leaves the same rows.
    pub async fn load_into(
        restaurants: &dyn RestaurantRepository,
        loyalty: &dyn LoyaltyRepository,
    ) -> Result<SeedResult, RepositoryError> {
        let mut result = SeedResult::default();
        for restaurant in Self::restaurants() {
            restaurants.save(restaurant).await?;
            result.restaurants_seeded += 1;
        }
        for profile in Self::loyalty_profiles() {
            loyalty.save(profile).await?;
            result.loyalty_profiles_seeded += 1;
        }
        Ok(result)
    }

    /// Menus and events; the restaurants they reference must already be loaded.
    pub async fn load_venues_into(
        venues: &dyn VenueRepository,
    ) -> Result<VenueSeedResult, RepositoryError> {
        let mut result = VenueSeedResult::default();
        for item in Self::menu_items() {
            venues.save_menu_item(item).await?;
            result.menu_items_seeded += 1;
        }
        for event in Self::events() {
            venues.save_event(event).await?;
            result.events_seeded += 1;
        }
        Ok(result)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VenueSeedResult {
    pub menu_items_seeded: usize,
    pub events_seeded: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub restaurants_seeded: usize,
    pub loyalty_profiles_seeded: usize,
}
