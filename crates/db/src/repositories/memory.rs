use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use concierge_core::domain::loyalty::LoyaltyProfile;
use concierge_core::domain::reservation::{
    CancelOutcome, CapacityKey, CapacitySlot, ReservationId, ReservationRecord, ReservationStatus,
    ReserveOutcome, ReserveRequest,
};
use concierge_core::domain::restaurant::{
    discovery_order, Restaurant, RestaurantFilter, RestaurantId,
};

use concierge_core::domain::venue::{Feedback, MenuItem, VenueEvent};

use super::{
    CapacityStore, LoyaltyRepository, RepositoryError, RestaurantRepository, VenueRepository,
};

#[derive(Default)]
pub struct InMemoryRestaurantRepository {
    restaurants: RwLock<HashMap<String, Restaurant>>,
}

impl InMemoryRestaurantRepository {
    pub fn with_restaurants(restaurants: impl IntoIterator<Item = Restaurant>) -> Self {
        let restaurants = restaurants
            .into_iter()
            .map(|restaurant| (restaurant.id.0.clone(), restaurant))
            .collect::<HashMap<_, _>>();
        Self { restaurants: RwLock::new(restaurants) }
    }
}

#[async_trait]
impl RestaurantRepository for InMemoryRestaurantRepository {
    async fn find_by_id(&self, id: &RestaurantId) -> Result<Option<Restaurant>, RepositoryError> {
        let restaurants = self.restaurants.read().await;
        Ok(restaurants.get(&id.0).cloned())
    }

    async fn search(&self, filter: &RestaurantFilter) -> Result<Vec<Restaurant>, RepositoryError> {
        let restaurants = self.restaurants.read().await;
        let mut matches = restaurants
            .values()
            .filter(|restaurant| filter.matches(restaurant))
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(discovery_order);
        Ok(matches)
    }

    async fn list_all(&self) -> Result<Vec<Restaurant>, RepositoryError> {
        let restaurants = self.restaurants.read().await;
        let mut all = restaurants.values().cloned().collect::<Vec<_>>();
        all.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(all)
    }

    async fn save(&self, restaurant: Restaurant) -> Result<(), RepositoryError> {
        let mut restaurants = self.restaurants.write().await;
        restaurants.insert(restaurant.id.0.clone(), restaurant);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLoyaltyRepository {
    profiles: RwLock<HashMap<String, LoyaltyProfile>>,
}

#[async_trait]
impl LoyaltyRepository for InMemoryLoyaltyRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<LoyaltyProfile>, RepositoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(phone).cloned())
    }

    async fn save(&self, profile: LoyaltyProfile) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.phone.clone(), profile);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVenueRepository {
    menu: RwLock<Vec<MenuItem>>,
    events: RwLock<HashMap<String, VenueEvent>>,
    feedback: RwLock<Vec<Feedback>>,
}

#[async_trait]
impl VenueRepository for InMemoryVenueRepository {
    async fn menu(
        &self,
        restaurant: &RestaurantId,
        category: Option<&str>,
    ) -> Result<Vec<MenuItem>, RepositoryError> {
        let menu = self.menu.read().await;
        let mut items: Vec<MenuItem> = menu
            .iter()
            .filter(|item| &item.restaurant_id == restaurant)
            .filter(|item| {
                category.map_or(true, |wanted| item.category.eq_ignore_ascii_case(wanted))
            })
            .cloned()
            .collect();
        items.sort_by(|left, right| {
            right
                .signature
                .cmp(&left.signature)
                .then(left.price_inr.cmp(&right.price_inr))
                .then_with(|| left.name.cmp(&right.name))
        });
        Ok(items)
    }

    async fn events_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<VenueEvent>, RepositoryError> {
        let events = self.events.read().await;
        let mut upcoming: Vec<VenueEvent> =
            events.values().filter(|event| (from..=until).contains(&event.date)).cloned().collect();
        upcoming.sort_by(|left, right| {
            left.date.cmp(&right.date).then_with(|| left.id.cmp(&right.id))
        });
        Ok(upcoming)
    }

    async fn record_feedback(&self, feedback: Feedback) -> Result<(), RepositoryError> {
        self.feedback.write().await.push(feedback);
        Ok(())
    }

    async fn feedback_for(
        &self,
        restaurant: &RestaurantId,
    ) -> Result<Vec<Feedback>, RepositoryError> {
        let feedback = self.feedback.read().await;
        Ok(feedback
            .iter()
            .rev()
            .filter(|entry| &entry.restaurant_id == restaurant)
            .cloned()
            .collect())
    }

    async fn save_menu_item(&self, item: MenuItem) -> Result<(), RepositoryError> {
        let mut menu = self.menu.write().await;
        match menu
            .iter_mut()
            .find(|existing| {
                existing.restaurant_id == item.restaurant_id && existing.name == item.name
            })
        {
            Some(existing) => *existing = item,
            None => menu.push(item),
        }
        Ok(())
    }

    async fn save_event(&self, event: VenueEvent) -> Result<(), RepositoryError> {
        self.events.write().await.insert(event.id.clone(), event);
        Ok(())
    }
}

#[derive(Default)]
struct ReservationLedger {
    records: HashMap<ReservationId, ReservationRecord>,
    by_token: HashMap<String, ReservationId>,
}

impl ReservationLedger {
    fn by_token(&self, token: &str) -> Option<&ReservationRecord> {
        self.by_token.get(token).and_then(|id| self.records.get(id))
    }
}

/// Process-local capacity store.
///
/// Each key owns an async mutex around its [`CapacitySlot`]. Lock order is
/// always slot then ledger, and the slot lock is held until the reservation
/// record has been written.
pub struct InMemoryCapacityStore {
    restaurants: Arc<dyn RestaurantRepository>,
    slots: RwLock<HashMap<CapacityKey, Arc<Mutex<CapacitySlot>>>>,
    ledger: RwLock<ReservationLedger>,
}

impl InMemoryCapacityStore {
    pub fn new(restaurants: Arc<dyn RestaurantRepository>) -> Self {
        Self { restaurants, slots: RwLock::new(HashMap::new()), ledger: RwLock::default() }
    }

    /// Pins the seat counters of one key, replacing any lazily created slot.
    pub async fn seed_slot(&self, key: CapacityKey, total_seats: u32, seats_reserved: u32) {
        let slot = CapacitySlot {
            key: key.clone(),
            total_seats,
            seats_reserved: seats_reserved.min(total_seats),
        };
        let mut slots = self.slots.write().await;
        slots.insert(key, Arc::new(Mutex::new(slot)));
    }

    async fn slot_for(
        &self,
        key: &CapacityKey,
    ) -> Result<Arc<Mutex<CapacitySlot>>, RepositoryError> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Ok(Arc::clone(slot));
        }

        let restaurant = self
            .restaurants
            .find_by_id(&key.restaurant_id)
            .await?
            .ok_or_else(|| RepositoryError::UnknownRestaurant(key.restaurant_id.clone()))?;

        let mut slots = self.slots.write().await;
        let slot = slots.entry(key.clone()).or_insert_with(|| {
            debug!(
                event_name = "store.capacity_slot_created",
                key = %key,
                total_seats = restaurant.capacity,
                "capacity slot created lazily"
            );
            Arc::new(Mutex::new(CapacitySlot::new(key.clone(), restaurant.capacity)))
        });
        Ok(Arc::clone(slot))
    }
}

#[async_trait]
impl CapacityStore for InMemoryCapacityStore {
    async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome, RepositoryError> {
        let slot = self.slot_for(&request.key).await?;
        let mut slot = slot.lock().await;

        if let Some(token) = &request.idempotency_key {
            if let Some(existing) = self.ledger.read().await.by_token(&token.0) {
                return replay(existing);
            }
        }

        if !slot.try_reserve(request.party_size) {
            return Ok(ReserveOutcome::CapacityExceeded { seats_available: slot.seats_available() });
        }

        let mut ledger = self.ledger.write().await;
        if let Some(token) = &request.idempotency_key {
            if let Some(existing) = ledger.by_token(&token.0) {
                slot.release(request.party_size);
                return replay(existing);
            }
        }

        let now = Utc::now();
        let record = ReservationRecord {
            id: ReservationId::generate(),
            restaurant_id: request.key.restaurant_id.clone(),
            date: request.key.date,
            time: request.key.time,
            party_size: request.party_size,
            customer_name: request.customer_name,
            status: ReservationStatus::Confirmed,
            idempotency_key: request.idempotency_key,
            created_at: now,
            updated_at: now,
        };
        if let Some(token) = &record.idempotency_key {
            ledger.by_token.insert(token.0.clone(), record.id.clone());
        }
        ledger.records.insert(record.id.clone(), record.clone());

        Ok(ReserveOutcome::Confirmed(record))
    }

    async fn cancel(&self, id: &ReservationId) -> Result<CancelOutcome, RepositoryError> {
        let key = {
            let ledger = self.ledger.read().await;
            ledger
                .records
                .get(id)
                .map(ReservationRecord::key)
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))?
        };

        let slot = self.slot_for(&key).await?;
        let mut slot = slot.lock().await;
        let mut ledger = self.ledger.write().await;
        let record =
            ledger.records.get_mut(id).ok_or_else(|| RepositoryError::NotFound(id.clone()))?;

        if record.status == ReservationStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled(record.clone()));
        }

        slot.release(record.party_size);
        record.status = ReservationStatus::Cancelled;
        record.updated_at = Utc::now();
        Ok(CancelOutcome::Cancelled(record.clone()))
    }

    async fn check_availability(&self, key: &CapacityKey) -> Result<u32, RepositoryError> {
        let slot = self.slot_for(key).await?;
        let slot = slot.lock().await;
        Ok(slot.seats_available())
    }

    async fn capacity(&self, key: &CapacityKey) -> Result<CapacitySlot, RepositoryError> {
        let slot = self.slot_for(key).await?;
        let slot = slot.lock().await;
        Ok(slot.clone())
    }

    async fn find_reservation(
        &self,
        id: &ReservationId,
    ) -> Result<Option<ReservationRecord>, RepositoryError> {
        Ok(self.ledger.read().await.records.get(id).cloned())
    }

    async fn list_reservations(
        &self,
        key: &CapacityKey,
    ) -> Result<Vec<ReservationRecord>, RepositoryError> {
        let ledger = self.ledger.read().await;
        let mut records = ledger
            .records
            .values()
            .filter(|record| &record.key() == key)
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(records)
    }
}

/// A token only stands for a reservation that still holds its seats.
fn replay(existing: &ReservationRecord) -> Result<ReserveOutcome, RepositoryError> {
    if existing.status == ReservationStatus::Confirmed {
        Ok(ReserveOutcome::Confirmed(existing.clone()))
    } else {
        Err(RepositoryError::TokenReused(existing.id.clone()))
    }
}
