use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::task::JoinSet;

use concierge_core::domain::reservation::{
    CancelOutcome, CapacityKey, OperationKey, ReservationStatus, ReserveOutcome, ReserveRequest,
};
use concierge_core::domain::restaurant::RestaurantId;
use concierge_db::{
    connect_with_settings, migrations, CapacityStore, DemoCatalog, InMemoryCapacityStore,
    InMemoryLoyaltyRepository, InMemoryRestaurantRepository, RepositoryError, SqlCapacityStore,
    SqlLoyaltyRepository, SqlRestaurantRepository,
};

type TestResult<T> = Result<T, String>;

const TOTAL_SEATS: u32 = 6;

fn key() -> CapacityKey {
    CapacityKey::new(
        RestaurantId("karims-delhi".to_string()),
        NaiveDate::from_ymd_opt(2026, 10, 20).expect("date"),
        NaiveTime::from_hms_opt(20, 0, 0).expect("time"),
    )
}

fn request(party_size: u32, token: Option<String>) -> ReserveRequest {
    ReserveRequest {
        key: key(),
        party_size,
        customer_name: Some("Guest".to_string()),
        idempotency_key: token.map(OperationKey),
    }
}

async fn memory_store() -> TestResult<Arc<dyn CapacityStore>> {
    let restaurants = Arc::new(InMemoryRestaurantRepository::default());
    let loyalty = InMemoryLoyaltyRepository::default();
    DemoCatalog::load_into(restaurants.as_ref(), &loyalty)
        .await
        .map_err(|error| error.to_string())?;
    let store = InMemoryCapacityStore::new(restaurants);
    store.seed_slot(key(), TOTAL_SEATS, 0).await;
    Ok(Arc::new(store))
}

async fn sqlite_store(dir: &tempfile::TempDir) -> TestResult<Arc<dyn CapacityStore>> {
    let url = format!("sqlite://{}", dir.path().join("concierge.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.map_err(|error| error.to_string())?;
    migrations::run_pending(&pool).await.map_err(|error| error.to_string())?;
    DemoCatalog::load_into(
        &SqlRestaurantRepository::new(pool.clone()),
        &SqlLoyaltyRepository::new(pool.clone()),
    )
    .await
    .map_err(|error| error.to_string())?;
    sqlx::query(
        "INSERT INTO capacity_slot
             (restaurant_id, slot_date, slot_time, total_seats, seats_reserved)
         VALUES ('karims-delhi', '2026-10-20', '20:00', ?, 0)",
    )
    .bind(i64::from(TOTAL_SEATS))
    .execute(&pool)
    .await
    .map_err(|error| error.to_string())?;
    Ok(Arc::new(SqlCapacityStore::new(pool)))
}

async fn assert_concurrent_reserves_never_oversell(
    store: Arc<dyn CapacityStore>,
) -> TestResult<()> {
    let mut tasks = JoinSet::new();
    for _ in 0..12 {
        let store = Arc::clone(&store);
        tasks.spawn(async move { store.reserve(request(2, None)).await });
    }

    let mut confirmed = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(|error| error.to_string())?.map_err(|error| error.to_string())? {
            ReserveOutcome::Confirmed(_) => confirmed += 1,
            ReserveOutcome::CapacityExceeded { .. } => rejected += 1,
        }
    }

    assert_eq!(confirmed, 3);
    assert_eq!(rejected, 9);

    let slot = store.capacity(&key()).await.map_err(|error| error.to_string())?;
    let records = store.list_reservations(&key()).await.map_err(|error| error.to_string())?;
    let booked: u32 = records
        .iter()
        .filter(|record| record.status == ReservationStatus::Confirmed)
        .map(|record| record.party_size)
        .sum();
    assert_eq!(slot.seats_reserved, TOTAL_SEATS);
    assert_eq!(booked, slot.seats_reserved);
    Ok(())
}

async fn assert_replay_and_cancel_are_idempotent(store: Arc<dyn CapacityStore>) -> TestResult<()> {
    let token = Some("booking-token-1".to_string());
    let first = store.reserve(request(4, token.clone())).await.map_err(|error| error.to_string())?;
    let replay = store.reserve(request(4, token)).await.map_err(|error| error.to_string())?;
    assert_eq!(first, replay);

    let ReserveOutcome::Confirmed(record) = first else {
        return Err("expected a confirmed reservation".to_string());
    };
    assert_eq!(store.check_availability(&key()).await.map_err(|error| error.to_string())?, 2);

    let cancelled = store.cancel(&record.id).await.map_err(|error| error.to_string())?;
    assert!(matches!(cancelled, CancelOutcome::Cancelled(_)));
    let seats_after_first =
        store.check_availability(&key()).await.map_err(|error| error.to_string())?;

    let again = store.cancel(&record.id).await.map_err(|error| error.to_string())?;
    assert!(matches!(again, CancelOutcome::AlreadyCancelled(_)));
    assert_eq!(again.record().status, ReservationStatus::Cancelled);
    let seats_after_second =
        store.check_availability(&key()).await.map_err(|error| error.to_string())?;

    assert_eq!(seats_after_first, TOTAL_SEATS);
    assert_eq!(seats_after_first, seats_after_second);
    Ok(())
}

async fn assert_cancelled_token_is_not_replayed(store: Arc<dyn CapacityStore>) -> TestResult<()> {
    let token = Some("booking-token-2".to_string());
    let ReserveOutcome::Confirmed(record) =
        store.reserve(request(4, token.clone())).await.map_err(|error| error.to_string())?
    else {
        return Err("expected a confirmed reservation".to_string());
    };
    store.cancel(&record.id).await.map_err(|error| error.to_string())?;

    let reused = store.reserve(request(4, token)).await;

    assert!(
        matches!(reused, Err(RepositoryError::TokenReused(ref id)) if *id == record.id),
        "{reused:?}"
    );
    let slot = store.capacity(&key()).await.map_err(|error| error.to_string())?;
    assert_eq!(slot.seats_reserved, 0);
    let records = store.list_reservations(&key()).await.map_err(|error| error.to_string())?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ReservationStatus::Cancelled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_never_oversells_under_contention() -> TestResult<()> {
    assert_concurrent_reserves_never_oversell(memory_store().await?).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_store_never_oversells_under_contention() -> TestResult<()> {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    assert_concurrent_reserves_never_oversell(sqlite_store(&dir).await?).await
}

#[tokio::test]
async fn memory_store_replay_and_cancel_are_idempotent() -> TestResult<()> {
    assert_replay_and_cancel_are_idempotent(memory_store().await?).await
}

#[tokio::test]
async fn sqlite_store_replay_and_cancel_are_idempotent() -> TestResult<()> {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    assert_replay_and_cancel_are_idempotent(sqlite_store(&dir).await?).await
}

#[tokio::test]
async fn memory_store_refuses_token_of_cancelled_reservation() -> TestResult<()> {
    assert_cancelled_token_is_not_replayed(memory_store().await?).await
}

#[tokio::test]
async fn sqlite_store_refuses_token_of_cancelled_reservation() -> TestResult<()> {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    assert_cancelled_token_is_not_replayed(sqlite_store(&dir).await?).await
}
