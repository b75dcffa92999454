use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use tracing::{debug, warn};

use concierge_core::domain::reservation::{
    CancelOutcome, CapacityKey, CapacitySlot, OperationKey, ReservationId, ReservationRecord,
    ReservationStatus, ReserveOutcome, ReserveRequest,
};
use concierge_core::domain::restaurant::RestaurantId;

use super::{parse_u32, CapacityStore, RepositoryError};
use crate::DbPool;

pub(super) const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

const RESERVATION_COLUMNS: &str = "id, restaurant_id, slot_date, slot_time, party_size, \
     customer_name, status, idempotency_key, created_at, updated_at";

/// SQLite-backed seat ledger.
///
/// Every reserve runs in one transaction whose first statement is a write, so
/// SQLite holds the database write lock for the whole check-and-increment.
pub struct SqlCapacityStore {
    pool: DbPool,
}

impl SqlCapacityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CapacityStore for SqlCapacityStore {
    async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (date, time) = encode_key(&request.key);

        sqlx::query(
            r#"
            INSERT INTO capacity_slot
                (restaurant_id, slot_date, slot_time, total_seats, seats_reserved)
            SELECT id, ?, ?, capacity, 0 FROM restaurant WHERE id = ?
            ON CONFLICT(restaurant_id, slot_date, slot_time) DO NOTHING
            "#,
        )
        .bind(&date)
        .bind(&time)
        .bind(&request.key.restaurant_id.0)
        .execute(&mut *tx)
        .await?;

        let Some(slot) = load_slot(&mut tx, &request.key).await? else {
            return Err(RepositoryError::UnknownRestaurant(request.key.restaurant_id.clone()));
        };

        if let Some(token) = &request.idempotency_key {
            let existing = sqlx::query(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservation WHERE idempotency_key = ?"
            ))
            .bind(&token.0)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = existing {
                let record = reservation_from_row(&row)?;
                tx.commit().await?;
                if record.status != ReservationStatus::Confirmed {
                    warn!(
                        event_name = "store.reserve_token_reused",
                        reservation_id = %record.id,
                        status = record.status.as_str(),
                        "idempotency token matched a reservation that no longer holds seats"
                    );
                    return Err(RepositoryError::TokenReused(record.id));
                }
                debug!(
                    event_name = "store.reserve_replayed",
                    reservation_id = %record.id,
                    "idempotency token matched an existing reservation"
                );
                return Ok(ReserveOutcome::Confirmed(record));
            }
        }

        let updated = sqlx::query(
            r#"
            UPDATE capacity_slot
            SET seats_reserved = seats_reserved + ?
            WHERE restaurant_id = ? AND slot_date = ? AND slot_time = ?
              AND seats_reserved + ? <= total_seats
            "#,
        )
        .bind(i64::from(request.party_size))
        .bind(&request.key.restaurant_id.0)
        .bind(&date)
        .bind(&time)
        .bind(i64::from(request.party_size))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReserveOutcome::CapacityExceeded { seats_available: slot.seats_available() });
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

        sqlx::query(
            r#"
            INSERT INTO reservation (
                id, restaurant_id, slot_date, slot_time, party_size,
                customer_name, status, idempotency_key, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id.0)
        .bind(&record.restaurant_id.0)
        .bind(&date)
        .bind(&time)
        .bind(i64::from(record.party_size))
        .bind(record.customer_name.as_deref())
        .bind(record.status.as_str())
        .bind(record.idempotency_key.as_ref().map(|token| token.0.as_str()))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Confirmed(record))
    }

    async fn cancel(&self, id: &ReservationId) -> Result<CancelOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query(
            "UPDATE reservation SET status = 'cancelled', updated_at = ?
             WHERE id = ? AND status != 'cancelled'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        let row =
            sqlx::query(&format!("SELECT {RESERVATION_COLUMNS} FROM reservation WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        let record = reservation_from_row(&row)?;

        if changed.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(CancelOutcome::AlreadyCancelled(record));
        }

        let (date, time) = encode_key(&record.key());
        sqlx::query(
            r#"
            UPDATE capacity_slot
            SET seats_reserved = MAX(seats_reserved - ?, 0)
            WHERE restaurant_id = ? AND slot_date = ? AND slot_time = ?
            "#,
        )
        .bind(i64::from(record.party_size))
        .bind(&record.restaurant_id.0)
        .bind(&date)
        .bind(&time)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled(record))
    }

    async fn check_availability(&self, key: &CapacityKey) -> Result<u32, RepositoryError> {
        Ok(self.capacity(key).await?.seats_available())
    }

    async fn capacity(&self, key: &CapacityKey) -> Result<CapacitySlot, RepositoryError> {
        let (date, time) = encode_key(key);
        let row = sqlx::query(
            "SELECT total_seats, seats_reserved FROM capacity_slot
             WHERE restaurant_id = ? AND slot_date = ? AND slot_time = ?",
        )
        .bind(&key.restaurant_id.0)
        .bind(&date)
        .bind(&time)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return slot_from_row(key, &row);
        }

        // No booking yet: the slot starts at the restaurant's full capacity.
        let capacity: Option<i64> =
            sqlx::query_scalar("SELECT capacity FROM restaurant WHERE id = ?")
            .bind(&key.restaurant_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match capacity {
            Some(capacity) => Ok(CapacitySlot::new(key.clone(), parse_u32("capacity", capacity)?)),
            None => Err(RepositoryError::UnknownRestaurant(key.restaurant_id.clone())),
        }
    }

    async fn find_reservation(
        &self,
        id: &ReservationId,
    ) -> Result<Option<ReservationRecord>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {RESERVATION_COLUMNS} FROM reservation WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|value| reservation_from_row(&value)).transpose()
    }

    async fn list_reservations(
        &self,
        key: &CapacityKey,
    ) -> Result<Vec<ReservationRecord>, RepositoryError> {
        let (date, time) = encode_key(key);
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservation
             WHERE restaurant_id = ? AND slot_date = ? AND slot_time = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&key.restaurant_id.0)
        .bind(&date)
        .bind(&time)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reservation_from_row).collect()
    }
}

async fn load_slot(
    tx: &mut Transaction<'_, Sqlite>,
    key: &CapacityKey,
) -> Result<Option<CapacitySlot>, RepositoryError> {
    let (date, time) = encode_key(key);
    let row = sqlx::query(
        "SELECT total_seats, seats_reserved FROM capacity_slot
         WHERE restaurant_id = ? AND slot_date = ? AND slot_time = ?",
    )
    .bind(&key.restaurant_id.0)
    .bind(&date)
    .bind(&time)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|value| slot_from_row(key, &value)).transpose()
}

fn encode_key(key: &CapacityKey) -> (String, String) {
    (key.date.format(DATE_FORMAT).to_string(), key.time.format(TIME_FORMAT).to_string())
}

fn slot_from_row(key: &CapacityKey, row: &SqliteRow) -> Result<CapacitySlot, RepositoryError> {
    Ok(CapacitySlot {
        key: key.clone(),
        total_seats: parse_u32("total_seats", row.try_get("total_seats")?)?,
        seats_reserved: parse_u32("seats_reserved", row.try_get("seats_reserved")?)?,
    })
}

fn reservation_from_row(row: &SqliteRow) -> Result<ReservationRecord, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = ReservationStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown reservation status `{status}`")))?;

    Ok(ReservationRecord {
        id: ReservationId(row.try_get("id")?),
        restaurant_id: RestaurantId(row.try_get("restaurant_id")?),
        date: parse_date(row.try_get("slot_date")?)?,
        time: parse_time(row.try_get("slot_time")?)?,
        party_size: parse_u32("party_size", row.try_get("party_size")?)?,
        customer_name: row.try_get("customer_name")?,
        status,
        idempotency_key: row.try_get::<Option<String>, _>("idempotency_key")?.map(OperationKey),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_date(value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid slot_date `{value}` ({error})")))
}

fn parse_time(value: String) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(&value, TIME_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid slot_time `{value}` ({error})")))
}

pub(super) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use concierge_core::domain::reservation::{
        CancelOutcome, CapacityKey, OperationKey, ReservationStatus, ReserveOutcome,
        ReserveRequest,
    };
    use concierge_core::domain::restaurant::RestaurantId;

    use super::SqlCapacityStore;
    use crate::fixtures::DemoCatalog;
    use crate::repositories::{
        CapacityStore, RepositoryError, RestaurantRepository, SqlRestaurantRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    type TestResult<T> = Result<T, String>;

    async fn setup_pool() -> TestResult<DbPool> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .map_err(|error| format!("connect test pool: {error}"))?;
        migrations::run_pending(&pool).await.map_err(|error| format!("run migrations: {error}"))?;
        let restaurants = SqlRestaurantRepository::new(pool.clone());
        for restaurant in DemoCatalog::restaurants() {
            restaurants.save(restaurant).await.map_err(|error| error.to_string())?;
        }
        Ok(pool)
    }

    fn key() -> CapacityKey {
        CapacityKey::new(
            RestaurantId("karims-delhi".to_string()),
            NaiveDate::from_ymd_opt(2026, 10, 20).expect("date"),
            NaiveTime::from_hms_opt(20, 0, 0).expect("time"),
        )
    }

    async fn pin_capacity(pool: &DbPool, total: i64) -> TestResult<()> {
        sqlx::query(
            "INSERT INTO capacity_slot
                 (restaurant_id, slot_date, slot_time, total_seats, seats_reserved)
             VALUES ('karims-delhi', '2026-10-20', '20:00', ?, 0)",
        )
        .bind(total)
        .execute(pool)
        .await
        .map_err(|error| error.to_string())?;
        Ok(())
    }

    fn request(party_size: u32, token: Option<&str>) -> ReserveRequest {
        ReserveRequest {
            key: key(),
            party_size,
            customer_name: Some("Asha".to_string()),
            idempotency_key: token.map(|value| OperationKey(value.to_string())),
        }
    }

    #[tokio::test]
    async fn availability_defaults_to_restaurant_capacity() -> TestResult<()> {
        let pool = setup_pool().await?;
        let store = SqlCapacityStore::new(pool);
        let expected = DemoCatalog::restaurants()
            .into_iter()
            .find(|restaurant| restaurant.id.0 == "karims-delhi")
            .map(|restaurant| restaurant.capacity)
            .ok_or("karims missing from catalog")?;

        let available = store.check_availability(&key()).await.map_err(|error| error.to_string())?;

        assert_eq!(available, expected);
        Ok(())
    }

    #[tokio::test]
    async fn reserve_rejects_party_that_does_not_fit() -> TestResult<()> {
        let pool = setup_pool().await?;
        pin_capacity(&pool, 6).await?;
        let store = SqlCapacityStore::new(pool);

        let first = store.reserve(request(4, None)).await.map_err(|error| error.to_string())?;
        let ReserveOutcome::Confirmed(record) = first else {
            return Err("expected confirmation".to_string());
        };
        assert_eq!(record.status, ReservationStatus::Confirmed);

        let second = store.reserve(request(3, None)).await.map_err(|error| error.to_string())?;
        assert_eq!(second, ReserveOutcome::CapacityExceeded { seats_available: 2 });

        let slot = store.capacity(&key()).await.map_err(|error| error.to_string())?;
        assert_eq!(slot.seats_reserved, 4);
        let stored = store.find_reservation(&record.id).await.map_err(|error| error.to_string())?;
        assert_eq!(stored.map(|value| value.party_size), Some(4));
        Ok(())
    }

    #[tokio::test]
    async fn token_replay_and_double_cancel_are_no_ops() -> TestResult<()> {
        let pool = setup_pool().await?;
        pin_capacity(&pool, 10).await?;
        let store = SqlCapacityStore::new(pool);

        let first =
            store.reserve(request(4, Some("tok-1"))).await.map_err(|error| error.to_string())?;
        let replay =
            store.reserve(request(4, Some("tok-1"))).await.map_err(|error| error.to_string())?;
        assert_eq!(first, replay);

        let ReserveOutcome::Confirmed(record) = first else {
            return Err("expected confirmation".to_string());
        };
        let cancelled = store.cancel(&record.id).await.map_err(|error| error.to_string())?;
        assert!(matches!(cancelled, CancelOutcome::Cancelled(_)));
        let again = store.cancel(&record.id).await.map_err(|error| error.to_string())?;
        assert!(matches!(again, CancelOutcome::AlreadyCancelled(_)));

        let slot = store.capacity(&key()).await.map_err(|error| error.to_string())?;
        assert_eq!(slot.seats_reserved, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_restaurant_is_reported() -> TestResult<()> {
        let pool = setup_pool().await?;
        let store = SqlCapacityStore::new(pool);
        let mut unknown = request(2, None);
        unknown.key.restaurant_id = RestaurantId("nowhere".to_string());

        let error = store.reserve(unknown).await.err().ok_or("expected an error")?;

        assert!(matches!(error, RepositoryError::UnknownRestaurant(_)));
        Ok(())
    }
}
