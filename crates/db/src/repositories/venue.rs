use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::restaurant::RestaurantId;
use concierge_core::domain::venue::{Feedback, MenuItem, Rating, VenueEvent};

use super::capacity::{parse_timestamp, DATE_FORMAT};
use super::{parse_u32, RepositoryError, VenueRepository};
use crate::DbPool;

pub struct SqlVenueRepository {
    pool: DbPool,
}

impl SqlVenueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VenueRepository for SqlVenueRepository {
    async fn menu(
        &self,
        restaurant: &RestaurantId,
        category: Option<&str>,
    ) -> Result<Vec<MenuItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT restaurant_id, name, category, price_inr, signature
             FROM menu_item
             WHERE restaurant_id = ? AND (? IS NULL OR lower(category) = lower(?))
             ORDER BY signature DESC, price_inr ASC, name ASC",
        )
        .bind(&restaurant.0)
        .bind(category)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(menu_item_from_row).collect()
    }

    async fn events_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<VenueEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, restaurant_id, name, event_date, description
             FROM venue_event
             WHERE event_date >= ? AND event_date <= ?
             ORDER BY event_date ASC, id ASC",
        )
        .bind(from.format(DATE_FORMAT).to_string())
        .bind(until.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn record_feedback(&self, feedback: Feedback) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO feedback (restaurant_id, customer_name, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&feedback.restaurant_id.0)
        .bind(feedback.customer_name.as_deref())
        .bind(i64::from(feedback.rating.stars()))
        .bind(feedback.comment.as_deref())
        .bind(feedback.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn feedback_for(
        &self,
        restaurant: &RestaurantId,
    ) -> Result<Vec<Feedback>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT restaurant_id, customer_name, rating, comment, created_at
             FROM feedback WHERE restaurant_id = ? ORDER BY id DESC",
        )
        .bind(&restaurant.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(feedback_from_row).collect()
    }

    async fn save_menu_item(&self, item: MenuItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO menu_item (restaurant_id, name, category, price_inr, signature)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(restaurant_id, name) DO UPDATE SET
                category = excluded.category,
                price_inr = excluded.price_inr,
                signature = excluded.signature
            "#,
        )
        .bind(&item.restaurant_id.0)
        .bind(&item.name)
        .bind(&item.category)
        .bind(i64::from(item.price_inr))
        .bind(i64::from(item.signature))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_event(&self, event: VenueEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO venue_event (id, restaurant_id, name, event_date, description)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                restaurant_id = excluded.restaurant_id,
                name = excluded.name,
                event_date = excluded.event_date,
                description = excluded.description
            "#,
        )
        .bind(&event.id)
        .bind(&event.restaurant_id.0)
        .bind(&event.name)
        .bind(event.date.format(DATE_FORMAT).to_string())
        .bind(&event.description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn menu_item_from_row(row: &SqliteRow) -> Result<MenuItem, RepositoryError> {
    Ok(MenuItem {
        restaurant_id: RestaurantId(row.try_get("restaurant_id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price_inr: parse_u32("price_inr", row.try_get("price_inr")?)?,
        signature: row.try_get::<i64, _>("signature")? != 0,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<VenueEvent, RepositoryError> {
    let date: String = row.try_get("event_date")?;
    Ok(VenueEvent {
        id: row.try_get("id")?,
        restaurant_id: RestaurantId(row.try_get("restaurant_id")?),
        name: row.try_get("name")?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|error| {
            RepositoryError::Decode(format!("invalid event_date `{date}` ({error})"))
        })?,
        description: row.try_get("description")?,
    })
}

fn feedback_from_row(row: &SqliteRow) -> Result<Feedback, RepositoryError> {
    let stars: i64 = row.try_get("rating")?;
    let rating = u8::try_from(stars)
        .ok()
        .and_then(Rating::new)
        .ok_or_else(|| RepositoryError::Decode(format!("rating out of range: {stars}")))?;
    Ok(Feedback {
        restaurant_id: RestaurantId(row.try_get("restaurant_id")?),
        customer_name: row.try_get("customer_name")?,
        rating,
        comment: row.try_get("comment")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
