use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::loyalty::{LoyaltyProfile, LoyaltyTier};

use super::{LoyaltyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLoyaltyRepository {
    pool: DbPool,
}

impl SqlLoyaltyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoyaltyRepository for SqlLoyaltyRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<LoyaltyProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT phone, name, tier, favorite_cuisine, preferred_city
             FROM loyalty_customer WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| profile_from_row(&value)).transpose()
    }

    async fn save(&self, profile: LoyaltyProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_customer (phone, name, tier, favorite_cuisine, preferred_city)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(phone) DO UPDATE SET
                name = excluded.name,
                tier = excluded.tier,
                favorite_cuisine = excluded.favorite_cuisine,
                preferred_city = excluded.preferred_city
            "#,
        )
        .bind(&profile.phone)
        .bind(&profile.name)
        .bind(profile.tier.as_str())
        .bind(profile.favorite_cuisine.as_deref())
        .bind(profile.preferred_city.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<LoyaltyProfile, RepositoryError> {
    let tier: String = row.try_get("tier")?;
    Ok(LoyaltyProfile {
        phone: row.try_get("phone")?,
        name: row.try_get("name")?,
        tier: LoyaltyTier::parse(&tier)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown loyalty tier `{tier}`")))?,
        favorite_cuisine: row.try_get("favorite_cuisine")?,
        preferred_city: row.try_get("preferred_city")?,
    })
}
