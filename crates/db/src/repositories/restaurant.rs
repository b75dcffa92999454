use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use concierge_core::domain::restaurant::{Restaurant, RestaurantFilter, RestaurantId};

use super::{parse_u32, RepositoryError, RestaurantRepository};
use crate::DbPool;

const RESTAURANT_COLUMNS: &str = "id, name, aliases_json, cuisine, city, neighborhood, \
     price_label, avg_price_inr, rating, capacity, veg_only";

pub struct SqlRestaurantRepository {
    pool: DbPool,
}

impl SqlRestaurantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RestaurantRepository for SqlRestaurantRepository {
    async fn find_by_id(&self, id: &RestaurantId) -> Result<Option<Restaurant>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RESTAURANT_COLUMNS} FROM restaurant WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|value| restaurant_from_row(&value)).transpose()
    }

    async fn search(&self, filter: &RestaurantFilter) -> Result<Vec<Restaurant>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {RESTAURANT_COLUMNS} FROM restaurant WHERE 1 = 1"));

        if let Some(city) = &filter.city {
            query.push(" AND lower(city) = lower(").push_bind(city.trim().to_string()).push(")");
        }
        if let Some(cuisine) = &filter.cuisine {
            query
                .push(" AND lower(cuisine) LIKE ")
                .push_bind(format!("%{}%", cuisine.trim().to_lowercase()));
        }
        if let Some(veg_only) = filter.veg_only {
            query.push(" AND veg_only = ").push_bind(i64::from(veg_only));
        }
        if let Some(min_rating) = filter.min_rating {
            query.push(" AND rating >= ").push_bind(f64::from(min_rating));
        }
        query.push(" ORDER BY rating DESC, avg_price_inr ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(restaurant_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Restaurant>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RESTAURANT_COLUMNS} FROM restaurant ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(restaurant_from_row).collect()
    }

    async fn save(&self, restaurant: Restaurant) -> Result<(), RepositoryError> {
        let aliases = serde_json::to_string(&restaurant.aliases)
            .map_err(|error| RepositoryError::Decode(format!("encode aliases: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO restaurant (
                id, name, aliases_json, cuisine, city, neighborhood,
                price_label, avg_price_inr, rating, capacity, veg_only
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                aliases_json = excluded.aliases_json,
                cuisine = excluded.cuisine,
                city = excluded.city,
                neighborhood = excluded.neighborhood,
                price_label = excluded.price_label,
                avg_price_inr = excluded.avg_price_inr,
                rating = excluded.rating,
                capacity = excluded.capacity,
                veg_only = excluded.veg_only
            "#,
        )
        .bind(&restaurant.id.0)
        .bind(&restaurant.name)
        .bind(aliases)
        .bind(&restaurant.cuisine)
        .bind(&restaurant.city)
        .bind(&restaurant.neighborhood)
        .bind(&restaurant.price_label)
        .bind(i64::from(restaurant.avg_price_inr))
        .bind(f64::from(restaurant.rating))
        .bind(i64::from(restaurant.capacity))
        .bind(i64::from(restaurant.veg_only))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn restaurant_from_row(row: &SqliteRow) -> Result<Restaurant, RepositoryError> {
    let aliases_json: String = row.try_get("aliases_json")?;
    let aliases = serde_json::from_str::<Vec<String>>(&aliases_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid aliases_json `{aliases_json}` ({error})"))
    })?;
    let rating: f64 = row.try_get("rating")?;

    Ok(Restaurant {
        id: RestaurantId(row.try_get("id")?),
        name: row.try_get("name")?,
        aliases,
        cuisine: row.try_get("cuisine")?,
        city: row.try_get("city")?,
        neighborhood: row.try_get("neighborhood")?,
        price_label: row.try_get("price_label")?,
        avg_price_inr: parse_u32("avg_price_inr", row.try_get("avg_price_inr")?)?,
        rating: rating as f32,
        capacity: parse_u32("capacity", row.try_get("capacity")?)?,
        veg_only: row.try_get::<i64, _>("veg_only")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::restaurant::{RestaurantFilter, RestaurantId};

    use super::SqlRestaurantRepository;
    use crate::fixtures::DemoCatalog;
    use crate::repositories::RestaurantRepository;
    use crate::{connect_with_settings, migrations};

    type TestResult<T> = Result<T, String>;

    async fn seeded_repo() -> TestResult<SqlRestaurantRepository> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .map_err(|error| format!("connect test pool: {error}"))?;
        migrations::run_pending(&pool).await.map_err(|error| format!("run migrations: {error}"))?;
        let repo = SqlRestaurantRepository::new(pool);
        for restaurant in DemoCatalog::restaurants() {
            repo.save(restaurant).await.map_err(|error| error.to_string())?;
        }
        Ok(repo)
    }

    #[tokio::test]
    async fn saved_restaurant_reads_back_with_aliases() -> TestResult<()> {
        let repo = seeded_repo().await?;

        let karims = repo
            .find_by_id(&RestaurantId("karims-delhi".to_string()))
            .await
            .map_err(|error| error.to_string())?
            .ok_or("karims missing")?;

        assert!(karims.aliases.iter().any(|alias| alias == "karims"));
        assert_eq!(karims.city, "Delhi");
        Ok(())
    }

    #[tokio::test]
    async fn search_matches_in_memory_filter_and_order() -> TestResult<()> {
        let repo = seeded_repo().await?;
        let filter = RestaurantFilter {
            city: Some("MUMBAI".to_string()),
            ..RestaurantFilter::default()
        };

        let found = repo.search(&filter).await.map_err(|error| error.to_string())?;
        let mut expected = DemoCatalog::restaurants()
            .into_iter()
            .filter(|restaurant| filter.matches(restaurant))
            .collect::<Vec<_>>();
        expected.sort_by(concierge_core::domain::restaurant::discovery_order);

        assert!(!found.is_empty());
        assert_eq!(
            found.iter().map(|restaurant| restaurant.id.clone()).collect::<Vec<_>>(),
            expected.iter().map(|restaurant| restaurant.id.clone()).collect::<Vec<_>>()
        );
        Ok(())
    }
}
