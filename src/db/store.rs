use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::models::MonthlyMeanRow;
use crate::error::Result;
use crate::types::{HouseType, PricePoint, SaleRecord, SaleWindow};

/// Write side of the sale record store. The importer depends only on this.
pub trait SaleWriter {
    /// Persist one batch. Returns the number of rows actually inserted;
    /// records whose `house_uuid` is already stored are skipped.
    fn insert_batch(&self, records: &[SaleRecord]) -> impl Future<Output = Result<u64>> + Send;
}

/// Read side of the sale record store. The report queries depend only on this.
pub trait SaleReader {
    /// Mean price per calendar month for one house type, months ascending.
    fn monthly_mean_prices(
        &self,
        house_type: HouseType,
        window: &SaleWindow,
    ) -> impl Future<Output = Result<Vec<PricePoint>>> + Send;

    /// Every sale price inside the window, unordered.
    fn sale_prices(&self, window: &SaleWindow) -> impl Future<Output = Result<Vec<i64>>> + Send;

    /// Total stored records.
    fn count(&self) -> impl Future<Output = Result<i64>> + Send;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and apply migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {db_path}");
        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database. Each connection to
    /// `sqlite::memory:` is its own database, so the pool is capped at one.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }
}

impl SaleWriter for SqliteStore {
    async fn insert_batch(&self, records: &[SaleRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for r in records {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO sales (
                    house_uuid, postal_code,
                    primary_addressable_object_name, secondary_addressable_object_name,
                    sell_price, sell_date,
                    address_street, address_locality, address_town, address_county, address_city,
                    house_type
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.house_uuid)
            .bind(&r.postal_code)
            .bind(&r.primary_addressable_object_name)
            .bind(&r.secondary_addressable_object_name)
            .bind(r.sell_price)
            .bind(r.sell_date)
            .bind(&r.address_street)
            .bind(&r.address_locality)
            .bind(&r.address_town)
            .bind(&r.address_county)
            .bind(&r.address_city)
            .bind(r.house_type.code())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!(batch = records.len(), inserted, "Batch committed");
        Ok(inserted)
    }
}

impl SaleReader for SqliteStore {
    async fn monthly_mean_prices(
        &self,
        house_type: HouseType,
        window: &SaleWindow,
    ) -> Result<Vec<PricePoint>> {
        let postal_code = window.postal_code.as_ref().map(|p| p.as_str());

        let rows: Vec<MonthlyMeanRow> = sqlx::query_as(
            r#"
            SELECT strftime('%Y-%m', sell_date) AS month,
                   CAST(AVG(sell_price) AS REAL) AS mean_price
            FROM sales
            WHERE house_type = ?
              AND sell_date >= ? AND sell_date < ?
              AND (? IS NULL OR postal_code = ?)
            GROUP BY month
            ORDER BY month
            "#,
        )
        .bind(house_type.code())
        .bind(window.from)
        .bind(window.until)
        .bind(postal_code)
        .bind(postal_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PricePoint::try_from).collect()
    }

    async fn sale_prices(&self, window: &SaleWindow) -> Result<Vec<i64>> {
        let postal_code = window.postal_code.as_ref().map(|p| p.as_str());

        let prices = sqlx::query_scalar(
            r#"
            SELECT sell_price
            FROM sales
            WHERE sell_date >= ? AND sell_date < ?
              AND (? IS NULL OR postal_code = ?)
            "#,
        )
        .bind(window.from)
        .bind(window.until)
        .bind(postal_code)
        .bind(postal_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(prices)
    }

    async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDateTime;

    use crate::types::{HouseType, SaleRecord};

    /// Minimal record for store and query tests.
    pub fn sale(uuid: &str, price: i64, date: &str, postal_code: &str, house_type: HouseType) -> SaleRecord {
        SaleRecord {
            house_uuid: uuid.to_string(),
            postal_code: postal_code.to_string(),
            primary_addressable_object_name: "1".to_string(),
            secondary_addressable_object_name: String::new(),
            sell_price: price,
            sell_date: NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M")
                .expect("test date"),
            address_street: "HIGH STREET".to_string(),
            address_locality: String::new(),
            address_town: "LEEDS".to_string(),
            address_county: "LEEDS".to_string(),
            address_city: "WEST YORKSHIRE".to_string(),
            house_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sale;
    use super::*;
    use crate::types::{PostalCode, YearMonth};

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn insert_batch_ignores_duplicate_uuids() {
        let store = SqliteStore::in_memory().await.unwrap();
        let batch = vec![
            sale("a", 100, "2021-01-05 00:00", "AB1 2CD", HouseType::Flat),
            sale("b", 200, "2021-01-06 00:00", "AB1 2CD", HouseType::Flat),
        ];
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 2);
        assert_eq!(store.insert_batch(&batch[..1]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn monthly_means_group_by_month_and_type() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_batch(&[
                sale("a", 100, "2021-01-05 00:00", "AB1 2CD", HouseType::Flat),
                sale("b", 300, "2021-01-31 23:59", "AB1 2CD", HouseType::Flat),
                sale("c", 500, "2021-02-01 00:00", "AB1 2CD", HouseType::Flat),
                sale("d", 900, "2021-01-10 00:00", "AB1 2CD", HouseType::Detached),
                sale("e", 700, "2021-03-01 00:00", "AB1 2CD", HouseType::Flat),
            ])
            .await
            .unwrap();

        let window = SaleWindow::months(month("2021-01"), month("2021-02"), None);
        let flats = store.monthly_mean_prices(HouseType::Flat, &window).await.unwrap();
        assert_eq!(
            flats,
            vec![
                PricePoint { month: month("2021-01"), mean_price: 200.0 },
                PricePoint { month: month("2021-02"), mean_price: 500.0 },
            ]
        );
        let terraced = store.monthly_mean_prices(HouseType::Terraced, &window).await.unwrap();
        assert!(terraced.is_empty());
    }

    #[tokio::test]
    async fn sale_prices_respect_window_and_postal_code() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_batch(&[
                sale("a", 100, "2021-01-05 00:00", "AB1 2CD", HouseType::Flat),
                sale("b", 200, "2021-01-06 00:00", "ZZ9 9ZZ", HouseType::Terraced),
                sale("c", 300, "2021-02-01 00:00", "AB1 2CD", HouseType::Flat),
            ])
            .await
            .unwrap();

        let all = SaleWindow::month(month("2021-01"), None);
        let mut prices = store.sale_prices(&all).await.unwrap();
        prices.sort_unstable();
        assert_eq!(prices, vec![100, 200]);

        let postal: PostalCode = "AB1_2CD".parse().unwrap();
        let filtered = SaleWindow::month(month("2021-01"), Some(postal));
        assert_eq!(store.sale_prices(&filtered).await.unwrap(), vec![100]);
    }
}
