//! Database row types for the `sales` table queries.
//! Used by sqlx for typed queries.

use crate::error::{AppError, Result};
use crate::types::{PricePoint, YearMonth};

/// One `GROUP BY` month bucket of the mean price query.
#[derive(Debug, sqlx::FromRow)]
pub struct MonthlyMeanRow {
    /// `strftime('%Y-%m', sell_date)`
    pub month: String,
    pub mean_price: f64,
}

impl TryFrom<MonthlyMeanRow> for PricePoint {
    type Error = AppError;

    fn try_from(row: MonthlyMeanRow) -> Result<Self> {
        let month: YearMonth = row
            .month
            .parse()
            .map_err(|e| AppError::Database(sqlx::Error::Decode(Box::new(e))))?;
        Ok(PricePoint {
            month,
            mean_price: row.mean_price,
        })
    }
}
