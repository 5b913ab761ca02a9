use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::store::SaleReader;
use crate::error::{AppError, Result};
use crate::types::{HouseType, PostalCode, PricePoint, SaleWindow, YearMonth};

/// House type label → monthly mean prices. Always carries all four house
/// types, in `HouseType` declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AveragePriceReport(pub BTreeMap<HouseType, Vec<PricePoint>>);

/// Mean sale price per month for each house type, from the start of `start`
/// through the end of `end`.
pub async fn average_prices<R: SaleReader>(
    store: &R,
    start: YearMonth,
    end: YearMonth,
    postal_code: Option<PostalCode>,
) -> Result<AveragePriceReport> {
    if end < start {
        return Err(AppError::Validation(format!(
            "end month {end} is before start month {start}"
        )));
    }

    let window = SaleWindow::months(start, end, postal_code);
    let mut by_type = BTreeMap::new();
    for house_type in HouseType::ALL {
        let points = store.monthly_mean_prices(house_type, &window).await?;
        by_type.insert(house_type, points);
    }
    Ok(AveragePriceReport(by_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::test_support::sale;
    use crate::db::store::{SaleWriter, SqliteStore};

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn end_before_start_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = average_prices(&store, month("2021-05"), month("2021-04"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_store_still_lists_every_type() {
        let store = SqliteStore::in_memory().await.unwrap();
        let report = average_prices(&store, month("2021-01"), month("2021-01"), None)
            .await
            .unwrap();
        assert_eq!(report.0.len(), 4);
        assert!(report.0.values().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn serializes_labels_in_type_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_batch(&[
                sale("a", 100, "2021-01-05 00:00", "AB1 2CD", HouseType::Terraced),
                sale("b", 300, "2021-01-20 00:00", "AB1 2CD", HouseType::Terraced),
                sale("c", 999, "2021-01-20 00:00", "ZZ9 9ZZ", HouseType::Terraced),
            ])
            .await
            .unwrap();

        let postal: PostalCode = "AB1_2CD".parse().unwrap();
        let report = average_prices(&store, month("2021-01"), month("2021-01"), Some(postal))
            .await
            .unwrap();

        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"Flats":[],"Semi-detached homes":[],"Detached homes":[],"Terraced homes":[{"month":"2021-01","mean_price":200.0}]}"#
        );
    }
}
