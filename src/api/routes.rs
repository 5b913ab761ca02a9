use std::time::Duration;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::health::get_health;
use crate::db::store::SqliteStore;
use crate::error::{AppError, Result};
use crate::query::avg_price::{average_prices, AveragePriceReport};
use crate::query::histogram::{transaction_histogram, Histogram};
use crate::types::{PostalCode, YearMonth};

#[derive(Clone)]
pub struct ApiState {
    pub store: SqliteStore,
}

pub fn router(state: ApiState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/avgprice/:start/:end", get(get_avg_price))
        .route("/api/avgprice/:start/:end/:postal_code", get(get_avg_price_for_postal_code))
        .route("/api/transaction/:bin_count/:date", get(get_transactions))
        .route(
            "/api/transaction/:bin_count/:date/:postal_code",
            get(get_transactions_for_postal_code),
        )
        .route("/health", get(get_health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}

// ---------------------------------------------------------------------------
// Path segment parsing
// ---------------------------------------------------------------------------

fn parse_month(segment: &str) -> Result<YearMonth> {
    segment
        .parse()
        .map_err(|e: crate::types::ParseMonthError| AppError::Validation(e.to_string()))
}

fn parse_postal_code(segment: &str) -> Result<PostalCode> {
    segment
        .parse()
        .map_err(|e: crate::types::ParsePostalCodeError| AppError::Validation(e.to_string()))
}

fn parse_bin_count(segment: &str) -> Result<i64> {
    segment
        .parse()
        .map_err(|_| AppError::Validation(format!("bin count must be an integer, got '{segment}'")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_avg_price(
    State(state): State<ApiState>,
    Path((start, end)): Path<(String, String)>,
) -> Result<Json<AveragePriceReport>> {
    avg_price(&state, &start, &end, None).await
}

async fn get_avg_price_for_postal_code(
    State(state): State<ApiState>,
    Path((start, end, postal_code)): Path<(String, String, String)>,
) -> Result<Json<AveragePriceReport>> {
    avg_price(&state, &start, &end, Some(&postal_code)).await
}

async fn avg_price(
    state: &ApiState,
    start: &str,
    end: &str,
    postal_code: Option<&str>,
) -> Result<Json<AveragePriceReport>> {
    let start = parse_month(start)?;
    let end = parse_month(end)?;
    let postal_code = postal_code.map(parse_postal_code).transpose()?;
    let report = average_prices(&state.store, start, end, postal_code).await?;
    Ok(Json(report))
}

async fn get_transactions(
    State(state): State<ApiState>,
    Path((bin_count, date)): Path<(String, String)>,
) -> Result<Json<Histogram>> {
    transactions(&state, &bin_count, &date, None).await
}

async fn get_transactions_for_postal_code(
    State(state): State<ApiState>,
    Path((bin_count, date, postal_code)): Path<(String, String, String)>,
) -> Result<Json<Histogram>> {
    transactions(&state, &bin_count, &date, Some(&postal_code)).await
}

async fn transactions(
    state: &ApiState,
    bin_count: &str,
    date: &str,
    postal_code: Option<&str>,
) -> Result<Json<Histogram>> {
    let bin_count = parse_bin_count(bin_count)?;
    let month = parse_month(date)?;
    let postal_code = postal_code.map(parse_postal_code).transpose()?;
    let histogram = transaction_histogram(&state.store, bin_count, month, postal_code).await?;
    Ok(Json(histogram))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::db::store::test_support::sale;
    use crate::db::store::SaleWriter;
    use crate::types::HouseType;

    async fn app() -> Router {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_batch(&[
                sale("a", 100, "2021-06-01 00:00", "AB1 2CD", HouseType::Flat),
                sale("b", 200, "2021-06-10 00:00", "AB1 2CD", HouseType::Flat),
                sale("c", 300, "2021-06-20 00:00", "ZZ9 9ZZ", HouseType::Detached),
                sale("d", 400, "2021-06-30 00:00", "ZZ9 9ZZ", HouseType::Terraced),
            ])
            .await
            .unwrap();
        router(ApiState { store }, Duration::from_secs(5))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn avg_price_lists_all_types() {
        let (status, body) = get(app().await, "/api/avgprice/2021-01/2021-12").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "Flats": [{"month": "2021-06", "mean_price": 150.0}],
                "Semi-detached homes": [],
                "Detached homes": [{"month": "2021-06", "mean_price": 300.0}],
                "Terraced homes": [{"month": "2021-06", "mean_price": 400.0}],
            })
        );
    }

    #[tokio::test]
    async fn avg_price_postal_code_underscore_is_space() {
        let (status, body) = get(app().await, "/api/avgprice/2021-06/2021-06/ZZ9_9ZZ").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Flats"], json!([]));
        assert_eq!(body["Detached homes"], json!([{"month": "2021-06", "mean_price": 300.0}]));
    }

    #[tokio::test]
    async fn avg_price_end_before_start_is_bad_request() {
        let (status, body) = get(app().await, "/api/avgprice/2021-06/2021-05").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("before"));
    }

    #[tokio::test]
    async fn malformed_month_is_bad_request() {
        let (status, _) = get(app().await, "/api/avgprice/2021-6/2021-07").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transaction_histogram_for_month() {
        let (status, body) = get(app().await, "/api/transaction/2/2021-06").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"bin_ranges": [[100, 250], [250, 400]], "counts": [2, 2]})
        );
    }

    #[tokio::test]
    async fn transaction_histogram_with_postal_code() {
        let (status, body) = get(app().await, "/api/transaction/1/2021-06/AB1_2CD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"bin_ranges": [[100, 200]], "counts": [2]}));
    }

    #[tokio::test]
    async fn transaction_histogram_empty_month() {
        let (status, body) = get(app().await, "/api/transaction/4/2020-01").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"bin_ranges": [], "counts": []}));
    }

    #[tokio::test]
    async fn transaction_zero_bins_is_bad_request() {
        let (status, _) = get(app().await, "/api/transaction/0/2021-06").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_record_count() {
        let (status, body) = get(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "sale_records": 4}));
    }
}
