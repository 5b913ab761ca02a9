//! Price distribution for one month.
//!
//! `[min_price, max_price]` is cut into `bin_count` equal-width bins. Each bin
//! is an independent range predicate evaluated against the whole price set:
//! half-open `[low, high)` except the last, which is closed at `max_price`,
//! so every price lands in exactly one bin. Prices are sorted once and each
//! bin is counted with two binary searches.

use serde::Serialize;

use crate::db::store::SaleReader;
use crate::error::{AppError, Result};
use crate::types::{PostalCode, SaleWindow, YearMonth};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Histogram {
    /// `[low, high]` per bin, truncated to whole currency units.
    pub bin_ranges: Vec<(i64, i64)>,
    /// Index-aligned with `bin_ranges`.
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceBin {
    low: f64,
    high: f64,
    closed: bool,
}

impl PriceBin {
    #[cfg(test)]
    fn contains(&self, price: f64) -> bool {
        price >= self.low && (price < self.high || (self.closed && price <= self.high))
    }

    /// Members of this bin within ascending `sorted`.
    fn count_in(&self, sorted: &[i64]) -> u64 {
        let below = |bound: f64| sorted.partition_point(|&p| (p as f64) < bound);
        let start = below(self.low);
        // The closed bin is the last one, whose upper bound is the maximum.
        let end = if self.closed { sorted.len() } else { below(self.high) };
        end.saturating_sub(start) as u64
    }
}

/// Bounds for `bin_count` contiguous bins over `[min, max]`. Each bound is
/// computed from `min` directly rather than accumulated.
fn price_bins(min: i64, max: i64, bin_count: usize) -> Vec<PriceBin> {
    let min = min as f64;
    let max = max as f64;
    let width = (max - min) / bin_count as f64;
    let last = bin_count - 1;

    (0..bin_count)
        .map(|i| PriceBin {
            low: min + i as f64 * width,
            high: if i == last { max } else { min + (i + 1) as f64 * width },
            closed: i == last,
        })
        .collect()
}

/// Bucket `prices` into `bin_count` bins. An empty price set yields an empty
/// histogram.
pub fn build_histogram(prices: &[i64], bin_count: usize) -> Histogram {
    let (Some(&min), Some(&max)) = (prices.iter().min(), prices.iter().max()) else {
        return Histogram::default();
    };
    if bin_count == 0 {
        return Histogram::default();
    }

    let mut sorted = prices.to_vec();
    sorted.sort_unstable();

    let bins = price_bins(min, max, bin_count);
    let counts = bins.iter().map(|bin| bin.count_in(&sorted)).collect();
    let bin_ranges = bins
        .iter()
        .map(|bin| (bin.low as i64, bin.high as i64))
        .collect();

    Histogram { bin_ranges, counts }
}

/// Histogram of sale prices within `month`, optionally for one postal code.
pub async fn transaction_histogram<R: SaleReader>(
    store: &R,
    bin_count: i64,
    month: YearMonth,
    postal_code: Option<PostalCode>,
) -> Result<Histogram> {
    if bin_count < 1 {
        return Err(AppError::Validation(format!(
            "bin count must be at least 1, got {bin_count}"
        )));
    }
    let bin_count = usize::try_from(bin_count)
        .map_err(|_| AppError::Validation(format!("bin count {bin_count} is too large")))?;

    let window = SaleWindow::month(month, postal_code);
    let prices = store.sale_prices(&window).await?;
    Ok(build_histogram(&prices, bin_count))
}
