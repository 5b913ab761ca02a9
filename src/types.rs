use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// House type
// ---------------------------------------------------------------------------

/// Property category code carried in column 4 of the price-paid feed.
///
/// Declaration order is the order categories appear in report responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HouseType {
    #[default]
    #[serde(rename = "Flats")]
    Flat,
    #[serde(rename = "Semi-detached homes")]
    SemiDetached,
    #[serde(rename = "Detached homes")]
    Detached,
    #[serde(rename = "Terraced homes")]
    Terraced,
}

impl HouseType {
    pub const ALL: [HouseType; 4] = [
        HouseType::Flat,
        HouseType::SemiDetached,
        HouseType::Detached,
        HouseType::Terraced,
    ];

    /// Single-letter code as stored in the feed and the `sales` table.
    pub fn code(self) -> &'static str {
        match self {
            HouseType::Flat => "F",
            HouseType::SemiDetached => "S",
            HouseType::Detached => "D",
            HouseType::Terraced => "T",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "F" => Some(HouseType::Flat),
            "S" => Some(HouseType::SemiDetached),
            "D" => Some(HouseType::Detached),
            "T" => Some(HouseType::Terraced),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HouseType::Flat => "Flats",
            HouseType::SemiDetached => "Semi-detached homes",
            HouseType::Detached => "Detached homes",
            HouseType::Terraced => "Terraced homes",
        }
    }
}

impl fmt::Display for HouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ---------------------------------------------------------------------------
// Sale record
// ---------------------------------------------------------------------------

/// One property transaction. Built only by the importer, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub house_uuid: String,
    pub postal_code: String,
    pub primary_addressable_object_name: String,
    pub secondary_addressable_object_name: String,
    pub sell_price: i64,
    pub sell_date: NaiveDateTime,
    pub address_street: String,
    pub address_locality: String,
    pub address_town: String,
    pub address_county: String,
    pub address_city: String,
    pub house_type: HouseType,
}

// ---------------------------------------------------------------------------
// Calendar month
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct ParseMonthError(pub String);

/// A calendar month parsed from `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    first_day: NaiveDate,
    following_first_day: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        let following_first_day = first_day.checked_add_months(Months::new(1))?;
        Some(Self {
            first_day,
            following_first_day,
        })
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    /// Midnight on the first day of the month.
    pub fn start(&self) -> NaiveDateTime {
        self.first_day.and_time(NaiveTime::MIN)
    }

    /// Midnight on the first day of the following month (exclusive bound).
    pub fn next_start(&self) -> NaiveDateTime {
        self.following_first_day.and_time(NaiveTime::MIN)
    }
}

impl FromStr for YearMonth {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMonthError(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(err());
        }
        let digits_ok = bytes[..4]
            .iter()
            .chain(&bytes[5..])
            .all(u8::is_ascii_digit);
        if !digits_ok {
            return Err(err());
        }
        let year: i32 = s[..4].parse().map_err(|_| err())?;
        let month: u32 = s[5..].parse().map_err(|_| err())?;
        YearMonth::new(year, month).ok_or_else(err)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Postal code filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid postal code '{0}', expected letters, digits and underscores")]
pub struct ParsePostalCodeError(pub String);

/// Postal code taken from a URL segment. Underscores stand in for spaces,
/// so `AB1_2CD` filters on `AB1 2CD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalCode(String);

impl PostalCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PostalCode {
    type Err = ParsePostalCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ParsePostalCodeError(s.to_string()));
        }
        Ok(PostalCode(s.replace('_', " ")))
    }
}

// ---------------------------------------------------------------------------
// Query shapes
// ---------------------------------------------------------------------------

/// Half-open sale date range `[from, until)` with an optional postal code.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleWindow {
    pub from: NaiveDateTime,
    pub until: NaiveDateTime,
    pub postal_code: Option<PostalCode>,
}

impl SaleWindow {
    /// Every sale from the start of `first` through the end of `last`.
    pub fn months(first: YearMonth, last: YearMonth, postal_code: Option<PostalCode>) -> Self {
        Self {
            from: first.start(),
            until: last.next_start(),
            postal_code,
        }
    }

    pub fn month(month: YearMonth, postal_code: Option<PostalCode>) -> Self {
        Self::months(month, month, postal_code)
    }
}

/// Mean sale price for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub month: YearMonth,
    pub mean_price: f64,
}
