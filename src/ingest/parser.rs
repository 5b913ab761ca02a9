//! Row parser for the price-paid feed.
//!
//! Each line is a comma-separated row with a fixed column layout, every field
//! wrapped in double quotes:
//!
//! `"{UUID}","price","YYYY-MM-DD HH:MM","postcode","type",...,"county"`

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::debug;

use crate::types::{HouseType, SaleRecord};

/// Fixed column positions in the feed.
pub mod columns {
    pub const UUID: usize = 0;
    pub const PRICE: usize = 1;
    pub const SELL_DATE: usize = 2;
    pub const POSTAL_CODE: usize = 3;
    pub const HOUSE_TYPE: usize = 4;
    pub const PRIMARY_NAME: usize = 8;
    pub const STREET: usize = 9;
    pub const SECONDARY_NAME: usize = 10;
    pub const LOCALITY: usize = 10;
    pub const TOWN: usize = 11;
    pub const COUNTY: usize = 12;
    pub const CITY: usize = 13;

    /// Rows with fewer fields cannot fill every record column.
    pub const MIN_FIELDS: usize = CITY + 1;
}

const SELL_DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected at least {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid price '{0}'")]
    Price(String),

    #[error("invalid sale date '{0}'")]
    SellDate(String),

    #[error("line is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Decode a raw feed line strictly as UTF-8 and parse it.
pub fn parse_raw_line(raw: &[u8]) -> Result<SaleRecord, ParseError> {
    parse_line(std::str::from_utf8(raw)?)
}

/// Parse one non-empty feed line into a complete record.
pub fn parse_line(line: &str) -> Result<SaleRecord, ParseError> {
    let fields = split_fields(line);
    if fields.len() < columns::MIN_FIELDS {
        return Err(ParseError::FieldCount {
            expected: columns::MIN_FIELDS,
            found: fields.len(),
        });
    }

    let sell_price = parse_price(&fields[columns::PRICE])?;
    let sell_date = parse_sell_date(&fields[columns::SELL_DATE])?;

    let type_code = &fields[columns::HOUSE_TYPE];
    let house_type = HouseType::from_code(type_code).unwrap_or_else(|| {
        debug!(code = %type_code, "unknown house type code, defaulting to flat");
        HouseType::default()
    });

    let field = |idx: usize| fields[idx].clone();

    Ok(SaleRecord {
        house_uuid: fields[columns::UUID]
            .trim_matches(|c: char| c == '{' || c == '}')
            .to_string(),
        postal_code: field(columns::POSTAL_CODE),
        primary_addressable_object_name: field(columns::PRIMARY_NAME),
        secondary_addressable_object_name: field(columns::SECONDARY_NAME),
        sell_price,
        sell_date,
        address_street: field(columns::STREET),
        address_locality: field(columns::LOCALITY),
        address_town: field(columns::TOWN),
        address_county: field(columns::COUNTY),
        address_city: field(columns::CITY),
        house_type,
    })
}

/// Split on commas that sit outside double quotes, dropping the quotes.
/// A comma inside a quoted address stays part of its field.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(16);
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_price(raw: &str) -> Result<i64, ParseError> {
    match raw.trim().parse::<i64>() {
        Ok(price) if price >= 0 => Ok(price),
        _ => Err(ParseError::Price(raw.to_string())),
    }
}

fn parse_sell_date(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let raw_trimmed = raw.trim();
    SELL_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw_trimmed, fmt).ok())
        .ok_or_else(|| ParseError::SellDate(raw.to_string()))
}
