pub mod avg_price;
pub mod histogram;
