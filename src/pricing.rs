//! Nights and price arithmetic for a stay.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;

const SECONDS_PER_DAY: i64 = 86_400;

/// Number of billable nights in `duration`, rounded up to whole days.
pub fn nights_for(duration: Duration) -> i64 {
    let seconds = duration.num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    nights_for(check_out - check_in)
}

/// Total for a stay; zero unless at least one night is billed.
pub fn total_price(nights: i64, base_price: i64) -> i64 {
    if nights > 0 {
        nights.saturating_mul(base_price)
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StayQuote {
    pub nights: i64,
    pub base_price: i64,
    pub total_price: i64,
}

impl StayQuote {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate, base_price: i64) -> Self {
        let nights = nights_between(check_in, check_out);
        Self {
            nights,
            base_price,
            total_price: total_price(nights, base_price),
        }
    }
}
