//! Ordering of competing offers for a listing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub seller: String,
    pub price: Decimal,
    pub shipping: Decimal,
    /// Holds the buy box.
    pub winner: bool,
}

impl Offer {
    pub fn landed_price(&self) -> Decimal {
        (self.price + self.shipping).round_dp_with_strategy(2, rust_decimal::RoundingStrategy::ToZero)
    }
}

/// The winning offer sorts first, everything else by ascending price plus
/// shipping.
pub fn compare_offers(a: &Offer, b: &Offer) -> Ordering {
    match (a.winner, b.winner) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.landed_price().cmp(&b.landed_price()),
    }
}

pub fn sort_offers(offers: &mut [Offer]) {
    offers.sort_by(compare_offers);
}
