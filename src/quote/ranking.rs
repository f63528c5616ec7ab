//! Quote ordering
//!
//! Landed quotes are ranked by the active [`SortOrder`]; ties keep the
//! provider order of the eligible list.

use super::Quote;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Time key for windows that carry no number; sorts after any real estimate
pub const UNKNOWN_TIME_MINUTES: u64 = 999;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Highest estimated receive amount first
    #[default]
    BestRate,
    /// Shortest estimated time first
    Fastest,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best-rate" | "best_rate" | "rate" => Ok(SortOrder::BestRate),
            "fastest" | "time" => Ok(SortOrder::Fastest),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

lazy_static::lazy_static! {
    static ref FIRST_INT: regex::Regex = regex::Regex::new(r"\d+").expect("valid integer pattern");
}

/// Receive amount as a decimal; anything unparseable ranks as zero
pub fn receive_amount(quote: &Quote) -> Decimal {
    Decimal::from_str(quote.estimated_receive_amount.trim()).unwrap_or(Decimal::ZERO)
}

/// First integer of a time window such as "8-12 min"
pub fn time_key(estimated_time: &str) -> u64 {
    FIRST_INT
        .find(estimated_time)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(UNKNOWN_TIME_MINUTES)
}

/// Compare two quotes under an order, breaking ties by slot
pub fn compare(order: SortOrder, a: (usize, &Quote), b: (usize, &Quote)) -> Ordering {
    let primary = match order {
        SortOrder::BestRate => receive_amount(b.1).cmp(&receive_amount(a.1)),
        SortOrder::Fastest => time_key(&a.1.estimated_time).cmp(&time_key(&b.1.estimated_time)),
    };
    primary.then(a.0.cmp(&b.0))
}

/// Sort `(slot, quote)` pairs in place
pub fn rank(entries: &mut [(usize, Quote)], order: SortOrder) {
    entries.sort_by(|a, b| compare(order, (a.0, &a.1), (b.0, &b.1)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ProviderId;
    use crate::quote::FeeBreakdown;

    fn quote(provider: &str, amount: &str, time: &str) -> Quote {
        Quote::success(
            ProviderId::from(provider),
            amount,
            FeeBreakdown::zero(),
            time,
        )
    }

    fn providers(entries: &[(usize, Quote)]) -> Vec<&str> {
        entries.iter().map(|(_, q)| q.provider.as_str()).collect()
    }

    #[test]
    fn test_time_key() {
        assert_eq!(time_key("8-12 min"), 8);
        assert_eq!(time_key("~15 minutes"), 15);
        assert_eq!(time_key("2 hours"), 2);
        assert_eq!(time_key("N/A"), UNKNOWN_TIME_MINUTES);
        assert_eq!(time_key(""), UNKNOWN_TIME_MINUTES);
    }

    #[test]
    fn test_best_rate_descending() {
        let mut entries = vec![
            (0, quote("a", "10.5", "5 min")),
            (1, quote("b", "12", "20 min")),
            (2, quote("c", "garbage", "1 min")),
        ];
        rank(&mut entries, SortOrder::BestRate);
        assert_eq!(providers(&entries), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_fastest_unparseable_last() {
        let mut entries = vec![
            (0, quote("a", "10", "N/A")),
            (1, quote("b", "10", "15-20 min")),
            (2, quote("c", "10", "2-5 min")),
        ];
        rank(&mut entries, SortOrder::Fastest);
        assert_eq!(providers(&entries), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_ties_keep_slot_order() {
        let mut entries = vec![
            (2, quote("c", "10", "5 min")),
            (0, quote("a", "10", "5 min")),
            (1, quote("b", "10", "5 min")),
        ];
        rank(&mut entries, SortOrder::BestRate);
        assert_eq!(providers(&entries), vec!["a", "b", "c"]);
        rank(&mut entries, SortOrder::Fastest);
        assert_eq!(providers(&entries), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("fastest".parse::<SortOrder>().unwrap(), SortOrder::Fastest);
        assert_eq!("best-rate".parse::<SortOrder>().unwrap(), SortOrder::BestRate);
        assert!("cheapest".parse::<SortOrder>().is_err());
    }
}
