//! Network fee estimation for bridge transfers

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

/// Fee estimator: a fixed base plus a rate per unit of transferred amount
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    /// Fixed fee in USD
    base_fee: Decimal,
    /// Fee in USD per unit of source amount
    rate: Decimal,
    /// Buffer percentage for pre-submission estimates (e.g., 20 = 20% buffer)
    buffer_percent: u32,
}

impl FeeEstimator {
    /// Create a new fee estimator
    pub fn new(base_fee: Decimal, rate: Decimal) -> Self {
        Self {
            base_fee,
            rate,
            buffer_percent: 20,
        }
    }

    /// Expected fee for an amount, as quoted. `None` on overflow.
    pub fn quote_fee(&self, amount: Decimal) -> Option<Decimal> {
        let fee = self.rate.checked_mul(amount)?.checked_add(self.base_fee)?;
        Some(fee.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Fee with the safety buffer applied, used right before submission
    pub fn estimate(&self, amount: Decimal) -> Option<Decimal> {
        let fee = self.quote_fee(amount)?;
        let buffer = fee
            .checked_mul(Decimal::from(self.buffer_percent))?
            .checked_div(Decimal::ONE_HUNDRED)?;
        let buffered = fee
            .checked_add(buffer)?
            .round_dp_with_strategy(3, RoundingStrategy::AwayFromZero);
        debug!("Fee estimate for amount {}: {} (quoted {})", amount, buffered, fee);
        Some(buffered)
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(Decimal::new(1, 2), Decimal::new(1, 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_fee() {
        let estimator = FeeEstimator::default();
        assert_eq!(estimator.quote_fee(Decimal::from(100)), Some(Decimal::new(2, 2)));
        assert_eq!(estimator.quote_fee(Decimal::ZERO), Some(Decimal::new(1, 2)));
    }

    #[test]
    fn test_estimate_applies_buffer() {
        let estimator = FeeEstimator::default();
        assert_eq!(estimator.estimate(Decimal::from(100)), Some(Decimal::new(24, 3)));
    }

    #[test]
    fn test_overflowing_amount_has_no_fee() {
        let estimator = FeeEstimator::new(Decimal::ONE, Decimal::from(2));
        assert_eq!(estimator.quote_fee(Decimal::MAX), None);
        assert_eq!(estimator.estimate(Decimal::MAX), None);
    }
}
