use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone, Copy)]
pub enum PayoutError {
    #[error("stake must be positive, got {0}")]
    NonPositiveStake(f64),
    #[error("odds must be within 1..=100, got {0}")]
    OddsOutOfRange(u8),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct PayoutQuote {
    pub payout: f64,
    pub profit: f64,
}

/// Quote the payout for a stake on a side with the given percentage odds:
/// the stake divided by the implied probability of that side. Full
/// precision is kept; round with [`round_to_cents`] at presentation only.
pub fn compute_payout(stake: f64, decision_odds: u8) -> Result<PayoutQuote, PayoutError> {
    if !(stake > 0.0) {
        return Err(PayoutError::NonPositiveStake(stake));
    }
    if decision_odds == 0 || decision_odds > 100 {
        return Err(PayoutError::OddsOutOfRange(decision_odds));
    }
    let payout = stake * 100.0 / decision_odds as f64;
    Ok(PayoutQuote {
        payout,
        profit: payout - stake,
    })
}

pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_follows_the_odds_law() {
        for odds in 1..=100u8 {
            for stake in [1.0, 2.5, 10.0, 333.33] {
                let quote = compute_payout(stake, odds).unwrap();
                assert!((quote.payout - stake * 100.0 / odds as f64).abs() < 1e-9);
                assert!((quote.profit - (quote.payout - stake)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn worked_example_at_forty_percent() {
        let quote = compute_payout(10.0, 40).unwrap();
        assert_eq!(quote.payout, 25.0);
        assert_eq!(quote.profit, 15.0);
    }

    #[test]
    fn even_odds_double_nothing() {
        let quote = compute_payout(10.0, 50).unwrap();
        assert_eq!(quote.payout, 20.0);
        assert_eq!(quote.profit, 10.0);
    }

    #[test]
    fn zero_odds_are_rejected() {
        assert_eq!(
            compute_payout(10.0, 0),
            Err(PayoutError::OddsOutOfRange(0))
        );
        assert_eq!(
            compute_payout(10.0, 101),
            Err(PayoutError::OddsOutOfRange(101))
        );
    }

    #[test]
    fn non_positive_stakes_are_rejected() {
        assert_eq!(
            compute_payout(0.0, 40),
            Err(PayoutError::NonPositiveStake(0.0))
        );
        assert_eq!(
            compute_payout(-5.0, 40),
            Err(PayoutError::NonPositiveStake(-5.0))
        );
    }

    #[test]
    fn rounding_happens_only_at_presentation() {
        let quote = compute_payout(10.0, 3).unwrap();
        assert!((quote.payout - 1000.0 / 3.0).abs() < 1e-9);
        assert_eq!(round_to_cents(quote.payout), 333.33);
    }
}
