use serde::{Deserialize, Serialize};

/// Orders at or above this amount look out of band for the shop.
pub const HIGH_AMOUNT_MINOR: i64 = 100_000;
/// Couriers do not carry change for COD above this ceiling.
pub const COD_CEILING_MINOR: i64 = 200_000;
/// More orders than this inside the rolling window reads as scripted.
pub const ORDER_VELOCITY_MAX: u64 = 10;
/// Distinct users sharing one IP inside the window before it counts as reuse.
pub const IP_USER_MAX: u64 = 2;
/// A single line item at this quantity or more is not a household purchase.
pub const ABNORMAL_QUANTITY: u32 = 100;
/// Accounts younger than this at first payment attempt.
pub const NEW_ACCOUNT_AGE_SECS: i64 = 30 * 60;
/// Additive score at which the gate blocks.
pub const BLOCK_THRESHOLD: u32 = 50;

/// Heuristic risk indicators with fixed additive weights. Not a trained
/// model; the weights are tuned by the back office.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    HighAmount,
    OrderVelocity,
    IpReuse,
    AbnormalQuantity,
    CodOverCeiling,
    AccountVelocity,
    DuplicateSubmission,
}

impl Indicator {
    pub fn weight(&self) -> u32 {
        match self {
            Indicator::HighAmount => 30,
            Indicator::OrderVelocity => 25,
            Indicator::IpReuse => 20,
            Indicator::AbnormalQuantity => 15,
            Indicator::CodOverCeiling => 20,
            Indicator::AccountVelocity => 25,
            Indicator::DuplicateSubmission => 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pass,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pass => "pass",
            Decision::Block => "block",
        }
    }
}

/// Everything the scorer inspects, with velocity counters already
/// resolved from shared storage by the gate.
#[derive(Debug, Clone)]
pub struct FraudSignal {
    pub user_id: i64,
    pub amount_minor: i64,
    pub is_cod: bool,
    pub max_item_quantity: u32,
    pub recent_order_count: u64,
    pub distinct_users_on_ip: u64,
    pub account_age_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scorecard {
    pub score: u32,
    pub indicators: Vec<Indicator>,
    pub decision: Decision,
}

/// Pure additive scoring over a resolved signal. Runs in every mode;
/// enforcement of the block decision is the gate's concern.
pub fn score(signal: &FraudSignal) -> Scorecard {
    let mut indicators = Vec::new();

    if signal.amount_minor >= HIGH_AMOUNT_MINOR {
        indicators.push(Indicator::HighAmount);
    }
    if signal.recent_order_count > ORDER_VELOCITY_MAX {
        indicators.push(Indicator::OrderVelocity);
    }
    if signal.distinct_users_on_ip > IP_USER_MAX {
        indicators.push(Indicator::IpReuse);
    }
    if signal.max_item_quantity >= ABNORMAL_QUANTITY {
        indicators.push(Indicator::AbnormalQuantity);
    }
    if signal.is_cod && signal.amount_minor > COD_CEILING_MINOR {
        indicators.push(Indicator::CodOverCeiling);
    }
    if signal.account_age_secs < NEW_ACCOUNT_AGE_SECS {
        indicators.push(Indicator::AccountVelocity);
    }

    let score: u32 = indicators.iter().map(Indicator::weight).sum();
    let decision = if score >= BLOCK_THRESHOLD {
        Decision::Block
    } else {
        Decision::Pass
    };

    Scorecard {
        score,
        indicators,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_signal() -> FraudSignal {
        FraudSignal {
            user_id: 7,
            amount_minor: 4_500,
            is_cod: false,
            max_item_quantity: 2,
            recent_order_count: 1,
            distinct_users_on_ip: 1,
            account_age_secs: 86_400 * 90,
        }
    }

    #[test]
    fn clean_order_passes_with_zero_score() {
        let card = score(&quiet_signal());
        assert_eq!(card.score, 0);
        assert!(card.indicators.is_empty());
        assert_eq!(card.decision, Decision::Pass);
    }

    #[test]
    fn high_amount_velocity_and_quantity_add_to_seventy_and_block() {
        let card = score(&FraudSignal {
            amount_minor: 150_000,
            recent_order_count: 11,
            max_item_quantity: 150,
            ..quiet_signal()
        });
        assert_eq!(card.score, 70);
        assert_eq!(card.decision, Decision::Block);
        assert_eq!(
            card.indicators,
            vec![
                Indicator::HighAmount,
                Indicator::OrderVelocity,
                Indicator::AbnormalQuantity
            ]
        );
    }

    #[test]
    fn single_indicator_stays_below_threshold() {
        let card = score(&FraudSignal {
            amount_minor: 150_000,
            ..quiet_signal()
        });
        assert_eq!(card.score, 30);
        assert_eq!(card.decision, Decision::Pass);
    }

    #[test]
    fn cod_ceiling_only_counts_for_cod_orders() {
        let online = score(&FraudSignal {
            amount_minor: 250_000,
            ..quiet_signal()
        });
        assert!(!online.indicators.contains(&Indicator::CodOverCeiling));

        let cod = score(&FraudSignal {
            amount_minor: 250_000,
            is_cod: true,
            ..quiet_signal()
        });
        assert!(cod.indicators.contains(&Indicator::CodOverCeiling));
        assert_eq!(cod.decision, Decision::Block);
    }

    #[test]
    fn fresh_account_scores_account_velocity() {
        let card = score(&FraudSignal {
            account_age_secs: 120,
            ..quiet_signal()
        });
        assert_eq!(card.indicators, vec![Indicator::AccountVelocity]);
        assert_eq!(card.score, 25);
        assert_eq!(card.decision, Decision::Pass);
    }
}
