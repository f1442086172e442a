//! Tier classification by USD-equivalent holdings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MembershipError, MembershipResult};
use crate::types::{CommissionRates, Tier};

/// USD value at which a wallet becomes a market partner
pub const MARKET_PARTNER_THRESHOLD: Decimal = Decimal::from_parts(3000, 0, 0, false, 0);

/// USD value at which a wallet becomes a global partner
pub const GLOBAL_PARTNER_THRESHOLD: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);

/// Thresholds and commission rates per tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub market_partner_threshold: Decimal,
    pub global_partner_threshold: Decimal,
    /// Rates for market and global partners
    pub partner_rates: CommissionRates,
    /// Rates for normal members
    pub normal_rates: CommissionRates,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            market_partner_threshold: MARKET_PARTNER_THRESHOLD,
            global_partner_threshold: GLOBAL_PARTNER_THRESHOLD,
            partner_rates: CommissionRates {
                direct: Decimal::new(25, 2),
                indirect: Decimal::new(25, 2),
            },
            normal_rates: CommissionRates {
                direct: Decimal::new(3, 2),
                indirect: Decimal::new(2, 2),
            },
        }
    }
}

impl TierPolicy {
    pub fn validate(&self) -> MembershipResult<()> {
        if self.market_partner_threshold <= Decimal::ZERO
            || self.global_partner_threshold < self.market_partner_threshold
        {
            return Err(MembershipError::Validation(
                "tier thresholds must be positive and ordered".to_string(),
            ));
        }

        for rates in [self.partner_rates, self.normal_rates] {
            for rate in [rates.direct, rates.indirect] {
                if rate < Decimal::ZERO || rate > Decimal::ONE {
                    return Err(MembershipError::Validation(format!(
                        "commission rate out of range: {}",
                        rate
                    )));
                }
            }
        }

        Ok(())
    }

    /// Classify a USD value. Both thresholds are inclusive.
    pub fn tier_for_usd(&self, usd_value: Decimal) -> Tier {
        if usd_value >= self.global_partner_threshold {
            Tier::GlobalPartner
        } else if usd_value >= self.market_partner_threshold {
            Tier::MarketPartner
        } else {
            Tier::Normal
        }
    }

    pub fn classify(&self, balance: Decimal, price: Decimal) -> Tier {
        self.tier_for_usd(balance * price)
    }

    pub fn rates_for(&self, tier: Tier) -> CommissionRates {
        if tier.is_partner() {
            self.partner_rates
        } else {
            self.normal_rates
        }
    }
}

/// Classify with the default thresholds
pub fn classify_tier(balance: Decimal, price: Decimal) -> Tier {
    TierPolicy::default().classify(balance, price)
}
