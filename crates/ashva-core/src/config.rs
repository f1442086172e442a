use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::{MembershipError, MembershipResult};
use crate::tier::TierPolicy;

/// Deepest referral level walked by ancestry and downline queries
pub const MAX_REFERRAL_DEPTH: usize = 50;

/// Hours a purchased node spends deploying before it is promoted
pub const NODE_DEPLOYMENT_HOURS: i64 = 24;

/// Engine parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tiers: TierPolicy,

    /// Fraction of each withdrawal that is burned, in `[0, 1]`
    pub burn_rate: Decimal,

    /// Smallest withdrawal accepted, in USD
    pub min_withdraw_usd: Decimal,

    pub max_referral_depth: usize,

    pub node_deployment_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tiers: TierPolicy::default(),
            burn_rate: Decimal::new(5, 2),
            min_withdraw_usd: Decimal::TEN,
            max_referral_depth: MAX_REFERRAL_DEPTH,
            node_deployment_window: Duration::hours(NODE_DEPLOYMENT_HOURS),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> MembershipResult<()> {
        self.tiers.validate()?;

        if self.burn_rate < Decimal::ZERO || self.burn_rate > Decimal::ONE {
            return Err(MembershipError::Validation(format!(
                "burn rate must be within [0, 1], got {}",
                self.burn_rate
            )));
        }

        if self.min_withdraw_usd < Decimal::ZERO {
            return Err(MembershipError::Validation(
                "minimum withdrawal must not be negative".to_string(),
            ));
        }

        if self.max_referral_depth == 0 {
            return Err(MembershipError::Validation(
                "referral depth must be at least 1".to_string(),
            ));
        }

        if self.node_deployment_window < Duration::zero() {
            return Err(MembershipError::Validation(
                "node deployment window must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
