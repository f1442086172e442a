//! Two-level commission distribution.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::address::Address;
use crate::engine::MembershipEngine;
use crate::error::{MembershipError, MembershipResult};
use crate::types::{
    checked_product, round_amount, CommissionLevel, CommissionRates, CommissionRecord,
    PurchaseEvent,
};

/// A commission owed to one ancestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionShare {
    pub recipient: Address,
    pub level: CommissionLevel,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Split a purchase between the buyer's parent and grandparent using the
/// buyer's rates. Missing ancestors, ancestors equal to the buyer and zero
/// amounts produce no share.
pub fn commission_shares(
    buyer: &Address,
    amount: Decimal,
    rates: CommissionRates,
    parent: Option<&Address>,
    grandparent: Option<&Address>,
) -> MembershipResult<Vec<CommissionShare>> {
    let levels = [
        (parent, CommissionLevel::Direct, rates.direct),
        (grandparent.filter(|_| parent.is_some()), CommissionLevel::Indirect, rates.indirect),
    ];

    let mut shares = Vec::with_capacity(levels.len());
    for (recipient, level, rate) in levels {
        let Some(recipient) = recipient else {
            continue;
        };
        if recipient == buyer {
            warn!("Skipping level {} commission: {} is its own ancestor", level.as_u8(), buyer);
            continue;
        }

        let share = round_amount(checked_product(amount, rate)?);
        if share > Decimal::ZERO {
            shares.push(CommissionShare {
                recipient: recipient.clone(),
                level,
                rate,
                amount: share,
            });
        }
    }
    Ok(shares)
}

impl MembershipEngine {
    /// Credit the buyer's parent and grandparent for a purchase.
    ///
    /// Returns the records written by this call. Replaying an event with the
    /// same `source_tx` credits nothing and returns an empty list.
    pub async fn distribute_commission(
        &self,
        event: &PurchaseEvent,
    ) -> MembershipResult<Vec<CommissionRecord>> {
        if event.amount <= Decimal::ZERO {
            return Err(MembershipError::Validation(format!(
                "purchase amount must be positive, got {}",
                event.amount
            )));
        }
        let source_tx = event.source_tx.trim();
        if source_tx.is_empty() {
            return Err(MembershipError::Validation(
                "purchase transaction reference is required".to_string(),
            ));
        }

        let buyer = self.require_wallet(&event.buyer).await?;

        let parent = match &buyer.parent {
            Some(address) => self.store.get_wallet(address).await?,
            None => None,
        };
        let grandparent = match parent.as_ref().and_then(|p| p.parent.as_ref()) {
            Some(address) => self.store.get_wallet(address).await?,
            None => None,
        };

        let shares = commission_shares(
            &buyer.address,
            event.amount,
            buyer.rates,
            parent.as_ref().map(|w| &w.address),
            grandparent.as_ref().map(|w| &w.address),
        )?;

        let mut credited = Vec::with_capacity(shares.len());
        for share in shares {
            let record = CommissionRecord {
                id: Uuid::new_v4(),
                recipient: share.recipient,
                source: buyer.address.clone(),
                amount: share.amount,
                rate: share.rate,
                level: share.level,
                tx_type: event.kind,
                source_tx: source_tx.to_string(),
                created_at: Utc::now(),
            };

            let applied = self.store.record_commission(&record).await.map_err(|e| {
                error!(
                    "Failed to record level {} commission for {} from {} ({}): {}",
                    record.level.as_u8(),
                    record.recipient,
                    record.source,
                    source_tx,
                    e
                );
                e
            })?;

            if applied {
                info!(
                    "Credited {} to {} (level {}) for purchase {} by {}",
                    record.amount,
                    record.recipient,
                    record.level.as_u8(),
                    source_tx,
                    record.source
                );
                credited.push(record);
            } else {
                debug!(
                    "Level {} commission for purchase {} already recorded",
                    record.level.as_u8(),
                    source_tx
                );
            }
        }

        Ok(credited)
    }

    pub async fn commissions_for(&self, recipient: &str) -> MembershipResult<Vec<CommissionRecord>> {
        let recipient = Address::parse(recipient)?;
        self.store.commissions_for(&recipient).await
    }
}
