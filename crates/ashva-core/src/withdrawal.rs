//! Withdrawal requests and their admin resolution.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

use crate::address::Address;
use crate::engine::MembershipEngine;
use crate::error::{MembershipError, MembershipResult};
use crate::types::{
    checked_product, round_amount, WithdrawalRecord, WithdrawalResolution, WithdrawalStatus,
};

const DEFAULT_REJECT_REASON: &str = "Rejected by administrator";

/// Burned and paid-out parts of a withdrawal. They always sum to the
/// requested amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnSplit {
    pub burn_amount: Decimal,
    pub actual_amount: Decimal,
}

pub fn split_burn(amount: Decimal, burn_rate: Decimal) -> MembershipResult<BurnSplit> {
    let burn_amount = round_amount(checked_product(amount, burn_rate)?);
    Ok(BurnSplit {
        burn_amount,
        actual_amount: amount - burn_amount,
    })
}

impl MembershipEngine {
    /// Open a pending withdrawal and debit the wallet's earnings
    pub async fn request_withdrawal(
        &self,
        wallet: &str,
        amount: Decimal,
    ) -> MembershipResult<WithdrawalRecord> {
        let address = Address::parse(wallet)?;
        if amount <= Decimal::ZERO {
            return Err(MembershipError::Validation(format!(
                "withdrawal amount must be positive, got {}",
                amount
            )));
        }

        let price = self.current_price().await?;
        let usd_value = checked_product(amount, price)?;
        if usd_value < self.config.min_withdraw_usd {
            return Err(MembershipError::InsufficientAmount(format!(
                "{} tokens is ${}, minimum is ${}",
                amount, usd_value, self.config.min_withdraw_usd
            )));
        }

        let account = self.require_wallet(&address).await?;
        if amount > account.earnings {
            return Err(MembershipError::InsufficientBalance(format!(
                "wallet {} has {} available, {} requested",
                address, account.earnings, amount
            )));
        }

        let split = split_burn(amount, self.config.burn_rate)?;
        let record = WithdrawalRecord {
            id: Uuid::new_v4(),
            wallet: address.clone(),
            amount,
            usd_value,
            burn_rate: self.config.burn_rate,
            burn_amount: split.burn_amount,
            actual_amount: split.actual_amount,
            status: WithdrawalStatus::Pending,
            tx_hash: None,
            reject_reason: None,
            created_at: Utc::now(),
            processed_at: None,
        };

        self.store.create_withdrawal(&record).await.map_err(|e| {
            if !matches!(e, MembershipError::InsufficientBalance(_)) {
                error!("Failed to create withdrawal for {} of {}: {}", address, amount, e);
            }
            e
        })?;

        info!(
            "Withdrawal {} requested by {}: {} (burn {}, payout {})",
            record.id, address, amount, record.burn_amount, record.actual_amount
        );
        Ok(record)
    }

    /// Mark a pending withdrawal as paid
    pub async fn approve_withdrawal(
        &self,
        id: Uuid,
        tx_hash: &str,
    ) -> MembershipResult<WithdrawalRecord> {
        let tx_hash = tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(MembershipError::Validation(
                "settlement transaction hash is required".to_string(),
            ));
        }

        self.resolve(
            id,
            WithdrawalResolution::Approve {
                tx_hash: tx_hash.to_string(),
            },
        )
        .await
    }

    /// Mark a pending withdrawal as failed and refund the full requested
    /// amount, burn included
    pub async fn reject_withdrawal(
        &self,
        id: Uuid,
        reason: Option<&str>,
    ) -> MembershipResult<WithdrawalRecord> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REJECT_REASON);

        self.resolve(
            id,
            WithdrawalResolution::Reject {
                reason: reason.to_string(),
            },
        )
        .await
    }

    async fn resolve(
        &self,
        id: Uuid,
        resolution: WithdrawalResolution,
    ) -> MembershipResult<WithdrawalRecord> {
        let current = self
            .store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| MembershipError::NotFound(format!("withdrawal {}", id)))?;

        if current.status.is_terminal() {
            return Err(MembershipError::InvalidState(format!(
                "withdrawal {} is already {}",
                id, current.status
            )));
        }

        let record = self
            .store
            .resolve_withdrawal(id, &resolution, Utc::now())
            .await
            .map_err(|e| {
                if matches!(e, MembershipError::Storage(_)) {
                    error!("Failed to resolve withdrawal {} for {}: {}", id, current.wallet, e);
                }
                e
            })?;

        match &resolution {
            WithdrawalResolution::Approve { tx_hash } => {
                info!("Withdrawal {} completed with tx {}", id, tx_hash)
            }
            WithdrawalResolution::Reject { reason } => info!(
                "Withdrawal {} rejected, refunded {} to {}: {}",
                id, record.amount, record.wallet, reason
            ),
        }

        Ok(record)
    }

    pub async fn withdrawal(&self, id: Uuid) -> MembershipResult<WithdrawalRecord> {
        self.store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| MembershipError::NotFound(format!("withdrawal {}", id)))
    }

    pub async fn withdrawals_for(&self, wallet: &str) -> MembershipResult<Vec<WithdrawalRecord>> {
        let wallet = Address::parse(wallet)?;
        self.store.withdrawals_for(&wallet).await
    }

    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> MembershipResult<Vec<WithdrawalRecord>> {
        self.store.list_withdrawals(status).await
    }
}
