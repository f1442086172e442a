//! Persistence seam for the membership engine.
//!
//! Every method is a single atomic unit. Implementations must apply balance
//! changes as deltas against the stored value, never as a value computed
//! from an earlier read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::address::Address;
use crate::error::MembershipResult;
use crate::types::{
    CommissionRecord, Node, ParentAssignment, Wallet, WalletUpsert, WithdrawalRecord,
    WithdrawalResolution, WithdrawalStatus,
};

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Fetch a wallet by address
    async fn get_wallet(&self, address: &Address) -> MembershipResult<Option<Wallet>>;

    /// Create the wallet or update its balance, tier and rates.
    /// New wallets start unassigned with zero earnings.
    async fn upsert_wallet(&self, update: &WalletUpsert) -> MembershipResult<Wallet>;

    /// Set the parent and insert the hierarchy edge, only if the child is
    /// still unassigned
    async fn attach_parent(
        &self,
        child: &Address,
        parent: &Address,
    ) -> MembershipResult<ParentAssignment>;

    /// Direct children of a wallet
    async fn children(&self, parent: &Address) -> MembershipResult<Vec<Address>>;

    /// Add to a wallet's earnings
    async fn increment_earnings(&self, address: &Address, delta: Decimal) -> MembershipResult<()>;

    /// Subtract from a wallet's earnings. Fails with `InsufficientBalance`
    /// if the result would be negative.
    async fn debit_earnings(&self, address: &Address, delta: Decimal) -> MembershipResult<()>;

    /// Append a commission record and credit the recipient.
    /// Returns `false` without writing if a record with the same
    /// `(source_tx, level)` already exists.
    async fn record_commission(&self, record: &CommissionRecord) -> MembershipResult<bool>;

    /// Commission ledger for a recipient, newest first
    async fn commissions_for(&self, recipient: &Address) -> MembershipResult<Vec<CommissionRecord>>;

    /// Debit the wallet by `record.amount` and insert the pending record
    async fn create_withdrawal(&self, record: &WithdrawalRecord) -> MembershipResult<()>;

    async fn get_withdrawal(&self, id: Uuid) -> MembershipResult<Option<WithdrawalRecord>>;

    /// Withdrawals for a wallet, newest first
    async fn withdrawals_for(&self, wallet: &Address) -> MembershipResult<Vec<WithdrawalRecord>>;

    /// All withdrawals, optionally filtered by status, newest first
    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> MembershipResult<Vec<WithdrawalRecord>>;

    /// Move a pending withdrawal to its terminal status. A rejection credits
    /// the full requested amount back to the wallet.
    /// Fails with `NotFound` or `InvalidState`.
    async fn resolve_withdrawal(
        &self,
        id: Uuid,
        resolution: &WithdrawalResolution,
        processed_at: DateTime<Utc>,
    ) -> MembershipResult<WithdrawalRecord>;

    /// Insert a node keyed by its purchase reference. If a node with the
    /// same `tx_ref` exists it is returned unchanged.
    async fn insert_node(&self, node: &Node) -> MembershipResult<Node>;

    async fn nodes_for(&self, owner: &Address) -> MembershipResult<Vec<Node>>;

    /// Promote `deploying` nodes created at or before `cutoff` to `active`.
    /// Returns the number promoted.
    async fn promote_deployed_nodes(&self, cutoff: DateTime<Utc>) -> MembershipResult<u64>;
}
