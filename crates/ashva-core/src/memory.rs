use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::address::Address;
use crate::error::{MembershipError, MembershipResult};
use crate::store::WalletStore;
use crate::types::{
    checked_sum, CommissionLevel, CommissionRecord, HierarchyEdge, Node, NodeStatus, ParentAssignment, Wallet,
    WalletUpsert, WithdrawalRecord, WithdrawalResolution, WithdrawalStatus,
};

#[derive(Default)]
struct MemoryState {
    wallets: HashMap<Address, Wallet>,
    edges: Vec<HierarchyEdge>,
    commissions: Vec<CommissionRecord>,
    commission_keys: HashMap<(String, CommissionLevel), Uuid>,
    withdrawals: HashMap<Uuid, WithdrawalRecord>,
    nodes: HashMap<Uuid, Node>,
    nodes_by_tx: HashMap<String, Uuid>,
}

impl MemoryState {
    fn wallet_mut(&mut self, address: &Address) -> MembershipResult<&mut Wallet> {
        self.wallets
            .get_mut(address)
            .ok_or_else(|| MembershipError::NotFound(format!("wallet {}", address)))
    }

    fn credit(&mut self, address: &Address, delta: Decimal, at: DateTime<Utc>) -> MembershipResult<()> {
        let wallet = self.wallet_mut(address)?;
        wallet.earnings = checked_sum(wallet.earnings, delta)?;
        wallet.updated_at = at;
        Ok(())
    }

    /// Whether `candidate` is `start` or one of its ancestors
    fn is_upline(&self, candidate: &Address, start: &Address) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(address) = current {
            if address == candidate {
                return true;
            }
            if !seen.insert(address) {
                return false;
            }
            current = self.wallets.get(address).and_then(|w| w.parent.as_ref());
        }
        false
    }
}

/// In-memory wallet store for tests and local development.
///
/// A single lock guards all state, so every trait method is atomic.
#[derive(Default)]
pub struct InMemoryWalletStore {
    state: RwLock<MemoryState>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hierarchy edges in insertion order
    pub async fn edges(&self) -> Vec<HierarchyEdge> {
        self.state.read().await.edges.clone()
    }

    /// Overwrite a node's creation time
    pub async fn backdate_node(&self, id: Uuid, created_at: DateTime<Utc>) -> MembershipResult<()> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or_else(|| MembershipError::NotFound(format!("node {}", id)))?;
        node.created_at = created_at;
        Ok(())
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn get_wallet(&self, address: &Address) -> MembershipResult<Option<Wallet>> {
        Ok(self.state.read().await.wallets.get(address).cloned())
    }

    async fn upsert_wallet(&self, update: &WalletUpsert) -> MembershipResult<Wallet> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let wallet = state
            .wallets
            .entry(update.address.clone())
            .or_insert_with(|| Wallet {
                address: update.address.clone(),
                balance: Decimal::ZERO,
                usd_value: Decimal::ZERO,
                tier: update.tier,
                parent: None,
                earnings: Decimal::ZERO,
                rates: update.rates,
                created_at: now,
                updated_at: now,
            });

        wallet.balance = update.balance;
        wallet.usd_value = update.usd_value;
        wallet.tier = update.tier;
        wallet.rates = update.rates;
        wallet.updated_at = now;

        Ok(wallet.clone())
    }

    async fn attach_parent(
        &self,
        child: &Address,
        parent: &Address,
    ) -> MembershipResult<ParentAssignment> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        match state.wallets.get(child) {
            None => return Ok(ParentAssignment::MissingChild),
            Some(wallet) => {
                if let Some(existing) = &wallet.parent {
                    return Ok(ParentAssignment::Locked(existing.clone()));
                }
            }
        }

        if state.is_upline(child, parent) {
            return Ok(ParentAssignment::Cycle);
        }

        let wallet = state.wallet_mut(child)?;
        wallet.parent = Some(parent.clone());
        wallet.updated_at = now;
        state.edges.push(HierarchyEdge {
            parent: parent.clone(),
            child: child.clone(),
            created_at: now,
        });

        Ok(ParentAssignment::Attached)
    }

    async fn children(&self, parent: &Address) -> MembershipResult<Vec<Address>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|edge| &edge.parent == parent)
            .map(|edge| edge.child.clone())
            .collect())
    }

    async fn increment_earnings(&self, address: &Address, delta: Decimal) -> MembershipResult<()> {
        let mut state = self.state.write().await;
        state.credit(address, delta, Utc::now())
    }

    async fn debit_earnings(&self, address: &Address, delta: Decimal) -> MembershipResult<()> {
        let mut state = self.state.write().await;
        let wallet = state.wallet_mut(address)?;
        if wallet.earnings < delta {
            return Err(MembershipError::InsufficientBalance(format!(
                "wallet {} has {} available, {} requested",
                address, wallet.earnings, delta
            )));
        }
        wallet.earnings -= delta;
        wallet.updated_at = Utc::now();
        Ok(())
    }

    async fn record_commission(&self, record: &CommissionRecord) -> MembershipResult<bool> {
        let mut state = self.state.write().await;
        let key = (record.source_tx.clone(), record.level);
        if state.commission_keys.contains_key(&key) {
            return Ok(false);
        }

        state.credit(&record.recipient, record.amount, Utc::now())?;

        state.commission_keys.insert(key, record.id);
        state.commissions.push(record.clone());
        Ok(true)
    }

    async fn commissions_for(&self, recipient: &Address) -> MembershipResult<Vec<CommissionRecord>> {
        let state = self.state.read().await;
        let records = state
            .commissions
            .iter()
            .filter(|record| &record.recipient == recipient)
            .cloned()
            .collect();
        Ok(newest_first(records, |record| record.created_at))
    }

    async fn create_withdrawal(&self, record: &WithdrawalRecord) -> MembershipResult<()> {
        let mut state = self.state.write().await;
        if state.withdrawals.contains_key(&record.id) {
            return Err(MembershipError::Validation(format!(
                "duplicate withdrawal id {}",
                record.id
            )));
        }

        let wallet = state.wallet_mut(&record.wallet)?;
        if wallet.earnings < record.amount {
            return Err(MembershipError::InsufficientBalance(format!(
                "wallet {} has {} available, {} requested",
                record.wallet, wallet.earnings, record.amount
            )));
        }
        wallet.earnings -= record.amount;
        wallet.updated_at = Utc::now();

        state.withdrawals.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> MembershipResult<Option<WithdrawalRecord>> {
        Ok(self.state.read().await.withdrawals.get(&id).cloned())
    }

    async fn withdrawals_for(&self, wallet: &Address) -> MembershipResult<Vec<WithdrawalRecord>> {
        let state = self.state.read().await;
        let records = state
            .withdrawals
            .values()
            .filter(|record| &record.wallet == wallet)
            .cloned()
            .collect();
        Ok(newest_first(records, |record| record.created_at))
    }

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> MembershipResult<Vec<WithdrawalRecord>> {
        let state = self.state.read().await;
        let records = state
            .withdrawals
            .values()
            .filter(|record| status.map_or(true, |s| record.status == s))
            .cloned()
            .collect();
        Ok(newest_first(records, |record| record.created_at))
    }

    async fn resolve_withdrawal(
        &self,
        id: Uuid,
        resolution: &WithdrawalResolution,
        processed_at: DateTime<Utc>,
    ) -> MembershipResult<WithdrawalRecord> {
        let mut state = self.state.write().await;

        let record = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| MembershipError::NotFound(format!("withdrawal {}", id)))?;

        if record.status != WithdrawalStatus::Pending {
            return Err(MembershipError::InvalidState(format!(
                "withdrawal {} is already {}",
                id, record.status
            )));
        }

        let mut updated = record;
        updated.status = resolution.target_status();
        updated.processed_at = Some(processed_at);
        match resolution {
            WithdrawalResolution::Approve { tx_hash } => {
                updated.tx_hash = Some(tx_hash.clone());
            }
            WithdrawalResolution::Reject { reason } => {
                updated.reject_reason = Some(reason.clone());
                state.credit(&updated.wallet, updated.amount, processed_at)?;
            }
        }

        state.withdrawals.insert(id, updated.clone());
        Ok(updated)
    }

    async fn insert_node(&self, node: &Node) -> MembershipResult<Node> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .nodes_by_tx
            .get(&node.tx_ref)
            .and_then(|id| state.nodes.get(id))
        {
            return Ok(existing.clone());
        }

        state.nodes_by_tx.insert(node.tx_ref.clone(), node.id);
        state.nodes.insert(node.id, node.clone());
        Ok(node.clone())
    }

    async fn nodes_for(&self, owner: &Address) -> MembershipResult<Vec<Node>> {
        let state = self.state.read().await;
        let nodes = state
            .nodes
            .values()
            .filter(|node| &node.owner == owner)
            .cloned()
            .collect();
        Ok(newest_first(nodes, |node| node.created_at))
    }

    async fn promote_deployed_nodes(&self, cutoff: DateTime<Utc>) -> MembershipResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut promoted = 0;

        for node in state.nodes.values_mut() {
            if node.status == NodeStatus::Deploying && node.created_at <= cutoff {
                node.status = NodeStatus::Active;
                node.updated_at = now;
                promoted += 1;
            }
        }

        Ok(promoted)
    }
}
