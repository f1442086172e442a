//! Node purchases and the deployment sweep.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::address::Address;
use crate::engine::MembershipEngine;
use crate::error::{MembershipError, MembershipResult};
use crate::types::{
    CommissionRecord, Node, NodeSpecs, NodeStatus, NodeType, PurchaseEvent, PurchaseKind,
};

/// A confirmed node purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePurchase {
    pub owner: Address,
    pub node_type: NodeType,
    pub price: Decimal,
    #[serde(default)]
    pub specs: NodeSpecs,
    #[serde(default)]
    pub transferable: bool,
    /// Purchase transaction reference
    pub tx_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePurchaseOutcome {
    pub node: Node,
    /// Commissions credited by this call
    pub commissions: Vec<CommissionRecord>,
}

impl MembershipEngine {
    /// Provision a node for a confirmed purchase and pay referral commission.
    ///
    /// Both steps are keyed by `tx_ref`, so a replayed purchase returns the
    /// original node and credits nothing.
    pub async fn purchase_node(&self, purchase: NodePurchase) -> MembershipResult<NodePurchaseOutcome> {
        if purchase.price <= Decimal::ZERO {
            return Err(MembershipError::Validation(format!(
                "node price must be positive, got {}",
                purchase.price
            )));
        }
        let tx_ref = purchase.tx_ref.trim();
        if tx_ref.is_empty() {
            return Err(MembershipError::Validation(
                "purchase transaction reference is required".to_string(),
            ));
        }

        self.require_wallet(&purchase.owner).await?;

        let now = Utc::now();
        let candidate = Node {
            id: Uuid::new_v4(),
            owner: purchase.owner.clone(),
            node_type: purchase.node_type,
            status: NodeStatus::Deploying,
            price: purchase.price,
            specs: purchase.specs,
            earnings: Decimal::ZERO,
            transferable: purchase.transferable,
            tx_ref: tx_ref.to_string(),
            created_at: now,
            updated_at: now,
        };

        let node = self.store.insert_node(&candidate).await?;
        if node.id == candidate.id {
            info!(
                "Provisioned {} node {} for {} at {}",
                node.node_type, node.id, node.owner, node.price
            );
        } else {
            debug!("Purchase {} already provisioned node {}", tx_ref, node.id);
        }

        let commissions = self
            .distribute_commission(&PurchaseEvent {
                buyer: node.owner.clone(),
                amount: node.price,
                source_tx: node.tx_ref.clone(),
                kind: PurchaseKind::NodePurchase,
            })
            .await?;

        Ok(NodePurchaseOutcome { node, commissions })
    }

    pub async fn nodes_for(&self, owner: &str) -> MembershipResult<Vec<Node>> {
        let owner = Address::parse(owner)?;
        self.store.nodes_for(&owner).await
    }

    /// Promote nodes whose deployment window has elapsed by `now`.
    /// Safe to run repeatedly or concurrently.
    pub async fn sweep_deployments(&self, now: DateTime<Utc>) -> MembershipResult<u64> {
        let cutoff = now - self.config.node_deployment_window;
        let promoted = self.store.promote_deployed_nodes(cutoff).await?;
        if promoted > 0 {
            info!("Activated {} deployed nodes", promoted);
        } else {
            debug!("No nodes ready for activation");
        }
        Ok(promoted)
    }
}
