use ashva_core::{
    Address, CommissionLevel, EngineConfig, InMemoryWalletStore, MembershipEngine,
    MembershipError, NodePurchase, NodeSpecs, NodeStatus, NodeType, PurchaseEvent, PurchaseKind,
    StaticPriceOracle, Tier, WalletStore, WithdrawalStatus,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

fn addr(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

fn setup(price: Decimal) -> (Arc<InMemoryWalletStore>, MembershipEngine) {
    let store = Arc::new(InMemoryWalletStore::new());
    let engine = MembershipEngine::new(
        store.clone(),
        Arc::new(StaticPriceOracle::new(price)),
        EngineConfig::default(),
    )
    .unwrap();
    (store, engine)
}

/// A <- B <- C, all normal members
async fn chain(engine: &MembershipEngine) {
    engine.connect_wallet(A, dec!(10), None).await.unwrap();
    engine.connect_wallet(B, dec!(10), Some(A)).await.unwrap();
    engine.connect_wallet(C, dec!(10), Some(B)).await.unwrap();
}

fn purchase(buyer: &str, amount: Decimal, tx: &str) -> PurchaseEvent {
    PurchaseEvent {
        buyer: addr(buyer),
        amount,
        source_tx: tx.to_string(),
        kind: PurchaseKind::Purchase,
    }
}

#[tokio::test]
async fn sync_classifies_large_holder_as_global_partner() {
    let (_, engine) = setup(dec!(0.25));
    let wallet = engine.connect_wallet("0x0000000000000000000000000000000000000abc", dec!(50000), None)
        .await
        .unwrap();

    assert_eq!(wallet.usd_value, dec!(12500));
    assert_eq!(wallet.tier, Tier::GlobalPartner);
    assert_eq!(wallet.rates.direct, dec!(0.25));
    assert_eq!(wallet.rates.indirect, dec!(0.25));

    // Reclassifying at the same tier leaves the rates alone
    let again = engine.sync_wallet(&wallet.address, dec!(60000)).await.unwrap();
    assert_eq!(again.tier, Tier::GlobalPartner);
    assert_eq!(again.rates, wallet.rates);

    // Dropping below the threshold resets to baseline rates
    let demoted = engine.sync_wallet(&wallet.address, dec!(100)).await.unwrap();
    assert_eq!(demoted.tier, Tier::Normal);
    assert_eq!(demoted.rates.direct, dec!(0.03));
    assert_eq!(demoted.rates.indirect, dec!(0.02));
}

#[tokio::test]
async fn sync_preserves_parent_and_earnings() {
    let (store, engine) = setup(dec!(1));
    chain(&engine).await;
    store.increment_earnings(&addr(C), dec!(7)).await.unwrap();

    let wallet = engine.sync_wallet(&addr(C), dec!(5000)).await.unwrap();
    assert_eq!(wallet.tier, Tier::MarketPartner);
    assert_eq!(wallet.parent, Some(addr(B)));
    assert_eq!(wallet.earnings, dec!(7));
}

#[tokio::test]
async fn purchase_fans_out_to_parent_and_grandparent() {
    let (_, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let credited = engine
        .distribute_commission(&purchase(C, dec!(1000), "0xtx-1"))
        .await
        .unwrap();

    assert_eq!(credited.len(), 2);
    assert_eq!(credited[0].recipient, addr(B));
    assert_eq!(credited[0].level, CommissionLevel::Direct);
    assert_eq!(credited[0].amount, dec!(30));
    assert_eq!(credited[1].recipient, addr(A));
    assert_eq!(credited[1].level, CommissionLevel::Indirect);
    assert_eq!(credited[1].amount, dec!(20));

    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(30));
    assert_eq!(engine.wallet(A).await.unwrap().earnings, dec!(20));
    assert_eq!(engine.wallet(C).await.unwrap().earnings, Decimal::ZERO);

    let ledger = engine.commissions_for(B).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].source, addr(C));
    assert_eq!(ledger[0].source_tx, "0xtx-1");
}

#[tokio::test]
async fn rates_follow_the_buyers_tier() {
    let (_, engine) = setup(dec!(1));
    chain(&engine).await;
    engine.sync_wallet(&addr(C), dec!(3000)).await.unwrap();

    let credited = engine
        .distribute_commission(&purchase(C, dec!(100), "0xtx-partner"))
        .await
        .unwrap();

    assert_eq!(credited[0].amount, dec!(25));
    assert_eq!(credited[1].amount, dec!(25));
}

#[tokio::test]
async fn parent_without_grandparent_gets_only_level_one() {
    let (_, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let credited = engine
        .distribute_commission(&purchase(B, dec!(1000), "0xtx-2"))
        .await
        .unwrap();

    assert_eq!(credited.len(), 1);
    assert_eq!(credited[0].recipient, addr(A));
    assert_eq!(credited[0].level, CommissionLevel::Direct);

    let orphan = engine
        .distribute_commission(&purchase(A, dec!(1000), "0xtx-3"))
        .await
        .unwrap();
    assert!(orphan.is_empty());
}

#[tokio::test]
async fn replayed_purchase_is_not_credited_twice() {
    let (_, engine) = setup(dec!(0.1));
    chain(&engine).await;
    let event = purchase(C, dec!(1000), "0xtx-replay");

    assert_eq!(engine.distribute_commission(&event).await.unwrap().len(), 2);
    assert!(engine.distribute_commission(&event).await.unwrap().is_empty());

    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(30));
    assert_eq!(engine.commissions_for(A).await.unwrap().len(), 1);
}

#[tokio::test]
async fn purchase_validation() {
    let (_, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let zero = engine.distribute_commission(&purchase(C, Decimal::ZERO, "0xtx")).await;
    assert!(matches!(zero, Err(MembershipError::Validation(_))));

    let no_ref = engine.distribute_commission(&purchase(C, dec!(5), "  ")).await;
    assert!(matches!(no_ref, Err(MembershipError::Validation(_))));

    let unknown = engine
        .distribute_commission(&purchase("0x1111111111111111111111111111111111111111", dec!(5), "0xtx"))
        .await;
    assert!(matches!(unknown, Err(MembershipError::NotFound(_))));
}

#[tokio::test]
async fn withdrawal_worked_example() {
    let (store, engine) = setup(dec!(0.30));
    chain(&engine).await;
    store.increment_earnings(&addr(B), dec!(100)).await.unwrap();

    let record = engine.request_withdrawal(B, dec!(40)).await.unwrap();
    assert_eq!(record.usd_value, dec!(12));
    assert_eq!(record.burn_rate, dec!(0.05));
    assert_eq!(record.burn_amount, dec!(2));
    assert_eq!(record.actual_amount, dec!(38));
    assert_eq!(record.status, WithdrawalStatus::Pending);
    assert_eq!(record.burn_amount + record.actual_amount, record.amount);

    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(60));
}

#[tokio::test]
async fn withdrawal_below_minimum_is_rejected() {
    let (store, engine) = setup(dec!(0.30));
    chain(&engine).await;
    store.increment_earnings(&addr(B), dec!(100)).await.unwrap();

    let result = engine.request_withdrawal(B, dec!(20)).await;
    assert!(matches!(result, Err(MembershipError::InsufficientAmount(_))));
    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(100));
}

#[tokio::test]
async fn withdrawal_above_earnings_is_rejected() {
    let (store, engine) = setup(dec!(0.30));
    chain(&engine).await;
    store.increment_earnings(&addr(B), dec!(50)).await.unwrap();

    let result = engine.request_withdrawal(B, dec!(51)).await;
    assert!(matches!(result, Err(MembershipError::InsufficientBalance(_))));

    let negative = engine.request_withdrawal(B, dec!(-1)).await;
    assert!(matches!(negative, Err(MembershipError::Validation(_))));
}

#[tokio::test]
async fn concurrent_withdrawals_never_overdraw() {
    let (store, engine) = setup(dec!(1));
    chain(&engine).await;
    store.increment_earnings(&addr(B), dec!(100)).await.unwrap();

    let attempts = (0..5).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.request_withdrawal(B, dec!(30)).await })
    });
    let results = futures::future::join_all(attempts).await;

    let succeeded = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(10));
}

#[tokio::test]
async fn rejection_refunds_the_pre_burn_amount() {
    let (store, engine) = setup(dec!(0.30));
    chain(&engine).await;
    store.increment_earnings(&addr(B), dec!(100)).await.unwrap();

    let record = engine.request_withdrawal(B, dec!(40)).await.unwrap();
    let rejected = engine
        .reject_withdrawal(record.id, Some("address flagged"))
        .await
        .unwrap();

    assert_eq!(rejected.status, WithdrawalStatus::Failed);
    assert_eq!(rejected.reject_reason.as_deref(), Some("address flagged"));
    assert!(rejected.processed_at.is_some());
    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(100));
}

#[tokio::test]
async fn resolved_withdrawals_are_terminal() {
    let (store, engine) = setup(dec!(0.30));
    chain(&engine).await;
    store.increment_earnings(&addr(B), dec!(100)).await.unwrap();

    let first = engine.request_withdrawal(B, dec!(40)).await.unwrap();
    let approved = engine.approve_withdrawal(first.id, "0xsettled").await.unwrap();
    assert_eq!(approved.status, WithdrawalStatus::Completed);
    assert_eq!(approved.tx_hash.as_deref(), Some("0xsettled"));

    let reapprove = engine.approve_withdrawal(first.id, "0xagain").await;
    assert!(matches!(reapprove, Err(MembershipError::InvalidState(_))));
    let reject_after = engine.reject_withdrawal(first.id, None).await;
    assert!(matches!(reject_after, Err(MembershipError::InvalidState(_))));
    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(60));

    let second = engine.request_withdrawal(B, dec!(40)).await.unwrap();
    let rejected = engine.reject_withdrawal(second.id, None).await.unwrap();
    assert_eq!(rejected.reject_reason.as_deref(), Some("Rejected by administrator"));
    let approve_after = engine.approve_withdrawal(second.id, "0xlate").await;
    assert!(matches!(approve_after, Err(MembershipError::InvalidState(_))));

    let missing = engine.approve_withdrawal(uuid::Uuid::new_v4(), "0xhash").await;
    assert!(matches!(missing, Err(MembershipError::NotFound(_))));

    let no_hash = engine.approve_withdrawal(second.id, " ").await;
    assert!(matches!(no_hash, Err(MembershipError::Validation(_))));

    let pending = engine
        .list_withdrawals(Some(WithdrawalStatus::Pending))
        .await
        .unwrap();
    assert!(pending.is_empty());
    assert_eq!(engine.withdrawals_for(B).await.unwrap().len(), 2);
}

#[tokio::test]
async fn node_purchase_pays_commission_once() {
    let (_, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let order = NodePurchase {
        owner: addr(C),
        node_type: NodeType::Cloud,
        price: dec!(500),
        specs: NodeSpecs {
            cpu_cores: 4,
            memory_gb: 8,
            storage_gb: 100,
        },
        transferable: false,
        tx_ref: "0xnode-1".to_string(),
    };

    let first = engine.purchase_node(order.clone()).await.unwrap();
    assert_eq!(first.node.status, NodeStatus::Deploying);
    assert_eq!(first.commissions.len(), 2);
    assert_eq!(first.commissions[0].tx_type, PurchaseKind::NodePurchase);

    let replay = engine.purchase_node(order).await.unwrap();
    assert_eq!(replay.node.id, first.node.id);
    assert!(replay.commissions.is_empty());

    assert_eq!(engine.nodes_for(C).await.unwrap().len(), 1);
    assert_eq!(engine.wallet(B).await.unwrap().earnings, dec!(15));
    assert_eq!(engine.wallet(A).await.unwrap().earnings, dec!(10));
}

#[tokio::test]
async fn sweep_promotes_only_expired_deployments() {
    let (store, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let mut ids = Vec::new();
    for tx in ["0xold", "0xnew"] {
        let outcome = engine
            .purchase_node(NodePurchase {
                owner: addr(A),
                node_type: NodeType::Image,
                price: dec!(100),
                specs: NodeSpecs::default(),
                transferable: true,
                tx_ref: tx.to_string(),
            })
            .await
            .unwrap();
        ids.push(outcome.node.id);
    }

    let now = Utc::now();
    store.backdate_node(ids[0], now - Duration::hours(25)).await.unwrap();

    assert_eq!(engine.sweep_deployments(now).await.unwrap(), 1);
    assert_eq!(engine.sweep_deployments(now).await.unwrap(), 0);

    let nodes = engine.nodes_for(A).await.unwrap();
    let status_of = |id: uuid::Uuid| nodes.iter().find(|n| n.id == id).map(|n| n.status);
    assert_eq!(status_of(ids[0]), Some(NodeStatus::Active));
    assert_eq!(status_of(ids[1]), Some(NodeStatus::Deploying));
}

#[tokio::test]
async fn referral_edges_mirror_parents() {
    let (store, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let edges = store.edges().await;
    assert_eq!(edges.len(), 2);
    assert_eq!((edges[0].parent.clone(), edges[0].child.clone()), (addr(A), addr(B)));
    assert_eq!((edges[1].parent.clone(), edges[1].child.clone()), (addr(B), addr(C)));

    let lock = engine.attach_referral(C, A).await;
    assert!(matches!(lock, Err(MembershipError::AlreadySet(_))));
    assert_eq!(store.edges().await.len(), 2);
}

#[tokio::test]
async fn oversized_balance_is_rejected_not_stored() {
    let (_, engine) = setup(dec!(2));

    let result = engine.connect_wallet(A, Decimal::MAX, None).await;
    assert!(matches!(result, Err(MembershipError::Validation(_))));
    assert!(matches!(engine.wallet(A).await, Err(MembershipError::NotFound(_))));
}

#[tokio::test]
async fn oversized_withdrawal_is_rejected() {
    let (store, engine) = setup(dec!(2));
    chain(&engine).await;
    store.increment_earnings(&addr(A), dec!(100)).await.unwrap();

    let result = engine.request_withdrawal(A, Decimal::MAX).await;
    assert!(matches!(result, Err(MembershipError::Validation(_))));
    assert_eq!(engine.wallet(A).await.unwrap().earnings, dec!(100));
    assert!(engine.withdrawals_for(A).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconnect_skips_referrer_lookup_once_assigned() {
    let (_, engine) = setup(dec!(0.1));
    chain(&engine).await;

    let unknown = engine
        .connect_wallet(C, dec!(20), Some("0x1111111111111111111111111111111111111111"))
        .await
        .unwrap();
    assert_eq!(unknown.parent, Some(addr(B)));
    assert_eq!(unknown.balance, dec!(20));

    let garbage = engine.connect_wallet(C, dec!(30), Some("not-a-wallet")).await.unwrap();
    assert_eq!(garbage.parent, Some(addr(B)));

    // Unassigned wallets still get their referrer checked
    let fresh = engine
        .connect_wallet("0x2222222222222222222222222222222222222222", dec!(1), Some("0x1111111111111111111111111111111111111111"))
        .await;
    assert!(matches!(fresh, Err(MembershipError::NotFound(_))));
}
