//! Referral attachment and bounded tree walks.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{info, warn};

use crate::address::Address;
use crate::engine::MembershipEngine;
use crate::error::{MembershipError, MembershipResult};
use crate::types::{ParentAssignment, Wallet};

/// A wallet below another in the referral tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlineEntry {
    pub address: Address,
    /// 1 for direct referrals
    pub depth: usize,
}

fn parse_referrer(referrer: Option<&str>) -> MembershipResult<Option<Address>> {
    referrer
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(Address::parse)
        .transpose()
}

fn reject_self_referral(child: &Address, referrer: &Address) -> MembershipResult<()> {
    if child == referrer {
        return Err(MembershipError::Validation(format!(
            "wallet {} cannot refer itself",
            child
        )));
    }
    Ok(())
}

impl MembershipEngine {
    /// First-connection flow: sync the wallet and, if it is still
    /// unassigned, attach it beneath `referrer`.
    ///
    /// A referrer supplied for a wallet that already has a parent is ignored
    /// without being validated, since wallets reconnect on every visit.
    pub async fn connect_wallet(
        &self,
        address: &str,
        balance: Decimal,
        referrer: Option<&str>,
    ) -> MembershipResult<Wallet> {
        let address = Address::parse(address)?;
        let assigned = self
            .store
            .get_wallet(&address)
            .await?
            .is_some_and(|wallet| !wallet.is_unassigned());
        let referrer = if assigned {
            None
        } else {
            parse_referrer(referrer)?
        };

        if let Some(referrer) = &referrer {
            reject_self_referral(&address, referrer)?;
            self.require_wallet(referrer).await?;
        }

        let wallet = self.sync_wallet(&address, balance).await?;

        match referrer {
            Some(referrer) if wallet.is_unassigned() => {
                self.attach(&address, &referrer).await?;
                self.require_wallet(&address).await
            }
            _ => Ok(wallet),
        }
    }

    /// Set the referral parent of an existing wallet.
    ///
    /// Fails with `AlreadySet` once the wallet has a parent.
    pub async fn attach_referral(&self, child: &str, referrer: &str) -> MembershipResult<Wallet> {
        let child = Address::parse(child)?;
        let referrer = Address::parse(referrer)?;
        reject_self_referral(&child, &referrer)?;

        self.attach(&child, &referrer).await?;
        self.require_wallet(&child).await
    }

    /// The cycle check runs inside the store's atomic parent assignment, so
    /// two crossing attaches cannot both succeed.
    async fn attach(&self, child: &Address, referrer: &Address) -> MembershipResult<()> {
        self.require_wallet(referrer).await?;

        match self.store.attach_parent(child, referrer).await? {
            ParentAssignment::Attached => {
                info!("Attached wallet {} beneath {}", child, referrer);
                Ok(())
            }
            ParentAssignment::Locked(existing) => {
                warn!(
                    "Rejected referral change for {}: locked to {}, requested {}",
                    child, existing, referrer
                );
                Err(MembershipError::AlreadySet(format!(
                    "wallet {} is already referred by {}",
                    child, existing
                )))
            }
            ParentAssignment::MissingChild => {
                Err(MembershipError::NotFound(format!("wallet {}", child)))
            }
            ParentAssignment::Cycle => Err(MembershipError::Validation(format!(
                "wallet {} is already upline of {}",
                child, referrer
            ))),
        }
    }

    /// Referral ancestors of a wallet, nearest first, at most `max_depth` long
    pub async fn ancestors(&self, address: &str, max_depth: usize) -> MembershipResult<Vec<Address>> {
        let address = Address::parse(address)?;
        self.require_wallet(&address).await?;
        let depth = max_depth.min(self.config.max_referral_depth);
        self.walk_ancestors(&address, depth).await
    }

    pub(crate) async fn walk_ancestors(
        &self,
        address: &Address,
        max_depth: usize,
    ) -> MembershipResult<Vec<Address>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([address.clone()]);
        let mut current = self.store.get_wallet(address).await?;

        while let Some(wallet) = current {
            if chain.len() >= max_depth {
                break;
            }
            let Some(parent) = wallet.parent else {
                break;
            };
            if !seen.insert(parent.clone()) {
                warn!("Referral cycle detected above {} at {}", address, parent);
                break;
            }
            current = self.store.get_wallet(&parent).await?;
            chain.push(parent);
        }

        Ok(chain)
    }

    /// Wallets referred directly or indirectly by `address`, breadth first,
    /// down to `max_depth` levels
    pub async fn downline(&self, address: &str, max_depth: usize) -> MembershipResult<Vec<DownlineEntry>> {
        let root = Address::parse(address)?;
        self.require_wallet(&root).await?;
        let max_depth = max_depth.min(self.config.max_referral_depth);

        let mut entries = Vec::new();
        let mut seen = HashSet::from([root.clone()]);
        let mut queue = VecDeque::from([(root, 0usize)]);

        while let Some((parent, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for child in self.store.children(&parent).await? {
                if seen.insert(child.clone()) {
                    entries.push(DownlineEntry {
                        address: child.clone(),
                        depth: depth + 1,
                    });
                    queue.push_back((child, depth + 1));
                }
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::memory::InMemoryWalletStore;
    use crate::oracle::StaticPriceOracle;
    use crate::store::WalletStore;
    use crate::tier::TierPolicy;
    use crate::types::{Tier, WalletUpsert};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const ALICE: &str = "0xa000000000000000000000000000000000000001";
    const BOB: &str = "0xb000000000000000000000000000000000000002";
    const CAROL: &str = "0xc000000000000000000000000000000000000003";

    fn engine() -> MembershipEngine {
        MembershipEngine::new(
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(StaticPriceOracle::new(dec!(0.1))),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn connect_without_referrer_leaves_wallet_unassigned() {
        let engine = engine();
        let wallet = engine.connect_wallet(ALICE, dec!(100), None).await.unwrap();
        assert!(wallet.is_unassigned());

        let blank = engine.connect_wallet(BOB, dec!(100), Some("  ")).await.unwrap();
        assert!(blank.is_unassigned());
    }

    #[tokio::test]
    async fn connect_with_referrer_attaches_once() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();
        engine.connect_wallet(CAROL, dec!(0), None).await.unwrap();

        let bob = engine.connect_wallet(BOB, dec!(0), Some(ALICE)).await.unwrap();
        assert_eq!(bob.parent.as_ref().map(Address::as_str), Some(ALICE));

        // Reconnecting with another referrer keeps the original parent
        let again = engine.connect_wallet(BOB, dec!(0), Some(CAROL)).await.unwrap();
        assert_eq!(again.parent.as_ref().map(Address::as_str), Some(ALICE));
    }

    #[tokio::test]
    async fn unassigned_wallet_can_be_attached_exactly_once() {
        let engine = engine();
        for addr in [ALICE, BOB, CAROL] {
            engine.connect_wallet(addr, dec!(0), None).await.unwrap();
        }

        engine.attach_referral(BOB, ALICE).await.unwrap();

        let second = engine.attach_referral(BOB, CAROL).await;
        assert!(matches!(second, Err(MembershipError::AlreadySet(_))));

        let same = engine.attach_referral(BOB, ALICE).await;
        assert!(matches!(same, Err(MembershipError::AlreadySet(_))));
    }

    #[tokio::test]
    async fn self_and_malformed_referrals_are_rejected() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();

        let own = engine.attach_referral(ALICE, &ALICE.to_uppercase().replace("0X", "0x")).await;
        assert!(matches!(own, Err(MembershipError::Validation(_))));

        let malformed = engine.attach_referral(ALICE, "0x1234").await;
        assert!(matches!(malformed, Err(MembershipError::Validation(_))));

        let on_connect = engine.connect_wallet(BOB, dec!(0), Some("bob")).await;
        assert!(matches!(on_connect, Err(MembershipError::Validation(_))));
        assert!(engine.store().get_wallet(&Address::parse(BOB).unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();
        engine.connect_wallet(BOB, dec!(0), Some(ALICE)).await.unwrap();
        engine.connect_wallet(CAROL, dec!(0), Some(BOB)).await.unwrap();

        // ALICE is unassigned but sits above CAROL
        let result = engine.attach_referral(ALICE, CAROL).await;
        assert!(matches!(result, Err(MembershipError::Validation(_))));
    }

    #[tokio::test]
    async fn crossing_attaches_cannot_both_succeed() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();
        engine.connect_wallet(BOB, dec!(0), None).await.unwrap();

        let (first, second) = futures::join!(
            engine.attach_referral(ALICE, BOB),
            engine.attach_referral(BOB, ALICE)
        );
        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);

        let up = engine.ancestors(ALICE, 10).await.unwrap();
        assert!(up.len() <= 1);
        assert!(!up.iter().any(|a| a.as_str() == ALICE));
    }

    #[tokio::test]
    async fn store_refuses_to_close_a_loop() {
        let store = InMemoryWalletStore::new();
        let (alice, bob) = (Address::parse(ALICE).unwrap(), Address::parse(BOB).unwrap());
        for address in [&alice, &bob] {
            store
                .upsert_wallet(&WalletUpsert {
                    address: address.clone(),
                    balance: dec!(0),
                    usd_value: dec!(0),
                    tier: Tier::Normal,
                    rates: TierPolicy::default().normal_rates,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.attach_parent(&alice, &bob).await.unwrap(), ParentAssignment::Attached);
        assert_eq!(store.attach_parent(&bob, &alice).await.unwrap(), ParentAssignment::Cycle);
        assert_eq!(store.attach_parent(&bob, &bob).await.unwrap(), ParentAssignment::Cycle);
    }

    #[tokio::test]
    async fn reconnect_ignores_stale_referrer() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();
        engine.connect_wallet(BOB, dec!(0), Some(ALICE)).await.unwrap();

        // CAROL was never connected, and "garbage" is not an address
        let stale = engine.connect_wallet(BOB, dec!(5), Some(CAROL)).await.unwrap();
        assert_eq!(stale.parent.as_ref().map(Address::as_str), Some(ALICE));
        assert_eq!(stale.balance, dec!(5));

        let garbage = engine.connect_wallet(BOB, dec!(6), Some("garbage")).await.unwrap();
        assert_eq!(garbage.parent.as_ref().map(Address::as_str), Some(ALICE));
    }

    #[tokio::test]
    async fn unknown_referrer_is_not_found() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();
        let result = engine.attach_referral(ALICE, BOB).await;
        assert!(matches!(result, Err(MembershipError::NotFound(_))));
    }

    #[tokio::test]
    async fn ancestry_and_downline_are_bounded() {
        let engine = engine();
        engine.connect_wallet(ALICE, dec!(0), None).await.unwrap();
        engine.connect_wallet(BOB, dec!(0), Some(ALICE)).await.unwrap();
        engine.connect_wallet(CAROL, dec!(0), Some(BOB)).await.unwrap();

        let up = engine.ancestors(CAROL, 10).await.unwrap();
        let up: Vec<&str> = up.iter().map(Address::as_str).collect();
        assert_eq!(up, vec![BOB, ALICE]);
        assert_eq!(engine.ancestors(CAROL, 1).await.unwrap().len(), 1);

        let team = engine.downline(ALICE, 10).await.unwrap();
        assert_eq!(team.len(), 2);
        assert_eq!(team[0].address.as_str(), BOB);
        assert_eq!(team[0].depth, 1);
        assert_eq!(team[1].address.as_str(), CAROL);
        assert_eq!(team[1].depth, 2);

        assert_eq!(engine.downline(ALICE, 1).await.unwrap().len(), 1);
    }
}
