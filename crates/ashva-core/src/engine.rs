use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::address::Address;
use crate::config::EngineConfig;
use crate::error::{MembershipError, MembershipResult};
use crate::oracle::PriceOracle;
use crate::store::WalletStore;
use crate::types::{checked_product, Wallet, WalletUpsert};

/// Membership, referral, commission and withdrawal operations over an
/// injected store and price oracle.
///
/// The oracle should be a [`FallbackPriceOracle`](crate::oracle::FallbackPriceOracle)
/// so that price outages never fail a request.
#[derive(Clone)]
pub struct MembershipEngine {
    pub(crate) store: Arc<dyn WalletStore>,
    pub(crate) oracle: Arc<dyn PriceOracle>,
    pub(crate) config: Arc<EngineConfig>,
}

impl MembershipEngine {
    pub fn new(
        store: Arc<dyn WalletStore>,
        oracle: Arc<dyn PriceOracle>,
        config: EngineConfig,
    ) -> MembershipResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            oracle,
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn current_price(&self) -> MembershipResult<Decimal> {
        self.oracle.current_price().await
    }

    /// Fetch a wallet or fail with `NotFound`
    pub async fn require_wallet(&self, address: &Address) -> MembershipResult<Wallet> {
        self.store
            .get_wallet(address)
            .await?
            .ok_or_else(|| MembershipError::NotFound(format!("wallet {}", address)))
    }

    pub async fn wallet(&self, address: &str) -> MembershipResult<Wallet> {
        let address = Address::parse(address)?;
        self.require_wallet(&address).await
    }

    /// Record a wallet's current balance and reclassify it.
    ///
    /// Tier and commission rates are derived from the balance alone, so
    /// re-syncing an unchanged balance leaves the rates unchanged.
    pub async fn sync_wallet(&self, address: &Address, balance: Decimal) -> MembershipResult<Wallet> {
        if balance < Decimal::ZERO {
            return Err(MembershipError::Validation(format!(
                "balance must not be negative, got {}",
                balance
            )));
        }

        let price = self.current_price().await?;
        let tiers = &self.config.tiers;
        let usd_value = checked_product(balance, price)?;
        let tier = tiers.tier_for_usd(usd_value);

        let previous = self.store.get_wallet(address).await?.map(|w| w.tier);

        let wallet = self
            .store
            .upsert_wallet(&WalletUpsert {
                address: address.clone(),
                balance,
                usd_value,
                tier,
                rates: tiers.rates_for(tier),
            })
            .await?;

        match previous {
            Some(old) if old != tier => {
                info!("Wallet {} moved from {} to {} (${})", address, old, tier, usd_value)
            }
            None => info!("Registered wallet {} as {} (${})", address, tier, usd_value),
            _ => debug!("Synced wallet {} at {} (${})", address, tier, usd_value),
        }

        Ok(wallet)
    }
}
