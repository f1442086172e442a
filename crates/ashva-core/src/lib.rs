//! # ASHVA membership engine
//!
//! Tier classification, the two-level referral tree, commission
//! distribution, withdrawal reconciliation and node lifecycle for the ASHVA
//! rewards platform.
//!
//! Storage and pricing are injected through [`store::WalletStore`] and
//! [`oracle::PriceOracle`]. [`memory::InMemoryWalletStore`] backs tests and
//! local runs.
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use ashva_core::{
//!     EngineConfig, FallbackPriceOracle, InMemoryWalletStore, MembershipEngine,
//!     StaticPriceOracle,
//! };
//! use rust_decimal::Decimal;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let oracle = FallbackPriceOracle::new(
//!         StaticPriceOracle::new(Decimal::new(25, 2)),
//!         Decimal::new(1, 1),
//!         Duration::from_secs(3),
//!     );
//!     let engine = MembershipEngine::new(
//!         Arc::new(InMemoryWalletStore::new()),
//!         Arc::new(oracle),
//!         EngineConfig::default(),
//!     )?;
//!
//!     let wallet = engine
//!         .connect_wallet("0xa000000000000000000000000000000000000001", Decimal::new(50_000, 0), None)
//!         .await?;
//!     println!("{} is {}", wallet.address, wallet.tier);
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod nodes;
pub mod oracle;
pub mod referral;
pub mod store;
pub mod tier;
pub mod types;
pub mod withdrawal;

pub use address::Address;
pub use commission::{commission_shares, CommissionShare};
pub use config::{EngineConfig, MAX_REFERRAL_DEPTH, NODE_DEPLOYMENT_HOURS};
pub use engine::MembershipEngine;
pub use error::{MembershipError, MembershipResult};
pub use memory::InMemoryWalletStore;
pub use nodes::{NodePurchase, NodePurchaseOutcome};
pub use oracle::{FallbackPriceOracle, PriceOracle, StaticPriceOracle};
pub use referral::DownlineEntry;
pub use store::WalletStore;
pub use tier::{classify_tier, TierPolicy, GLOBAL_PARTNER_THRESHOLD, MARKET_PARTNER_THRESHOLD};
pub use types::*;
pub use withdrawal::{split_burn, BurnSplit};
