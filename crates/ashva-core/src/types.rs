use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::address::Address;
use crate::error::{MembershipError, MembershipResult};

/// Decimal places kept on derived amounts (commissions, burns)
pub const AMOUNT_SCALE: u32 = 8;

/// Round a derived amount to [`AMOUNT_SCALE`] places
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp(AMOUNT_SCALE)
}

fn out_of_range(lhs: Decimal, op: &str, rhs: Decimal) -> MembershipError {
    MembershipError::Validation(format!("amount out of range: {} {} {}", lhs, op, rhs))
}

/// `lhs × rhs`, failing with `Validation` instead of overflowing
pub fn checked_product(lhs: Decimal, rhs: Decimal) -> MembershipResult<Decimal> {
    lhs.checked_mul(rhs).ok_or_else(|| out_of_range(lhs, "×", rhs))
}

/// `lhs + rhs`, failing with `Validation` instead of overflowing
pub fn checked_sum(lhs: Decimal, rhs: Decimal) -> MembershipResult<Decimal> {
    lhs.checked_add(rhs).ok_or_else(|| out_of_range(lhs, "+", rhs))
}

/// Implements `as_str` and `FromStr` for a unit enum persisted as text
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MembershipError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(MembershipError::Validation(format!(
                        "unknown {}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// Membership classification, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Normal,
    MarketPartner,
    GlobalPartner,
}

text_enum!(Tier {
    Normal => "normal",
    MarketPartner => "market_partner",
    GlobalPartner => "global_partner",
});

impl Tier {
    pub fn is_partner(&self) -> bool {
        !matches!(self, Tier::Normal)
    }
}

/// Commission percentages paid to the first and second referral levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRates {
    /// Paid to the direct parent
    pub direct: Decimal,
    /// Paid to the grandparent
    pub indirect: Decimal,
}

/// A connected wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: Address,

    /// Token balance as last reported
    pub balance: Decimal,

    /// `balance × price` at the last sync
    pub usd_value: Decimal,

    pub tier: Tier,

    /// Referral parent. `None` while the wallet is unassigned.
    pub parent: Option<Address>,

    /// Accrued earnings not yet withdrawn
    pub earnings: Decimal,

    pub rates: CommissionRates,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn is_unassigned(&self) -> bool {
        self.parent.is_none()
    }
}

/// Fields written by a wallet sync. Parent and earnings are never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletUpsert {
    pub address: Address,
    pub balance: Decimal,
    pub usd_value: Decimal,
    pub tier: Tier,
    pub rates: CommissionRates,
}

/// Parent → child link mirroring `Wallet::parent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub parent: Address,
    pub child: Address,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a conditional parent assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentAssignment {
    /// Parent and hierarchy edge were written
    Attached,
    /// The wallet is already locked to this parent
    Locked(Address),
    /// The child wallet does not exist
    MissingChild,
    /// The requested parent sits below the child in the tree
    Cycle,
}

/// Referral level receiving a commission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommissionLevel {
    Direct = 1,
    Indirect = 2,
}

impl CommissionLevel {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl From<CommissionLevel> for u8 {
    fn from(level: CommissionLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for CommissionLevel {
    type Error = MembershipError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommissionLevel::Direct),
            2 => Ok(CommissionLevel::Indirect),
            other => Err(MembershipError::Validation(format!(
                "unknown commission level: {}",
                other
            ))),
        }
    }
}

/// Kind of purchase that generated a commission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseKind {
    NodePurchase,
    Purchase,
}

text_enum!(PurchaseKind {
    NodePurchase => "node_purchase",
    Purchase => "purchase",
});

/// A purchase that pays commission up the referral chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub buyer: Address,
    pub amount: Decimal,
    /// Purchase transaction reference, the idempotency key
    pub source_tx: String,
    pub kind: PurchaseKind,
}

/// Append-only commission ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub id: Uuid,
    pub recipient: Address,
    pub source: Address,
    pub amount: Decimal,
    pub rate: Decimal,
    pub level: CommissionLevel,
    pub tx_type: PurchaseKind,
    pub source_tx: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    #[serde(alias = "hosting")]
    Cloud,
    Image,
}

text_enum!(NodeType {
    Cloud => "cloud",
    Image => "image",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Deploying,
    Active,
    Inactive,
    Maintenance,
    Failed,
}

text_enum!(NodeStatus {
    Pending => "pending",
    Deploying => "deploying",
    Active => "active",
    Inactive => "inactive",
    Maintenance => "maintenance",
    Failed => "failed",
});

/// Resources provisioned for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSpecs {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub storage_gb: u32,
}

/// A purchased hosting slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub owner: Address,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub price: Decimal,
    pub specs: NodeSpecs,
    pub earnings: Decimal,
    pub transferable: bool,
    /// Purchase transaction reference
    pub tx_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
}

text_enum!(WithdrawalStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }
}

/// A request to pay out accrued earnings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: Uuid,
    pub wallet: Address,
    pub amount: Decimal,
    pub usd_value: Decimal,
    pub burn_rate: Decimal,
    pub burn_amount: Decimal,
    pub actual_amount: Decimal,
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Admin decision on a pending withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalResolution {
    Approve { tx_hash: String },
    Reject { reason: String },
}

impl WithdrawalResolution {
    pub fn target_status(&self) -> WithdrawalStatus {
        match self {
            WithdrawalResolution::Approve { .. } => WithdrawalStatus::Completed,
            WithdrawalResolution::Reject { .. } => WithdrawalStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_arithmetic_rejects_overflow() {
        assert_eq!(
            checked_product(Decimal::new(40, 0), Decimal::new(5, 2)).unwrap(),
            Decimal::new(2, 0)
        );
        assert!(matches!(
            checked_product(Decimal::MAX, Decimal::new(2, 0)),
            Err(MembershipError::Validation(_))
        ));
        assert!(matches!(
            checked_sum(Decimal::MAX, Decimal::ONE),
            Err(MembershipError::Validation(_))
        ));
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(Tier::Normal < Tier::MarketPartner);
        assert!(Tier::MarketPartner < Tier::GlobalPartner);
    }

    #[test]
    fn text_enums_round_trip_through_storage_names() {
        assert_eq!("market_partner".parse::<Tier>().unwrap(), Tier::MarketPartner);
        assert_eq!(NodeStatus::Deploying.as_str(), "deploying");
        assert!("archived".parse::<WithdrawalStatus>().is_err());
    }

    #[test]
    fn hosting_is_an_alias_for_cloud() {
        let node_type: NodeType = serde_json::from_str("\"hosting\"").unwrap();
        assert_eq!(node_type, NodeType::Cloud);
        assert_eq!(serde_json::to_string(&node_type).unwrap(), "\"cloud\"");
    }

    #[test]
    fn commission_level_serializes_as_number() {
        assert_eq!(serde_json::to_string(&CommissionLevel::Indirect).unwrap(), "2");
        assert!(CommissionLevel::try_from(3).is_err());
    }
}
