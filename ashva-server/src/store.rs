//! Postgres implementation of the wallet store.
//!
//! Multi-statement operations run in a single transaction. Earnings are only
//! ever changed with `earnings = earnings ± $n`.

use ashva_core::{
    Address, CommissionLevel, CommissionRates, CommissionRecord, MembershipError,
    MembershipResult, Node, NodeSpecs, ParentAssignment, Wallet, WalletStore, WalletUpsert,
    WithdrawalRecord, WithdrawalResolution, WithdrawalStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

const WALLET_COLUMNS: &str = "address, balance, usd_value, tier, parent, earnings, \
     direct_rate, indirect_rate, created_at, updated_at";

const COMMISSION_COLUMNS: &str =
    "id, recipient, source, amount, rate, level, tx_type, source_tx, created_at";

const WITHDRAWAL_COLUMNS: &str = "id, wallet, amount, usd_value, burn_rate, burn_amount, \
     actual_amount, status, tx_hash, reject_reason, created_at, processed_at";

/// Advisory lock taken by every parent assignment.
const HIERARCHY_LOCK_KEY: i64 = 0x4153_4856_4152_4546;

const NODE_COLUMNS: &str = "id, owner, node_type, status, price, cpu_cores, memory_gb, \
     storage_gb, earnings, transferable, tx_ref, created_at, updated_at";

fn db_err(context: &str) -> impl FnOnce(sqlx::Error) -> MembershipError + '_ {
    move |e| {
        error!("Database error during {}: {}", context, e);
        MembershipError::Storage(format!("{}: {}", context, e))
    }
}

fn corrupt(what: &str, e: MembershipError) -> MembershipError {
    MembershipError::Storage(format!("corrupt {} row: {}", what, e))
}

#[derive(FromRow)]
struct WalletRow {
    address: String,
    balance: Decimal,
    usd_value: Decimal,
    tier: String,
    parent: Option<String>,
    earnings: Decimal,
    direct_rate: Decimal,
    indirect_rate: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = MembershipError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let convert = || -> MembershipResult<Wallet> {
            Ok(Wallet {
                address: Address::parse(&row.address)?,
                balance: row.balance,
                usd_value: row.usd_value,
                tier: row.tier.parse()?,
                parent: row.parent.as_deref().map(Address::parse).transpose()?,
                earnings: row.earnings,
                rates: CommissionRates {
                    direct: row.direct_rate,
                    indirect: row.indirect_rate,
                },
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        };
        convert().map_err(|e| corrupt("wallet", e))
    }
}

#[derive(FromRow)]
struct CommissionRow {
    id: Uuid,
    recipient: String,
    source: String,
    amount: Decimal,
    rate: Decimal,
    level: i16,
    tx_type: String,
    source_tx: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CommissionRow> for CommissionRecord {
    type Error = MembershipError;

    fn try_from(row: CommissionRow) -> Result<Self, Self::Error> {
        let convert = || -> MembershipResult<CommissionRecord> {
            let level = u8::try_from(row.level).map_err(|_| {
                MembershipError::Validation(format!("commission level {}", row.level))
            })?;
            Ok(CommissionRecord {
                id: row.id,
                recipient: Address::parse(&row.recipient)?,
                source: Address::parse(&row.source)?,
                amount: row.amount,
                rate: row.rate,
                level: CommissionLevel::try_from(level)?,
                tx_type: row.tx_type.parse()?,
                source_tx: row.source_tx.clone(),
                created_at: row.created_at,
            })
        };
        convert().map_err(|e| corrupt("commission", e))
    }
}

#[derive(FromRow)]
struct WithdrawalRow {
    id: Uuid,
    wallet: String,
    amount: Decimal,
    usd_value: Decimal,
    burn_rate: Decimal,
    burn_amount: Decimal,
    actual_amount: Decimal,
    status: String,
    tx_hash: Option<String>,
    reject_reason: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WithdrawalRow> for WithdrawalRecord {
    type Error = MembershipError;

    fn try_from(row: WithdrawalRow) -> Result<Self, Self::Error> {
        let convert = || -> MembershipResult<WithdrawalRecord> {
            Ok(WithdrawalRecord {
                id: row.id,
                wallet: Address::parse(&row.wallet)?,
                amount: row.amount,
                usd_value: row.usd_value,
                burn_rate: row.burn_rate,
                burn_amount: row.burn_amount,
                actual_amount: row.actual_amount,
                status: row.status.parse()?,
                tx_hash: row.tx_hash.clone(),
                reject_reason: row.reject_reason.clone(),
                created_at: row.created_at,
                processed_at: row.processed_at,
            })
        };
        convert().map_err(|e| corrupt("withdrawal", e))
    }
}

#[derive(FromRow)]
struct NodeRow {
    id: Uuid,
    owner: String,
    node_type: String,
    status: String,
    price: Decimal,
    cpu_cores: i32,
    memory_gb: i32,
    storage_gb: i32,
    earnings: Decimal,
    transferable: bool,
    tx_ref: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NodeRow> for Node {
    type Error = MembershipError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let convert = || -> MembershipResult<Node> {
            Ok(Node {
                id: row.id,
                owner: Address::parse(&row.owner)?,
                node_type: row.node_type.parse()?,
                status: row.status.parse()?,
                price: row.price,
                specs: NodeSpecs {
                    cpu_cores: row.cpu_cores.max(0) as u32,
                    memory_gb: row.memory_gb.max(0) as u32,
                    storage_gb: row.storage_gb.max(0) as u32,
                },
                earnings: row.earnings,
                transferable: row.transferable,
                tx_ref: row.tx_ref.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        };
        convert().map_err(|e| corrupt("node", e))
    }
}

fn collect<R, T>(rows: Vec<R>) -> MembershipResult<Vec<T>>
where
    T: TryFrom<R, Error = MembershipError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn spec_value(name: &str, value: u32) -> MembershipResult<i32> {
    i32::try_from(value)
        .map_err(|_| MembershipError::Validation(format!("{} out of range: {}", name, value)))
}

/// Wallet store backed by a Postgres pool
#[derive(Clone)]
pub struct PgWalletStore {
    pool: Arc<PgPool>,
}

impl PgWalletStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    async fn begin(&self, context: &str) -> MembershipResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(db_err(context))
    }

    /// Conditionally debit inside a transaction, distinguishing a missing
    /// wallet from an insufficient balance
    async fn debit_in(
        tx: &mut Transaction<'static, Postgres>,
        address: &Address,
        delta: Decimal,
    ) -> MembershipResult<()> {
        let debited = sqlx::query(
            "UPDATE wallets SET earnings = earnings - $2, updated_at = NOW() \
             WHERE address = $1 AND earnings >= $2",
        )
        .bind(address.as_str())
        .bind(delta)
        .execute(&mut **tx)
        .await
        .map_err(db_err("debit earnings"))?;

        if debited.rows_affected() == 1 {
            return Ok(());
        }

        let available: Option<Decimal> =
            sqlx::query_scalar("SELECT earnings FROM wallets WHERE address = $1")
                .bind(address.as_str())
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_err("read earnings"))?;

        match available {
            None => Err(MembershipError::NotFound(format!("wallet {}", address))),
            Some(available) => Err(MembershipError::InsufficientBalance(format!(
                "wallet {} has {} available, {} requested",
                address, available, delta
            ))),
        }
    }

    async fn credit_in(
        tx: &mut Transaction<'static, Postgres>,
        address: &Address,
        delta: Decimal,
    ) -> MembershipResult<()> {
        let credited = sqlx::query(
            "UPDATE wallets SET earnings = earnings + $2, updated_at = NOW() WHERE address = $1",
        )
        .bind(address.as_str())
        .bind(delta)
        .execute(&mut **tx)
        .await
        .map_err(db_err("credit earnings"))?;

        if credited.rows_affected() == 0 {
            return Err(MembershipError::NotFound(format!("wallet {}", address)));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn get_wallet(&self, address: &Address) -> MembershipResult<Option<Wallet>> {
        let row: Option<WalletRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallets WHERE address = $1",
            WALLET_COLUMNS
        ))
        .bind(address.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err("get wallet"))?;

        row.map(Wallet::try_from).transpose()
    }

    async fn upsert_wallet(&self, update: &WalletUpsert) -> MembershipResult<Wallet> {
        let row: WalletRow = sqlx::query_as(&format!(
            "INSERT INTO wallets (address, balance, usd_value, tier, direct_rate, indirect_rate) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (address) DO UPDATE SET \
                 balance = EXCLUDED.balance, \
                 usd_value = EXCLUDED.usd_value, \
                 tier = EXCLUDED.tier, \
                 direct_rate = EXCLUDED.direct_rate, \
                 indirect_rate = EXCLUDED.indirect_rate, \
                 updated_at = NOW() \
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(update.address.as_str())
        .bind(update.balance)
        .bind(update.usd_value)
        .bind(update.tier.as_str())
        .bind(update.rates.direct)
        .bind(update.rates.indirect)
        .fetch_one(self.pool())
        .await
        .map_err(db_err("upsert wallet"))?;

        Wallet::try_from(row)
    }

    async fn attach_parent(
        &self,
        child: &Address,
        parent: &Address,
    ) -> MembershipResult<ParentAssignment> {
        let mut tx = self.begin("attach parent").await?;

        // Serializes tree edits so two crossing attaches cannot both pass the
        // ancestry check below.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(db_err("lock hierarchy"))?;

        let existing: Option<Option<String>> =
            sqlx::query_scalar("SELECT parent FROM wallets WHERE address = $1 FOR UPDATE")
                .bind(child.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("read parent"))?;

        match existing {
            None => return Ok(ParentAssignment::MissingChild),
            Some(Some(existing)) => {
                return Ok(ParentAssignment::Locked(
                    Address::parse(&existing).map_err(|e| corrupt("wallet", e))?,
                ))
            }
            Some(None) => {}
        }

        let closes_loop: bool = sqlx::query_scalar(
            "WITH RECURSIVE upline(address) AS ( \
                 SELECT $1::TEXT \
                 UNION \
                 SELECT h.parent FROM hierarchy h JOIN upline u ON h.child = u.address \
             ) \
             SELECT EXISTS (SELECT 1 FROM upline WHERE address = $2)",
        )
        .bind(parent.as_str())
        .bind(child.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("check ancestry"))?;

        if closes_loop {
            return Ok(ParentAssignment::Cycle);
        }

        sqlx::query("UPDATE wallets SET parent = $2, updated_at = NOW() WHERE address = $1")
            .bind(child.as_str())
            .bind(parent.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err("set parent"))?;

        sqlx::query("INSERT INTO hierarchy (child, parent) VALUES ($1, $2)")
            .bind(child.as_str())
            .bind(parent.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err("insert hierarchy edge"))?;

        tx.commit().await.map_err(db_err("commit parent"))?;
        Ok(ParentAssignment::Attached)
    }

    async fn children(&self, parent: &Address) -> MembershipResult<Vec<Address>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT child FROM hierarchy WHERE parent = $1 ORDER BY created_at, child",
        )
        .bind(parent.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(db_err("list children"))?;

        rows.iter()
            .map(|raw| Address::parse(raw).map_err(|e| corrupt("hierarchy", e)))
            .collect()
    }

    async fn increment_earnings(&self, address: &Address, delta: Decimal) -> MembershipResult<()> {
        let mut tx = self.begin("increment earnings").await?;
        Self::credit_in(&mut tx, address, delta).await?;
        tx.commit().await.map_err(db_err("commit increment"))
    }

    async fn debit_earnings(&self, address: &Address, delta: Decimal) -> MembershipResult<()> {
        let mut tx = self.begin("debit earnings").await?;
        Self::debit_in(&mut tx, address, delta).await?;
        tx.commit().await.map_err(db_err("commit debit"))
    }

    async fn record_commission(&self, record: &CommissionRecord) -> MembershipResult<bool> {
        let mut tx = self.begin("record commission").await?;

        let inserted = sqlx::query(
            "INSERT INTO commissions \
                 (id, recipient, source, amount, rate, level, tx_type, source_tx, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (source_tx, level) DO NOTHING",
        )
        .bind(record.id)
        .bind(record.recipient.as_str())
        .bind(record.source.as_str())
        .bind(record.amount)
        .bind(record.rate)
        .bind(i16::from(record.level.as_u8()))
        .bind(record.tx_type.as_str())
        .bind(&record.source_tx)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert commission"))?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        Self::credit_in(&mut tx, &record.recipient, record.amount).await?;
        tx.commit().await.map_err(db_err("commit commission"))?;
        Ok(true)
    }

    async fn commissions_for(&self, recipient: &Address) -> MembershipResult<Vec<CommissionRecord>> {
        let rows: Vec<CommissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM commissions WHERE recipient = $1 ORDER BY created_at DESC",
            COMMISSION_COLUMNS
        ))
        .bind(recipient.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(db_err("list commissions"))?;

        collect(rows)
    }

    async fn create_withdrawal(&self, record: &WithdrawalRecord) -> MembershipResult<()> {
        let mut tx = self.begin("create withdrawal").await?;

        Self::debit_in(&mut tx, &record.wallet, record.amount).await?;

        sqlx::query(
            "INSERT INTO withdrawals \
                 (id, wallet, amount, usd_value, burn_rate, burn_amount, actual_amount, \
                  status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.wallet.as_str())
        .bind(record.amount)
        .bind(record.usd_value)
        .bind(record.burn_rate)
        .bind(record.burn_amount)
        .bind(record.actual_amount)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert withdrawal"))?;

        tx.commit().await.map_err(db_err("commit withdrawal"))
    }

    async fn get_withdrawal(&self, id: Uuid) -> MembershipResult<Option<WithdrawalRecord>> {
        let row: Option<WithdrawalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM withdrawals WHERE id = $1",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err("get withdrawal"))?;

        row.map(WithdrawalRecord::try_from).transpose()
    }

    async fn withdrawals_for(&self, wallet: &Address) -> MembershipResult<Vec<WithdrawalRecord>> {
        let rows: Vec<WithdrawalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM withdrawals WHERE wallet = $1 ORDER BY created_at DESC",
            WITHDRAWAL_COLUMNS
        ))
        .bind(wallet.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(db_err("list wallet withdrawals"))?;

        collect(rows)
    }

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> MembershipResult<Vec<WithdrawalRecord>> {
        let rows: Vec<WithdrawalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM withdrawals \
             WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC",
            WITHDRAWAL_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(self.pool())
        .await
        .map_err(db_err("list withdrawals"))?;

        collect(rows)
    }

    async fn resolve_withdrawal(
        &self,
        id: Uuid,
        resolution: &WithdrawalResolution,
        processed_at: DateTime<Utc>,
    ) -> MembershipResult<WithdrawalRecord> {
        let mut tx = self.begin("resolve withdrawal").await?;

        let current: Option<WithdrawalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("lock withdrawal"))?;

        let current = current
            .map(WithdrawalRecord::try_from)
            .transpose()?
            .ok_or_else(|| MembershipError::NotFound(format!("withdrawal {}", id)))?;

        if current.status != WithdrawalStatus::Pending {
            return Err(MembershipError::InvalidState(format!(
                "withdrawal {} is already {}",
                id, current.status
            )));
        }

        let (tx_hash, reason) = match resolution {
            WithdrawalResolution::Approve { tx_hash } => (Some(tx_hash.as_str()), None),
            WithdrawalResolution::Reject { reason } => (None, Some(reason.as_str())),
        };

        let row: WithdrawalRow = sqlx::query_as(&format!(
            "UPDATE withdrawals \
             SET status = $2, tx_hash = $3, reject_reason = $4, processed_at = $5 \
             WHERE id = $1 \
             RETURNING {}",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .bind(resolution.target_status().as_str())
        .bind(tx_hash)
        .bind(reason)
        .bind(processed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("update withdrawal"))?;

        if let WithdrawalResolution::Reject { .. } = resolution {
            Self::credit_in(&mut tx, &current.wallet, current.amount).await?;
        }

        tx.commit().await.map_err(db_err("commit withdrawal resolution"))?;
        WithdrawalRecord::try_from(row)
    }

    async fn insert_node(&self, node: &Node) -> MembershipResult<Node> {
        let inserted: Option<NodeRow> = sqlx::query_as(&format!(
            "INSERT INTO nodes \
                 (id, owner, node_type, status, price, cpu_cores, memory_gb, storage_gb, \
                  earnings, transferable, tx_ref, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (tx_ref) DO NOTHING \
             RETURNING {}",
            NODE_COLUMNS
        ))
        .bind(node.id)
        .bind(node.owner.as_str())
        .bind(node.node_type.as_str())
        .bind(node.status.as_str())
        .bind(node.price)
        .bind(spec_value("cpu_cores", node.specs.cpu_cores)?)
        .bind(spec_value("memory_gb", node.specs.memory_gb)?)
        .bind(spec_value("storage_gb", node.specs.storage_gb)?)
        .bind(node.earnings)
        .bind(node.transferable)
        .bind(&node.tx_ref)
        .bind(node.created_at)
        .bind(node.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err("insert node"))?;

        let row = match inserted {
            Some(row) => row,
            None => sqlx::query_as(&format!(
                "SELECT {} FROM nodes WHERE tx_ref = $1",
                NODE_COLUMNS
            ))
            .bind(&node.tx_ref)
            .fetch_one(self.pool())
            .await
            .map_err(db_err("get node by tx_ref"))?,
        };

        Node::try_from(row)
    }

    async fn nodes_for(&self, owner: &Address) -> MembershipResult<Vec<Node>> {
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM nodes WHERE owner = $1 ORDER BY created_at DESC",
            NODE_COLUMNS
        ))
        .bind(owner.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(db_err("list nodes"))?;

        collect(rows)
    }

    async fn promote_deployed_nodes(&self, cutoff: DateTime<Utc>) -> MembershipResult<u64> {
        let result = sqlx::query(
            "UPDATE nodes SET status = 'active', updated_at = NOW() \
             WHERE status = 'deploying' AND created_at <= $1",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(db_err("promote nodes"))?;

        Ok(result.rows_affected())
    }
}
