// ============================================================================
// GachaDb - Embedded Database (redb)
// ============================================================================
// Ledger (balances, inventory, contracts, transaction log, seed chains) and
// catalog (gifts, cases) in one file. redb write transactions are
// serializable, which makes every resolver operation atomic.
// Default path: ~/.gacha/gacha.redb (override via GACHA_DB_PATH env var)
// ============================================================================

pub mod types;

pub use types::{DbStats, FreeCaseClaim};

use anyhow::{anyhow, Result};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use self::types::*;
use crate::catalog::{sort_by_price, sort_cases, validate_catalog, CatalogFile, RewardCatalog};
use crate::fairness::SeedState;
use crate::ledger::{Ledger, LedgerTxn, LedgerView};
use crate::types::{
    Balance, Case, ContractStatus, GachaError, GachaResult, Gift, InventoryEntry,
    TransactionKind, TransactionRecord, UpgradeContract,
};

/// Window for `DbStats::active_users`
const ACTIVE_WINDOW_SECS: i64 = 24 * 60 * 60;

// Table definitions
const BALANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("balances");
const INVENTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("inventory");
const CONTRACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("contracts");
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");
const SEEDS: TableDefinition<&str, &[u8]> = TableDefinition::new("seeds");
const CLAIMS: TableDefinition<&str, &[u8]> = TableDefinition::new("claims");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const GIFTS: TableDefinition<&str, &[u8]> = TableDefinition::new("gifts");
const CASES: TableDefinition<&str, &[u8]> = TableDefinition::new("cases");

const ALL_TABLES: [TableDefinition<&str, &[u8]>; 9] = [
    BALANCES,
    INVENTORY,
    CONTRACTS,
    TRANSACTIONS,
    SEEDS,
    CLAIMS,
    META,
    GIFTS,
    CASES,
];

/// Embedded database backing the ledger and catalog
pub struct GachaDb {
    db: Database,
    path: Option<PathBuf>,
}

impl GachaDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses GACHA_DB_PATH env var or ~/.gacha/gacha.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("GACHA_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let gacha_dir = home.join(".gacha");
            std::fs::create_dir_all(&gacha_dir)
                .map_err(|e| anyhow!("Failed to create .gacha directory: {}", e))?;
            gacha_dir.join("gacha.redb")
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;
        Self::init(db, Some(db_path))
    }

    /// Volatile database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;
        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self> {
        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        for table in ALL_TABLES {
            let _ = write_txn
                .open_table(table)
                .map_err(|e| anyhow!("Failed to create table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        info!("Database ready");

        Ok(Self { db, path })
    }

    /// Database file path, None when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Catalog Operations
    // ========================================================================

    /// Validate and write a catalog in one transaction.
    /// Existing gifts and cases with the same ids are replaced.
    pub fn import_catalog(&self, catalog: &CatalogFile) -> Result<(usize, usize)> {
        let problems = validate_catalog(&catalog.gifts, &catalog.cases);
        if !problems.is_empty() {
            return Err(anyhow!("Invalid catalog:\n  {}", problems.join("\n  ")));
        }

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut gifts = write_txn.open_table(GIFTS)
                .map_err(|e| anyhow!("Failed to open gifts table: {}", e))?;
            for gift in &catalog.gifts {
                let value = encode(gift)?;
                gifts.insert(gift_key(&gift.id).as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert gift: {}", e))?;
            }

            let mut cases = write_txn.open_table(CASES)
                .map_err(|e| anyhow!("Failed to open cases table: {}", e))?;
            for case in &catalog.cases {
                let value = encode(case)?;
                cases.insert(case_key(&case.id).as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert case: {}", e))?;
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        info!(
            "Imported catalog: {} gifts, {} cases",
            catalog.gifts.len(),
            catalog.cases.len()
        );
        Ok((catalog.gifts.len(), catalog.cases.len()))
    }

    pub fn list_gifts(&self) -> Result<Vec<Gift>> {
        let read_txn = self.begin_read()?;
        let mut gifts: Vec<Gift> = scan(&read_txn, GIFTS)?;
        sort_by_price(&mut gifts);
        Ok(gifts)
    }

    /// All cases including inactive ones
    pub fn list_all_cases(&self) -> Result<Vec<Case>> {
        let read_txn = self.begin_read()?;
        let mut cases: Vec<Case> = scan(&read_txn, CASES)?;
        sort_cases(&mut cases);
        Ok(cases)
    }

    // ========================================================================
    // Ledger Queries
    // ========================================================================

    /// Non-zero inventory rows for a user
    pub fn list_inventory(&self, user_id: &str) -> Result<Vec<InventoryEntry>> {
        Ok(self.view(|view| view.inventory(user_id))?)
    }

    /// Most recent transactions first
    pub fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<TransactionRecord>> {
        Ok(self.view(|view| view.transactions(user_id, limit))?)
    }

    pub fn list_contracts(
        &self,
        user_filter: Option<&str>,
        status_filter: Option<ContractStatus>,
    ) -> Result<Vec<UpgradeContract>> {
        let read_txn = self.begin_read()?;
        let contracts: Vec<UpgradeContract> = scan(&read_txn, CONTRACTS)?;
        Ok(contracts
            .into_iter()
            .filter(|c| user_filter.map_or(true, |u| c.user_id == u))
            .filter(|c| status_filter.map_or(true, |s| c.status == s))
            .collect())
    }

    /// Every known user with their balance
    pub fn list_balances(&self) -> Result<Vec<(String, Balance)>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(BALANCES)
            .map_err(|e| anyhow!("Failed to open balances table: {}", e))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate balances: {}", e))?;
        for entry in iter {
            let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let user_id = key.value().trim_start_matches("balances:").to_string();
            let balance: Balance = decode(value.value())?;
            results.push((user_id, balance));
        }
        Ok(results)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Users with any transaction in the last 24 hours count as active
    pub fn stats(&self) -> Result<DbStats> {
        let balances = self.list_balances()?;
        let contracts = self.list_contracts(None, None)?;
        let gifts = self.list_gifts()?;
        let cases = self.list_all_cases()?;

        let read_txn = self.begin_read()?;
        let transactions: Vec<TransactionRecord> = scan(&read_txn, TRANSACTIONS)?;

        let total_deposits = transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Deposit)
            .map(|t| t.balance_delta.max(0) as u64)
            .sum();
        let cases_opened = transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::CaseOpen)
            .count();
        let active_since = chrono::Utc::now().timestamp() - ACTIVE_WINDOW_SECS;
        let active_users = transactions
            .iter()
            .filter(|t| t.created_at >= active_since)
            .map(|t| t.user_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        let mut contract_counts = std::collections::HashMap::new();
        for contract in &contracts {
            *contract_counts.entry(format!("{:?}", contract.status)).or_insert(0usize) += 1;
        }

        Ok(DbStats {
            total_users: balances.len(),
            active_users,
            total_deposits,
            total_balance: balances.iter().map(|(_, b)| b.amount).sum(),
            total_transactions: transactions.len(),
            cases_opened,
            contract_counts,
            total_gifts: gifts.len(),
            total_cases: cases.len(),
        })
    }

    fn begin_read(&self) -> Result<ReadTransaction> {
        self.db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))
    }
}

// ============================================================================
// Record Helpers
// ============================================================================

fn storage<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> GachaError {
    move |e| GachaError::Storage(format!("{}: {}", context, e))
}

fn encode<T: Serialize>(value: &T) -> GachaResult<Vec<u8>> {
    bincode::serialize(value).map_err(storage("Failed to serialize record"))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> GachaResult<T> {
    bincode::deserialize(bytes).map_err(storage("Failed to deserialize record"))
}

fn load<T, Tbl>(table: &Tbl, key: &str) -> GachaResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(storage("Failed to get record"))? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

/// Decode every record of a table, optionally within a key range
fn scan_table<T, Tbl>(table: &Tbl, range: Option<(String, String)>) -> GachaResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let iter = match &range {
        Some((start, end)) => table.range::<&str>(start.as_str()..end.as_str()),
        None => table.range::<&str>(..),
    }
    .map_err(storage("Failed to iterate table"))?;

    let mut results = Vec::new();
    for entry in iter {
        let (_key, value) = entry.map_err(storage("Failed to read entry"))?;
        results.push(decode(value.value())?);
    }
    Ok(results)
}

/// Decode every record of a table along with its key
fn scan_keyed<T, Tbl>(table: &Tbl) -> GachaResult<Vec<(String, T)>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let iter = table.range::<&str>(..).map_err(storage("Failed to iterate table"))?;
    let mut results = Vec::new();
    for entry in iter {
        let (key, value) = entry.map_err(storage("Failed to read entry"))?;
        results.push((key.value().to_string(), decode(value.value())?));
    }
    Ok(results)
}

fn scan<T: DeserializeOwned>(
    read_txn: &ReadTransaction,
    definition: TableDefinition<'static, &'static str, &'static [u8]>,
) -> GachaResult<Vec<T>> {
    let table = read_txn
        .open_table(definition)
        .map_err(storage("Failed to open table"))?;
    scan_table(&table, None)
}

// ============================================================================
// Ledger Implementation
// ============================================================================

/// Read snapshot over a redb read transaction
struct SnapshotView {
    txn: ReadTransaction,
}

/// Mutable scope over an open redb write transaction
struct WriteScope<'a> {
    txn: &'a WriteTransaction,
}

/// Both views read through `open_table` on their transaction
macro_rules! impl_ledger_view {
    ($view:ty) => {
        impl LedgerView for $view {
            fn balance(&self, user_id: &str) -> GachaResult<Balance> {
                let table = self.txn.open_table(BALANCES).map_err(storage("Failed to open balances table"))?;
                Ok(load(&table, &balance_key(user_id))?.unwrap_or_default())
            }

            fn inventory_quantity(&self, user_id: &str, gift_id: &str) -> GachaResult<u64> {
                let table = self.txn.open_table(INVENTORY).map_err(storage("Failed to open inventory table"))?;
                let entry: Option<InventoryEntry> = load(&table, &inventory_key(user_id, gift_id))?;
                Ok(entry.map_or(0, |e| e.quantity))
            }

            fn inventory(&self, user_id: &str) -> GachaResult<Vec<InventoryEntry>> {
                let table = self.txn.open_table(INVENTORY).map_err(storage("Failed to open inventory table"))?;
                let entries: Vec<InventoryEntry> = scan_table(&table, Some(inventory_range(user_id)))?;
                Ok(entries
                    .into_iter()
                    .filter(|e| e.user_id == user_id && e.quantity > 0)
                    .collect())
            }

            fn transactions(&self, user_id: &str, limit: usize) -> GachaResult<Vec<TransactionRecord>> {
                let table = self.txn.open_table(TRANSACTIONS).map_err(storage("Failed to open transactions table"))?;
                let mut records: Vec<TransactionRecord> = scan_table(&table, Some(transaction_range(user_id)))?;
                records.retain(|r| r.user_id == user_id);
                records.reverse();
                records.truncate(limit);
                Ok(records)
            }

            fn recent_transactions(
                &self,
                kinds: &[TransactionKind],
                limit: usize,
            ) -> GachaResult<Vec<TransactionRecord>> {
                let table = self.txn.open_table(TRANSACTIONS).map_err(storage("Failed to open transactions table"))?;
                let keyed: Vec<(String, TransactionRecord)> = scan_keyed(&table)?;
                let mut records: Vec<(u64, TransactionRecord)> = keyed
                    .into_iter()
                    .filter(|(_, r)| kinds.contains(&r.kind))
                    .map(|(key, r)| (transaction_seq(&key).unwrap_or(0), r))
                    .collect();
                records.sort_by(|a, b| b.0.cmp(&a.0));
                records.truncate(limit);
                Ok(records.into_iter().map(|(_, r)| r).collect())
            }

            fn contract(&self, contract_id: &str) -> GachaResult<Option<UpgradeContract>> {
                let table = self.txn.open_table(CONTRACTS).map_err(storage("Failed to open contracts table"))?;
                load(&table, &contract_key(contract_id))
            }

            fn seed_state(&self, user_id: &str) -> GachaResult<Option<SeedState>> {
                let table = self.txn.open_table(SEEDS).map_err(storage("Failed to open seeds table"))?;
                load(&table, &seed_key(user_id))
            }

            fn free_case_claimed(&self, user_id: &str, case_id: &str) -> GachaResult<bool> {
                let table = self.txn.open_table(CLAIMS).map_err(storage("Failed to open claims table"))?;
                let claim: Option<FreeCaseClaim> = load(&table, &claim_key(user_id, case_id))?;
                Ok(claim.is_some())
            }
        }
    };
}

impl_ledger_view!(SnapshotView);
impl_ledger_view!(WriteScope<'_>);

impl LedgerTxn for WriteScope<'_> {
    fn adjust_balance(
        &mut self,
        user_id: &str,
        delta: i64,
        expected_version: Option<u64>,
    ) -> GachaResult<Balance> {
        let key = balance_key(user_id);
        let mut table = self.txn.open_table(BALANCES).map_err(storage("Failed to open balances table"))?;
        let current: Balance = load(&table, &key)?.unwrap_or_default();

        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(GachaError::VersionConflict {
                    expected,
                    actual: current.version,
                });
            }
        }

        let next = current.amount as i128 + delta as i128;
        if next < 0 {
            return Err(GachaError::InsufficientFunds {
                needed: delta.unsigned_abs(),
                available: current.amount,
            });
        }
        let amount = u64::try_from(next)
            .map_err(|_| GachaError::Internal(format!("balance overflow for {}", user_id)))?;

        let updated = Balance {
            amount,
            version: current.version + 1,
        };
        let value = encode(&updated)?;
        table.insert(key.as_str(), value.as_slice())
            .map_err(storage("Failed to insert balance"))?;

        debug!("Balance {} {:+} -> {} (v{})", user_id, delta, updated.amount, updated.version);
        Ok(updated)
    }

    fn adjust_inventory(&mut self, user_id: &str, gift_id: &str, delta: i64) -> GachaResult<u64> {
        let key = inventory_key(user_id, gift_id);
        let mut table = self.txn.open_table(INVENTORY).map_err(storage("Failed to open inventory table"))?;
        let current = load::<InventoryEntry, _>(&table, &key)?.map_or(0, |e| e.quantity);

        let next = current as i128 + delta as i128;
        if next < 0 {
            return Err(GachaError::InsufficientInventory {
                gift_id: gift_id.to_string(),
                needed: delta.unsigned_abs(),
                available: current,
            });
        }
        let quantity = u64::try_from(next)
            .map_err(|_| GachaError::Internal(format!("inventory overflow for {}", gift_id)))?;

        if quantity == 0 {
            table.remove(key.as_str()).map_err(storage("Failed to remove inventory row"))?;
        } else {
            let entry = InventoryEntry {
                user_id: user_id.to_string(),
                gift_id: gift_id.to_string(),
                quantity,
            };
            let value = encode(&entry)?;
            table.insert(key.as_str(), value.as_slice())
                .map_err(storage("Failed to insert inventory row"))?;
        }

        debug!("Inventory {}/{} {:+} -> {}", user_id, gift_id, delta, quantity);
        Ok(quantity)
    }

    fn append_transaction(&mut self, record: &TransactionRecord) -> GachaResult<()> {
        let seq = {
            let mut meta = self.txn.open_table(META).map_err(storage("Failed to open meta table"))?;
            let seq = load::<u64, _>(&meta, TX_SEQ_KEY)?.unwrap_or(0) + 1;
            let value = encode(&seq)?;
            meta.insert(TX_SEQ_KEY, value.as_slice())
                .map_err(storage("Failed to insert sequence"))?;
            seq
        };

        let mut table = self.txn.open_table(TRANSACTIONS).map_err(storage("Failed to open transactions table"))?;
        let value = encode(record)?;
        table.insert(transaction_key(&record.user_id, seq).as_str(), value.as_slice())
            .map_err(storage("Failed to insert transaction"))?;

        debug!("Appended {:?} transaction {} for {}", record.kind, record.id, record.user_id);
        Ok(())
    }

    fn put_contract(&mut self, contract: &UpgradeContract) -> GachaResult<()> {
        let mut table = self.txn.open_table(CONTRACTS).map_err(storage("Failed to open contracts table"))?;
        let value = encode(contract)?;
        table.insert(contract_key(&contract.id).as_str(), value.as_slice())
            .map_err(storage("Failed to insert contract"))?;
        debug!("Stored contract {} ({:?})", contract.id, contract.status);
        Ok(())
    }

    fn put_seed_state(&mut self, user_id: &str, state: &SeedState) -> GachaResult<()> {
        let mut table = self.txn.open_table(SEEDS).map_err(storage("Failed to open seeds table"))?;
        let value = encode(state)?;
        table.insert(seed_key(user_id).as_str(), value.as_slice())
            .map_err(storage("Failed to insert seed state"))?;
        Ok(())
    }

    fn mark_free_case_claimed(&mut self, user_id: &str, case_id: &str) -> GachaResult<()> {
        let mut table = self.txn.open_table(CLAIMS).map_err(storage("Failed to open claims table"))?;
        let claim = FreeCaseClaim {
            user_id: user_id.to_string(),
            case_id: case_id.to_string(),
            claimed_at: chrono::Utc::now().timestamp(),
        };
        let value = encode(&claim)?;
        table.insert(claim_key(user_id, case_id).as_str(), value.as_slice())
            .map_err(storage("Failed to insert claim"))?;
        Ok(())
    }
}

impl Ledger for GachaDb {
    fn view<T>(&self, op: impl FnOnce(&dyn LedgerView) -> GachaResult<T>) -> GachaResult<T> {
        let txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
        let snapshot = SnapshotView { txn };
        op(&snapshot)
    }

    fn atomically<T>(&self, op: impl FnOnce(&mut dyn LedgerTxn) -> GachaResult<T>) -> GachaResult<T> {
        let write_txn = self.db.begin_write().map_err(storage("Failed to begin write"))?;

        let result = {
            let mut scope = WriteScope { txn: &write_txn };
            op(&mut scope)
        };

        match result {
            Ok(value) => {
                write_txn.commit().map_err(storage("Failed to commit"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = write_txn.abort() {
                    warn!("Failed to abort transaction after {}: {}", e, abort_err);
                }
                Err(e)
            }
        }
    }
}

impl RewardCatalog for GachaDb {
    fn get_case(&self, case_id: &str) -> GachaResult<Option<Case>> {
        let txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
        let table = txn.open_table(CASES).map_err(storage("Failed to open cases table"))?;
        load(&table, &case_key(case_id))
    }

    fn get_gift(&self, gift_id: &str) -> GachaResult<Option<Gift>> {
        let txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
        let table = txn.open_table(GIFTS).map_err(storage("Failed to open gifts table"))?;
        load(&table, &gift_key(gift_id))
    }

    fn gifts_in_range(&self, min: u64, max: u64) -> GachaResult<Vec<Gift>> {
        let txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
        let mut gifts: Vec<Gift> = scan(&txn, GIFTS)?;
        gifts.retain(|g| g.price >= min && g.price <= max);
        sort_by_price(&mut gifts);
        Ok(gifts)
    }

    fn list_cases(&self) -> GachaResult<Vec<Case>> {
        let txn = self.db.begin_read().map_err(storage("Failed to begin read"))?;
        let mut cases: Vec<Case> = scan(&txn, CASES)?;
        cases.retain(|c| c.is_active);
        sort_cases(&mut cases);
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CaseReward, Rarity};

    fn catalog() -> CatalogFile {
        CatalogFile {
            gifts: vec![
                Gift {
                    id: "cake".into(),
                    name: "Delicious Cake".into(),
                    price: 100,
                    rarity: Rarity::Common,
                    media: String::new(),
                },
                Gift {
                    id: "star".into(),
                    name: "Blue Star".into(),
                    price: 300,
                    rarity: Rarity::Epic,
                    media: String::new(),
                },
            ],
            cases: vec![Case {
                id: "basic".into(),
                name: "Basic".into(),
                price: 50,
                is_active: true,
                rewards: vec![CaseReward {
                    gift_id: "cake".into(),
                    weight: 1.0,
                }],
            }],
        }
    }

    #[test]
    fn test_catalog_round_trip() {
        let db = GachaDb::open_in_memory().unwrap();
        assert_eq!(db.import_catalog(&catalog()).unwrap(), (2, 1));

        assert_eq!(db.get_gift("star").unwrap().unwrap().price, 300);
        assert_eq!(db.get_case("basic").unwrap().unwrap().rewards.len(), 1);
        assert!(db.get_case("missing").unwrap().is_none());
        assert_eq!(db.gifts_in_range(150, 1000).unwrap().len(), 1);
        assert_eq!(db.list_cases().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_catalog_not_imported() {
        let db = GachaDb::open_in_memory().unwrap();
        let mut bad = catalog();
        bad.cases[0].rewards.clear();
        assert!(db.import_catalog(&bad).is_err());
        assert!(db.list_gifts().unwrap().is_empty());
    }

    #[test]
    fn test_balance_never_negative() {
        let db = GachaDb::open_in_memory().unwrap();
        db.atomically(|txn| txn.adjust_balance("u1", 100, None)).unwrap();

        let err = db.atomically(|txn| txn.adjust_balance("u1", -101, None)).unwrap_err();
        assert_eq!(
            err,
            GachaError::InsufficientFunds {
                needed: 101,
                available: 100
            }
        );

        let balance = db.view(|view| view.balance("u1")).unwrap();
        assert_eq!(balance, Balance { amount: 100, version: 1 });
    }

    #[test]
    fn test_balance_version_check() {
        let db = GachaDb::open_in_memory().unwrap();
        db.atomically(|txn| txn.adjust_balance("u1", 10, Some(0))).unwrap();

        let err = db.atomically(|txn| txn.adjust_balance("u1", 10, Some(0))).unwrap_err();
        assert_eq!(err, GachaError::VersionConflict { expected: 0, actual: 1 });

        let balance = db.atomically(|txn| txn.adjust_balance("u1", -5, Some(1))).unwrap();
        assert_eq!(balance, Balance { amount: 5, version: 2 });
    }

    #[test]
    fn test_inventory_row_removed_at_zero() {
        let db = GachaDb::open_in_memory().unwrap();
        db.atomically(|txn| txn.adjust_inventory("u1", "cake", 2)).unwrap();
        assert_eq!(db.list_inventory("u1").unwrap().len(), 1);

        let err = db.atomically(|txn| txn.adjust_inventory("u1", "cake", -3)).unwrap_err();
        assert!(matches!(err, GachaError::InsufficientInventory { available: 2, .. }));

        assert_eq!(db.atomically(|txn| txn.adjust_inventory("u1", "cake", -2)).unwrap(), 0);
        assert!(db.list_inventory("u1").unwrap().is_empty());
        assert_eq!(db.view(|view| view.inventory_quantity("u1", "cake")).unwrap(), 0);
    }

    #[test]
    fn test_failed_operation_commits_nothing() {
        let db = GachaDb::open_in_memory().unwrap();
        db.atomically(|txn| txn.adjust_balance("u1", 100, None)).unwrap();

        let result: GachaResult<()> = db.atomically(|txn| {
            txn.adjust_balance("u1", -60, None)?;
            txn.adjust_inventory("u1", "cake", 1)?;
            txn.append_transaction(&TransactionRecord::new("u1", TransactionKind::CaseOpen))?;
            txn.adjust_inventory("u1", "star", -1)?;
            Ok(())
        });
        assert!(result.is_err());

        assert_eq!(db.view(|view| view.balance("u1")).unwrap().amount, 100);
        assert!(db.list_inventory("u1").unwrap().is_empty());
        assert!(db.list_transactions("u1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_transactions_newest_first() {
        let db = GachaDb::open_in_memory().unwrap();
        db.atomically(|txn| {
            txn.append_transaction(&TransactionRecord::new("u1", TransactionKind::Deposit).balance(500))?;
            txn.append_transaction(&TransactionRecord::new("u2", TransactionKind::Deposit).balance(1))?;
            txn.append_transaction(&TransactionRecord::new("u1", TransactionKind::CaseOpen).balance(-50))
        })
        .unwrap();

        let history = db.list_transactions("u1", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::CaseOpen);
        assert_eq!(db.list_transactions("u1", 1).unwrap().len(), 1);

        db.atomically(|txn| txn.adjust_balance("u1", 500, None)).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_deposits, 501);
        assert_eq!(stats.cases_opened, 1);
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.active_users, 2);
    }

    #[test]
    fn test_active_users_window() {
        let db = GachaDb::open_in_memory().unwrap();
        let mut stale = TransactionRecord::new("old", TransactionKind::Deposit).balance(5);
        stale.created_at -= ACTIVE_WINDOW_SECS + 60;
        db.atomically(|txn| {
            txn.append_transaction(&stale)?;
            txn.append_transaction(&TransactionRecord::new("new", TransactionKind::Deposit).balance(5))?;
            txn.append_transaction(&TransactionRecord::new("new", TransactionKind::Withdrawal).balance(-5))
        })
        .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.active_users, 1);
    }

    #[test]
    fn test_recent_transactions_across_users() {
        let db = GachaDb::open_in_memory().unwrap();
        db.atomically(|txn| {
            txn.append_transaction(&TransactionRecord::new("zed", TransactionKind::CaseReward).gift("cake", 1))?;
            txn.append_transaction(&TransactionRecord::new("amy", TransactionKind::Deposit).balance(5))?;
            txn.append_transaction(&TransactionRecord::new("amy", TransactionKind::CaseReward).gift("star", 1))?;
            txn.append_transaction(&TransactionRecord::new("bob", TransactionKind::UpgradeReward).gift("ring", 1))
        })
        .unwrap();

        let kinds = [TransactionKind::CaseReward, TransactionKind::UpgradeReward];
        let recent = db.view(|view| view.recent_transactions(&kinds, 10)).unwrap();
        let gifts: Vec<_> = recent.iter().map(|r| r.gift_id.as_deref().unwrap()).collect();
        assert_eq!(gifts, vec!["ring", "star", "cake"]);
        assert_eq!(db.view(|view| view.recent_transactions(&kinds, 1)).unwrap().len(), 1);
    }
}
