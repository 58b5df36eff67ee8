// 🗄️ Persistence Layer - Store trait + SQLite and in-memory backings
// The classification core only reads through this seam; the apply and
// rule-creation phases are the only writers.

use crate::models::{Category, CategorySource, CategoryType, Rule, Transaction};
use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, RwLock};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Read/write boundary between the categorization core and persistence.
///
/// Read methods feed the pipeline and the miner; `assign_category` and
/// `create_rule` are the two write operations the core performs.
pub trait Store: Send + Sync {
    /// All categories, in name order.
    fn categories(&self) -> Result<Vec<Category>>;

    /// All rules, unordered (the matcher does its own precedence sort).
    fn rules(&self) -> Result<Vec<Rule>>;

    /// Up to `cap` most recent transactions with a non-null category,
    /// newest first. Snapshot input for the centroid build.
    fn labeled_transactions(&self, cap: usize) -> Result<Vec<Transaction>>;

    /// Up to `limit` most recent transactions whose assigned category is an
    /// expense category and whose merchant is non-empty, newest first.
    /// Window input for the rule miner.
    fn recent_expense_transactions(&self, limit: usize) -> Result<Vec<Transaction>>;

    /// Look up a single transaction by id.
    fn transaction(&self, id: &str) -> Result<Option<Transaction>>;

    /// Set a transaction's category (apply phase). Missing transaction is
    /// an error; the caller isolates it per target.
    fn assign_category(
        &self,
        transaction_id: &str,
        category_id: &str,
        source: CategorySource,
        confidence: f64,
    ) -> Result<()>;

    fn insert_category(&self, category: &Category) -> Result<()>;

    fn insert_rule(&self, rule: &Rule) -> Result<()>;

    fn insert_transaction(&self, transaction: &Transaction) -> Result<()>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed store. The connection sits behind a mutex so the store can
/// be shared across server handlers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// In-memory SQLite database (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

fn setup_schema(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery (no-op for in-memory databases)
    let _ = conn.pragma_update(None, "journal_mode", "WAL");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category_type TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rules (
            id TEXT PRIMARY KEY,
            pattern TEXT NOT NULL,
            is_regex INTEGER NOT NULL DEFAULT 0,
            merchant_only INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            category_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            merchant TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            category_id TEXT,
            category_source TEXT,
            suggested_category_id TEXT,
            suggested_confidence REAL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_category ON transactions(category_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_created ON transactions(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rules_priority ON rules(priority)",
        [],
    )?;

    Ok(())
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let source: Option<String> = row.get(5)?;
    let created_at: String = row.get(8)?;
    Ok(Transaction {
        id: row.get(0)?,
        merchant: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        category_id: row.get(4)?,
        category_source: source.as_deref().and_then(CategorySource::from_str),
        suggested_category_id: row.get(6)?,
        suggested_confidence: row.get(7)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
}

const TX_COLUMNS: &str = "id, merchant, description, amount, category_id, category_source, \
                          suggested_category_id, suggested_confidence, created_at";

impl Store for SqliteStore {
    fn categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, category_type FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], |row| {
                let kind: String = row.get(2)?;
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    category_type: CategoryType::from_str(&kind).unwrap_or(CategoryType::Expense),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    fn rules(&self) -> Result<Vec<Rule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, pattern, is_regex, merchant_only, priority, category_id, created_at
             FROM rules",
        )?;
        let rules = stmt
            .query_map([], |row| {
                let created_at: String = row.get(6)?;
                Ok(Rule {
                    id: row.get(0)?,
                    pattern: row.get(1)?,
                    is_regex: row.get::<_, i64>(2)? != 0,
                    merchant_only: row.get::<_, i64>(3)? != 0,
                    priority: row.get(4)?,
                    category_id: row.get(5)?,
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    fn labeled_transactions(&self, cap: usize) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE category_id IS NOT NULL
             ORDER BY created_at DESC
             LIMIT ?1"
        ))?;
        let transactions = stmt
            .query_map(params![cap as i64], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    fn recent_expense_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.merchant, t.description, t.amount, t.category_id, t.category_source,
                    t.suggested_category_id, t.suggested_confidence, t.created_at
             FROM transactions t
             JOIN categories c ON c.id = t.category_id
             WHERE c.category_type = 'Expense' AND TRIM(t.merchant) != ''
             ORDER BY t.created_at DESC
             LIMIT ?1",
        )?;
        let transactions = stmt
            .query_map(params![limit as i64], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    fn transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1"))?;
        let transaction = stmt.query_row(params![id], row_to_transaction).optional()?;
        Ok(transaction)
    }

    fn assign_category(
        &self,
        transaction_id: &str,
        category_id: &str,
        source: CategorySource,
        confidence: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE transactions
             SET category_id = ?1, category_source = ?2,
                 suggested_category_id = ?1, suggested_confidence = ?3
             WHERE id = ?4",
            params![category_id, source.as_str(), confidence, transaction_id],
        )?;
        if updated == 0 {
            anyhow::bail!("Transaction not found: {}", transaction_id);
        }
        Ok(())
    }

    fn insert_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO categories (id, name, category_type) VALUES (?1, ?2, ?3)",
            params![category.id, category.name, category.category_type.as_str()],
        )?;
        Ok(())
    }

    fn insert_rule(&self, rule: &Rule) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rules (id, pattern, is_regex, merchant_only, priority, category_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rule.id,
                rule.pattern,
                rule.is_regex as i64,
                rule.merchant_only as i64,
                rule.priority,
                rule.category_id,
                rule.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO transactions
             (id, merchant, description, amount, category_id, category_source,
              suggested_category_id, suggested_confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                transaction.id,
                transaction.merchant,
                transaction.description,
                transaction.amount,
                transaction.category_id,
                transaction.category_source.map(|s| s.as_str()),
                transaction.suggested_category_id,
                transaction.suggested_confidence,
                transaction.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory store for tests and ad-hoc pipelines.
#[derive(Default)]
pub struct MemoryStore {
    categories: RwLock<Vec<Category>>,
    rules: RwLock<Vec<Rule>>,
    transactions: RwLock<Vec<Transaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.categories.read().unwrap().clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    fn rules(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.read().unwrap().clone())
    }

    fn labeled_transactions(&self, cap: usize) -> Result<Vec<Transaction>> {
        let mut labeled: Vec<Transaction> = self
            .transactions
            .read()
            .unwrap()
            .iter()
            .filter(|tx| tx.category_id.is_some())
            .cloned()
            .collect();
        labeled.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        labeled.truncate(cap);
        Ok(labeled)
    }

    fn recent_expense_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let expense_ids: Vec<String> = self
            .categories
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.category_type == CategoryType::Expense)
            .map(|c| c.id.clone())
            .collect();

        let mut recent: Vec<Transaction> = self
            .transactions
            .read()
            .unwrap()
            .iter()
            .filter(|tx| {
                !tx.merchant.trim().is_empty()
                    && tx
                        .category_id
                        .as_ref()
                        .map(|id| expense_ids.contains(id))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }

    fn transaction(&self, id: &str) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .iter()
            .find(|tx| tx.id == id)
            .cloned())
    }

    fn assign_category(
        &self,
        transaction_id: &str,
        category_id: &str,
        source: CategorySource,
        confidence: f64,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().unwrap();
        let tx = transactions
            .iter_mut()
            .find(|tx| tx.id == transaction_id)
            .ok_or_else(|| anyhow::anyhow!("Transaction not found: {}", transaction_id))?;
        tx.category_id = Some(category_id.to_string());
        tx.category_source = Some(source);
        tx.suggested_category_id = Some(category_id.to_string());
        tx.suggested_confidence = Some(confidence);
        Ok(())
    }

    fn insert_category(&self, category: &Category) -> Result<()> {
        self.categories.write().unwrap().push(category.clone());
        Ok(())
    }

    fn insert_rule(&self, rule: &Rule) -> Result<()> {
        self.rules.write().unwrap().push(rule.clone());
        Ok(())
    }

    fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.transactions.write().unwrap().push(transaction.clone());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seed(store: &dyn Store) -> (Category, Category) {
        let groceries = Category::new("Groceries", CategoryType::Expense);
        let salary = Category::new("Salary", CategoryType::Income);
        store.insert_category(&groceries).unwrap();
        store.insert_category(&salary).unwrap();
        (groceries, salary)
    }

    #[test]
    fn test_sqlite_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (groceries, _) = seed(&store);

        let rule = Rule::merchant_literal("migros", &groceries.id, 50);
        store.insert_rule(&rule).unwrap();

        let tx = Transaction::new("MIGROS", "card purchase", -42.50);
        store.insert_transaction(&tx).unwrap();

        let rules = store.rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, "migros");
        assert!(rules[0].merchant_only);

        let fetched = store.transaction(&tx.id).unwrap().unwrap();
        assert_eq!(fetched.merchant, "MIGROS");
        assert!(fetched.category_id.is_none());
    }

    #[test]
    fn test_sqlite_assign_category() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (groceries, _) = seed(&store);

        let tx = Transaction::new("MIGROS", "card purchase", -42.50);
        store.insert_transaction(&tx).unwrap();

        store
            .assign_category(&tx.id, &groceries.id, CategorySource::Ml, 0.8)
            .unwrap();

        let fetched = store.transaction(&tx.id).unwrap().unwrap();
        assert_eq!(fetched.category_id.as_deref(), Some(groceries.id.as_str()));
        assert_eq!(fetched.category_source, Some(CategorySource::Ml));
        assert_eq!(fetched.suggested_confidence, Some(0.8));

        // Missing transaction is an error, isolated by the caller
        assert!(store
            .assign_category("no-such-id", &groceries.id, CategorySource::Ml, 0.8)
            .is_err());
    }

    #[test]
    fn test_labeled_transactions_cap_and_order() {
        let store = MemoryStore::new();
        let (groceries, _) = seed(&store);

        let base = Utc::now();
        for i in 0..5 {
            let mut tx = Transaction::new(format!("SHOP {i}"), "", -10.0)
                .with_category(&groceries.id, CategorySource::User);
            tx.created_at = base + Duration::seconds(i);
            store.insert_transaction(&tx).unwrap();
        }
        // Unlabeled transactions are never part of the snapshot
        store
            .insert_transaction(&Transaction::new("UNLABELED", "", -1.0))
            .unwrap();

        let snapshot = store.labeled_transactions(3).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].merchant, "SHOP 4"); // newest first
    }

    #[test]
    fn test_recent_expense_transactions_filters_income_and_blank_merchants() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (groceries, salary) = seed(&store);

        store
            .insert_transaction(
                &Transaction::new("MIGROS", "", -42.50)
                    .with_category(&groceries.id, CategorySource::User),
            )
            .unwrap();
        store
            .insert_transaction(
                &Transaction::new("ACME CORP", "payroll", 3000.0)
                    .with_category(&salary.id, CategorySource::User),
            )
            .unwrap();
        store
            .insert_transaction(
                &Transaction::new("  ", "no merchant", -5.0)
                    .with_category(&groceries.id, CategorySource::User),
            )
            .unwrap();

        let window = store.recent_expense_transactions(100).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].merchant, "MIGROS");
    }
}
