// 📂 CSV Import - Load bank-export rows into the store
// Labeled rows resolve their category name against the live category list;
// unknown names leave the transaction unassigned instead of failing the row

use crate::models::{CategorySource, Transaction};
use crate::store::Store;
use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// CSV ROW
// ============================================================================

#[derive(Debug, Deserialize)]
struct ImportRow {
    #[serde(rename = "Merchant")]
    merchant: String,

    #[serde(rename = "Description", default)]
    description: String,

    #[serde(rename = "Amount")]
    amount: f64,

    /// Optional category name; resolved case-insensitively
    #[serde(rename = "Category", default)]
    category: String,
}

// ============================================================================
// IMPORT REPORT
// ============================================================================

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,

    /// Rows that carried a category name no current category matches
    pub unresolved_categories: usize,
}

// ============================================================================
// IMPORT
// ============================================================================

/// Read a CSV export and insert each row as a transaction.
pub fn import_csv<P: AsRef<Path>>(path: P, store: &dyn Store) -> Result<ImportReport> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open CSV file: {:?}", path.as_ref()))?;

    let categories = store.categories()?;
    let mut report = ImportReport::default();

    for row in reader.deserialize() {
        let row: ImportRow = row.context("Failed to parse CSV row")?;

        let mut tx = Transaction::new(row.merchant, row.description, row.amount);

        let label = row.category.trim();
        if !label.is_empty() {
            let lower = label.to_lowercase();
            match categories.iter().find(|c| c.name.to_lowercase() == lower) {
                Some(category) => {
                    tx = tx.with_category(&category.id, CategorySource::User);
                }
                None => report.unresolved_categories += 1,
            }
        }

        store.insert_transaction(&tx)?;
        report.imported += 1;
    }

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategoryType};
    use crate::store::MemoryStore;
    use std::io::Write;

    fn write_csv(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("import-{}.csv", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_import_labeled_and_unlabeled_rows() {
        let store = MemoryStore::new();
        store
            .insert_category(&Category {
                id: "cat-market".to_string(),
                name: "Market".to_string(),
                category_type: CategoryType::Expense,
            })
            .unwrap();

        let path = write_csv(
            "Merchant,Description,Amount,Category\n\
             MIGROS,card purchase,-42.50,market\n\
             UNKNOWN SHOP,,-10.00,\n\
             CAFEX,espresso,-3.20,No Such Category\n",
        );

        let report = import_csv(&path, &store).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(report.imported, 3);
        assert_eq!(report.unresolved_categories, 1);

        let labeled = store.labeled_transactions(100).unwrap();
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].merchant, "MIGROS");
        assert_eq!(labeled[0].category_id.as_deref(), Some("cat-market"));
        assert_eq!(labeled[0].category_source, Some(CategorySource::User));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let store = MemoryStore::new();
        assert!(import_csv("/no/such/file.csv", &store).is_err());
    }
}
