use anyhow::Result;
use category_engine::{
    default_categories, import_csv, CategorizationEngine, CategorizeRequest, RuleMiner,
    SqliteStore, Store, Target,
};
use chrono::Utc;
use std::env;
use std::sync::Arc;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("seed") => run_seed()?,
        Some("import") if args.len() > 2 => run_import(&args[2])?,
        Some("categorize") if args.len() > 2 => {
            let description = args.get(3).map(String::as_str).unwrap_or("");
            run_categorize(&args[2], description)?;
        }
        Some("mine") => run_mine()?,
        _ => print_usage(),
    }

    Ok(())
}

fn print_usage() {
    println!("category-engine - automatic transaction categorization");
    println!();
    println!("Usage:");
    println!("  category-engine seed                              Create default categories");
    println!("  category-engine import <file.csv>                 Import transactions");
    println!("  category-engine categorize <merchant> [descr]     Classify ad-hoc text");
    println!("  category-engine mine                              Propose rules from history");
    println!();
    println!("Database path comes from CATEGORY_DB (default: ./categories.db)");
}

fn open_store() -> Result<SqliteStore> {
    let path = env::var("CATEGORY_DB").unwrap_or_else(|_| "categories.db".to_string());
    SqliteStore::open(path)
}

fn run_seed() -> Result<()> {
    let store = open_store()?;

    if !store.categories()?.is_empty() {
        println!("✓ Categories already present, nothing to do");
        return Ok(());
    }

    let categories = default_categories();
    for category in &categories {
        store.insert_category(category)?;
    }
    println!("✓ Created {} default categories", categories.len());
    Ok(())
}

fn run_import(path: &str) -> Result<()> {
    let store = open_store()?;

    println!("📂 Importing {}...", path);
    let report = import_csv(path, &store)?;

    println!("✓ Imported {} transactions", report.imported);
    if report.unresolved_categories > 0 {
        println!(
            "⚠ {} rows carried an unknown category name (left unassigned)",
            report.unresolved_categories
        );
    }
    Ok(())
}

fn run_categorize(merchant: &str, description: &str) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(open_store()?);

    #[cfg(feature = "ai")]
    let engine = CategorizationEngine::new(store).with_ai_from_env();
    #[cfg(not(feature = "ai"))]
    let engine = CategorizationEngine::new(store);

    let request = CategorizeRequest {
        targets: vec![Target::ad_hoc(merchant, description)],
        ..CategorizeRequest::default()
    };
    let response = engine.categorize(&request, Utc::now())?;

    let suggestion = &response.suggestions[0];
    match &suggestion.category_name {
        Some(name) => println!(
            "🏷️  {} (confidence: {:.2}, source: {}, reason: {})",
            name,
            suggestion.confidence,
            suggestion.source.as_str(),
            suggestion.reason
        ),
        None => println!("❓ No suggestion ({})", suggestion.reason),
    }
    Ok(())
}

fn run_mine() -> Result<()> {
    let store = open_store()?;

    println!("⛏️  Mining rule candidates...");
    let candidates = RuleMiner::new().mine(&store)?;

    if candidates.is_empty() {
        println!("✓ No candidates (history too short or too ambiguous)");
        return Ok(());
    }

    println!("✓ {} candidates:", candidates.len());
    for candidate in &candidates {
        println!(
            "  {} → {} (share: {:.0}%, {}/{} transactions)",
            candidate.merchant_pattern,
            candidate.suggested_category_id,
            candidate.share * 100.0,
            candidate.count,
            candidate.total
        );
    }
    Ok(())
}
