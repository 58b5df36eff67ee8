// Category Engine - Web Server
// REST API exposing the categorization pipeline and the rule miner

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use category_engine::{
    CategorizationEngine, CategorizeRequest, RuleCandidate, RuleMiner, SqliteStore, Store,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<CategorizationEngine>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(data: T, message: String) -> Self {
        Self {
            success: false,
            data,
            error: Some(message),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/categorize - Run the suggestion pipeline for a batch of targets
///
/// Body and response follow the categorization contract:
/// { targets, strategy?, threshold?, apply?, saveRules? } in,
/// { threshold, suggestions, applied, createdRules } out.
async fn categorize(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(request): Json<CategorizeRequest>,
) -> impl IntoResponse {
    let engine = state.engine.clone();

    // The pipeline is synchronous (SQLite + blocking HTTP for the AI stage)
    let result =
        tokio::task::spawn_blocking(move || engine.categorize(&request, Utc::now())).await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(e)) => {
            eprintln!("Error categorizing batch: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            eprintln!("Categorize task panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/rules/candidates - Mine rule candidates from recent history
async fn rule_candidates(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    let engine = state.engine.clone();

    let result = tokio::task::spawn_blocking(move || {
        RuleMiner::new().mine(engine.store().as_ref())
    })
    .await;

    match result {
        Ok(Ok(candidates)) => (StatusCode::OK, Json(ApiResponse::ok(candidates))).into_response(),
        Ok(Err(e)) => {
            eprintln!("Error mining rule candidates: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(Vec::<RuleCandidate>::new(), e.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            eprintln!("Mining task panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Category Engine - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path =
        std::env::var("CATEGORY_DB").unwrap_or_else(|_| "categories.db".to_string());
    let store: Arc<dyn Store> =
        Arc::new(SqliteStore::open(&db_path).expect("Failed to open database"));
    println!("✓ Database opened: {}", db_path);

    #[cfg(feature = "ai")]
    let engine = CategorizationEngine::new(store).with_ai_from_env();
    #[cfg(not(feature = "ai"))]
    let engine = CategorizationEngine::new(store);

    let state = AppState {
        engine: Arc::new(engine),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/categorize", post(categorize))
        .route("/rules/candidates", get(rule_candidates))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   POST http://localhost:3000/api/categorize");
    println!("   GET  http://localhost:3000/api/rules/candidates");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
