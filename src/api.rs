//! # API Server Module
//!
//! ## Purpose
//! REST API server exposing the retrieval and ingestion operations of the
//! legal text store.
//!
//! ## Input/Output Specification
//! - **Input**: HTTP requests with code/section filters and search queries
//! - **Output**: JSON responses with result counts and unit payloads
//! - **Endpoints**: health, codes, structural query, semantic search, import
//!
//! ## Key Features
//! - Structured JSON error responses with HTTP status mapping
//! - CORS support for web frontends
//! - Request logging via tracing

use crate::errors::{Result, StoreError};
use crate::search::SearchOptions;
use crate::{AppState, TextUnit};
use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use serde::{Deserialize, Serialize};

/// API server over the shared application state
pub struct ApiServer {
    app_state: AppState,
}

/// Structural query parameters
#[derive(Debug, Deserialize)]
struct QueryParams {
    section: Option<String>,
    sub_section: Option<String>,
}

/// Semantic search parameters
#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
    cutoff: Option<f32>,
}

/// One unit in a structural query response
#[derive(Debug, Serialize)]
struct UnitResponse {
    code: String,
    section: String,
    sub_section: Option<String>,
    text: String,
}

impl From<TextUnit> for UnitResponse {
    fn from(unit: TextUnit) -> Self {
        Self {
            code: unit.code,
            section: unit.section,
            sub_section: unit.sub_section,
            text: unit.text,
        }
    }
}

/// One unit in a semantic search response
#[derive(Debug, Serialize)]
struct SearchHitResponse {
    code: String,
    section: String,
    sub_section: Option<String>,
    text: String,
    similarity_score: f32,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

impl ApiServer {
    /// Create a new API server
    pub async fn new(app_state: AppState) -> Result<Self> {
        Ok(Self { app_state })
    }

    /// Run the API server until shutdown
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.app_state.config.server.host, self.app_state.config.server.port
        );
        let enable_cors = self.app_state.config.server.enable_cors;
        let workers = self.app_state.config.server.workers.max(1);
        let state = self.app_state;

        tracing::info!("Starting API server on {}", bind_addr);

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(Condition::new(enable_cors, Cors::permissive()))
                .route("/health", web::get().to(health_handler))
                .route("/stats", web::get().to(stats_handler))
                .route(
                    "/legal-texts/gesetze-im-internet/codes",
                    web::get().to(codes_handler),
                )
                .route(
                    "/legal-texts/gesetze-im-internet/{code}",
                    web::get().to(query_handler),
                )
                .route(
                    "/legal-texts/gesetze-im-internet/{code}",
                    web::post().to(import_handler),
                )
                .route(
                    "/legal-texts/gesetze-im-internet/{code}/search",
                    web::get().to(search_handler),
                )
        })
        .workers(workers)
        .bind(&bind_addr)
        .map_err(|e| StoreError::Internal {
            message: format!("Failed to bind server to {}: {}", bind_addr, e),
        })?
        .run();

        server.await.map_err(|e| StoreError::Internal {
            message: format!("Server error: {}", e),
        })?;

        Ok(())
    }
}

/// Map store errors onto HTTP responses with a JSON `detail` body
fn error_response(err: &StoreError) -> HttpResponse {
    let body = serde_json::json!({
        "detail": err.to_string(),
        "category": err.category(),
    });
    match err {
        StoreError::NotFound { .. } => HttpResponse::NotFound().json(body),
        StoreError::Validation { .. } => HttpResponse::BadRequest().json(body),
        StoreError::RateLimited { .. } => HttpResponse::TooManyRequests().json(body),
        StoreError::Parse { .. }
        | StoreError::Network { .. }
        | StoreError::EmbeddingTimeout { .. }
        | StoreError::EmbeddingService { .. } => HttpResponse::BadGateway().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Health check endpoint handler
async fn health_handler(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let status = match state.store.health_check() {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::error!(error = %e, "storage health check failed");
            "unhealthy"
        }
    };

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Statistics endpoint handler
async fn stats_handler(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let stats = state.store.get_stats();
    let codes = state.store.list_codes().map(|c| c.len()).unwrap_or(0);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "storage": stats,
        "codes": codes,
    })))
}

/// List all codes with stored units
async fn codes_handler(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    match state.retrieval.list_codes() {
        Ok(codes) => Ok(HttpResponse::Ok().json(serde_json::json!({ "codes": codes }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Structural query: all units of a code, optionally filtered by section and
/// sub-section
async fn query_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<QueryParams>,
) -> ActixResult<HttpResponse> {
    let code = path.into_inner();
    let result = state
        .retrieval
        .query(
            &code,
            params.section.as_deref(),
            params.sub_section.as_deref(),
        )
        .await;

    match result {
        Ok(units) => {
            let results: Vec<UnitResponse> = units.into_iter().map(UnitResponse::from).collect();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "code": code,
                "count": results.len(),
                "results": results,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Semantic search over one code's units
async fn search_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<SearchParams>,
) -> ActixResult<HttpResponse> {
    let code = path.into_inner();
    let options = SearchOptions {
        limit: params
            .limit
            .unwrap_or(state.config.search.default_limit),
        cutoff: params
            .cutoff
            .unwrap_or(state.config.search.default_cutoff),
    };

    match state.retrieval.search(&code, &params.q, options).await {
        Ok(hits) => {
            let results: Vec<SearchHitResponse> = hits
                .into_iter()
                .map(|hit| SearchHitResponse {
                    code: hit.unit.code,
                    section: hit.unit.section,
                    sub_section: hit.unit.sub_section,
                    text: hit.unit.text,
                    similarity_score: hit.similarity_score,
                })
                .collect();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "query": params.q,
                "code": code,
                "count": results.len(),
                "results": results,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Import (ingest) one code from the upstream source
async fn import_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let code = path.into_inner();
    match state.pipeline.ingest(&code).await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(e) => Ok(error_response(&e)),
    }
}
