use crate::errors::IngestError;
use crate::ingest::IngestService;
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{error, web, FromRequest, HttpRequest, HttpResponse, Responder};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "X-API-Key";
const MAX_TOP_K: usize = 20;

/// State shared by every request handler
pub struct AppState {
    pub service: Arc<IngestService>,
    /// When set, protected endpoints require this exact key
    pub auth_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub result: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

fn detail(message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        detail: message.into(),
    }
}

/// Proof that the request carried the configured API key, or that no key is configured.
///
/// The key is read from `X-API-Key`, falling back to `Authorization: Bearer <key>`.
pub struct Authorized;

impl FromRequest for Authorized {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(error::ErrorInternalServerError("application state missing")));
        };
        let Some(expected) = state.auth_key.as_deref() else {
            return ready(Ok(Authorized));
        };

        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .or_else(|| {
                req.headers()
                    .get(AUTHORIZATION)
                    .and_then(|h| h.to_str().ok())
                    .and_then(|h| h.strip_prefix("Bearer "))
            });

        if provided == Some(expected) {
            ready(Ok(Authorized))
        } else {
            warn!("Rejected request to {}: invalid or missing API key", req.path());
            let response = HttpResponse::Unauthorized().json(detail("Invalid or missing API Key"));
            ready(Err(error::InternalError::from_response("unauthorized", response).into()))
        }
    }
}

fn gateway_error_response(err: &IngestError) -> HttpResponse {
    match err {
        IngestError::NotInitialized => {
            HttpResponse::ServiceUnavailable().json(detail(err.to_string()))
        }
        _ => HttpResponse::InternalServerError().json(detail(err.to_string())),
    }
}

/// GET /
pub async fn root() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse {
        message: "RAG indexer is running.".to_string(),
    })
}

/// GET /api/v1/health
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/v1/index - queue a document for the next batch
pub async fn index_document(
    _auth: Authorized,
    state: web::Data<AppState>,
    req: web::Json<IndexRequest>,
) -> impl Responder {
    let IndexRequest { id, content } = req.into_inner();
    if id.is_empty() {
        return HttpResponse::BadRequest().json(detail("Document id must not be empty"));
    }

    state.service.accept_upsert(id, content);
    HttpResponse::Accepted().json(ApiResponse {
        message: "Document accepted and queued for indexing.".to_string(),
    })
}

/// DELETE /api/v1/index/{doc_id} - remove a document right away
pub async fn delete_document(
    _auth: Authorized,
    state: web::Data<AppState>,
    doc_id: web::Path<String>,
) -> impl Responder {
    let doc_id = doc_id.into_inner();
    match state.service.delete_immediate(&[doc_id.clone()]).await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse {
            message: format!("Document with ID '{}' deleted successfully.", doc_id),
        }),
        Err(e) => {
            error!("Failed to delete document {}: {}", doc_id, e);
            gateway_error_response(&e)
        }
    }
}

/// POST /api/v1/query
pub async fn query_documents(
    _auth: Authorized,
    state: web::Data<AppState>,
    req: web::Json<QueryRequest>,
) -> impl Responder {
    let QueryRequest { query, top_k } = req.into_inner();
    if !(1..=MAX_TOP_K).contains(&top_k) {
        return HttpResponse::UnprocessableEntity().json(detail(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }

    match state.service.query(&query, top_k).await {
        Ok(result) => HttpResponse::Ok().json(QueryResponse { result }),
        Err(e) => {
            error!("Failed to execute query: {}", e);
            gateway_error_response(&e)
        }
    }
}

/// GET /api/v1/stats
pub async fn stats(_auth: Authorized, state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.service.stats())
}

/// Register all routes. `AppState` must be added as app data by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::UnprocessableEntity().json(detail(err.to_string()));
        error::InternalError::from_response(err, response).into()
    });

    cfg.app_data(json_config)
        .route("/", web::get().to(root))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health))
                .route("/index", web::post().to(index_document))
                .route("/index/{doc_id}", web::delete().to(delete_document))
                .route("/query", web::post().to(query_documents))
                .route("/stats", web::get().to(stats)),
        );
}
