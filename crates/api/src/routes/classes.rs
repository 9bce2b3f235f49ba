//! Class search, detail and booking endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use booking_store::BookingWithRelations;
use common::ClassInstanceId;
use domain::{BookClass, ClassDetails, ClassService, SearchResult, StyleFilter};
use serde::Deserialize;

use crate::BookingBackend;
use crate::error::ApiError;

/// Header carrying the caller's idempotency key on booking requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared application state accessible from all handlers.
pub struct AppState<S: BookingBackend> {
    pub service: ClassService<S, S, S>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "type")]
    pub style: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookClassRequest {
    pub email: String,
    pub class_instance_id: String,
}

// -- Handlers --

/// GET /classes/search?type=: list classes of a style, or all of them.
#[tracing::instrument(skip(state))]
pub async fn search<S: BookingBackend>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResult>, ApiError> {
    let filter = match params.style.as_deref() {
        None | Some("") => StyleFilter::Any,
        Some(raw) => raw
            .parse::<StyleFilter>()
            .map_err(|e| ApiError::BadRequest(format!("Invalid type: {e}")))?,
    };

    let result = state.service.search_classes(filter).await?;
    Ok(Json(result))
}

/// GET /classes/{id}: details of one class instance.
#[tracing::instrument(skip(state))]
pub async fn get<S: BookingBackend>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ClassDetails>, ApiError> {
    let id = parse_class_instance_id("id", &id)?;
    let details = state.service.get_class_by_id(id).await?;
    Ok(Json(details))
}

/// POST /classes/book: book a seat, idempotent on the `idempotency-key` header.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn book<S: BookingBackend>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    payload: Result<Json<BookClassRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingWithRelations>), ApiError> {
    let idempotency_key = idempotency_key(&headers)?;
    let Json(req) = payload
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e.body_text())))?;

    let email = req.email.trim();
    validate_email(email)?;
    let class_instance_id = parse_class_instance_id("classInstanceId", &req.class_instance_id)?;

    let booking = state
        .service
        .book_class(BookClass::new(email, class_instance_id, idempotency_key))
        .await?;

    // Replays answer with the same status as the original booking.
    Ok((StatusCode::CREATED, Json(booking)))
}

fn idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .ok_or_else(|| ApiError::BadRequest("Missing idempotency-key header".to_string()))?;
    let key = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid idempotency-key header".to_string()))?
        .trim();
    if key.is_empty() {
        return Err(ApiError::BadRequest(
            "Empty idempotency-key header".to_string(),
        ));
    }
    Ok(key.to_string())
}

fn parse_class_instance_id(field: &str, raw: &str) -> Result<ClassInstanceId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

/// Accepts `local@domain.tld`: exactly one `@`, a non-empty local part and
/// a domain made of non-empty dot-separated labels.
fn validate_email(email: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::BadRequest(format!("Invalid email: {email}"));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}
