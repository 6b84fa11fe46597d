//! Events service routes

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{CurrentUser, authenticate},
    models::{EventDraft, EventPatch},
    query::filters::{EventFilters, Pagination},
    state::AppState,
};

/// Query string of the public listing
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub tag: Option<String>,
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListParams {
    fn into_parts(self) -> (EventFilters, Pagination) {
        (
            EventFilters {
                search: self.search,
                tag: self.tag,
                location: self.location,
                date: self.date,
            },
            Pagination::new(self.limit, self.offset),
        )
    }
}

/// Query string of the per-user listings
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageParams {
    /// Per-user listings are shorter than the public one
    pub const DEFAULT_LIMIT: u32 = 10;

    fn into_page(self) -> Pagination {
        Pagination::new(Some(self.limit.unwrap_or(Self::DEFAULT_LIMIT)), self.offset)
    }
}

/// Create the router for the events service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/:id/join", post(join_event))
        .route("/events/:id/leave", delete(leave_event))
        .route("/users/me/events/created", get(created_events))
        .route("/users/me/events/joined", get(joined_events))
        .route("/users/me/stats", get(user_stats))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.storage.health_check().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Storage health check failed");
            false
        });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "service": "events-service",
            "storage": state.backend().backend_name(),
        })),
    )
}

/// List events with optional filters
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (filters, page) = params.into_parts();
    let events = state.services.query.list(filters, page).await?;

    Ok(Json(json!({
        "pagination": {
            "limit": page.limit,
            "offset": page.offset,
            "total": events.len(),
        },
        "events": events,
    })))
}

/// Get one event
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: Option<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let requester = user.map(|CurrentUser(principal)| principal.user_id);
    let event = state.services.query.get(id, requester).await?;

    Ok(Json(json!({ "event": event })))
}

/// Create an event
pub async fn create_event(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(draft): Json<EventDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.services.events.create(draft, principal.user_id).await?;
    let event = state
        .services
        .query
        .get(event.id, Some(principal.user_id))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Event created successfully",
            "event": event,
        })),
    ))
}

/// Update an event
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
    Json(patch): Json<EventPatch>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .events
        .update(id, patch, principal.user_id)
        .await?;
    let event = state.services.query.get(id, Some(principal.user_id)).await?;

    Ok(Json(json!({
        "message": "Event updated successfully",
        "event": event,
    })))
}

/// Delete an event
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.services.events.delete(id, principal.user_id).await?;

    Ok(Json(json!({ "message": "Event deleted successfully" })))
}

/// Join an event
pub async fn join_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let attendance = state
        .services
        .attendance
        .join(id, principal.user_id)
        .await?;

    Ok(Json(json!({
        "message": "Successfully joined event",
        "attendance": attendance,
    })))
}

/// Leave an event
pub async fn leave_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .attendance
        .leave(id, principal.user_id)
        .await?;

    Ok(Json(json!({ "message": "Successfully left event" })))
}

/// Events created by the caller
pub async fn created_events(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.into_page();
    let events = state
        .services
        .query
        .created_by(principal.user_id, page)
        .await?;

    Ok(Json(json!({ "events": events })))
}

/// Events the caller attends
pub async fn joined_events(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.into_page();
    let events = state
        .services
        .query
        .joined_by(principal.user_id, page)
        .await?;

    Ok(Json(json!({ "events": events })))
}

/// Activity counters and recent activity of the caller
pub async fn user_stats(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let overview = state.services.query.overview(principal.user_id).await?;

    Ok(Json(json!({
        "user": {
            "id": principal.user_id,
            "name": principal.name,
            "email": principal.email,
        },
        "stats": overview.stats,
        "recentActivity": overview.recent_activity,
    })))
}
