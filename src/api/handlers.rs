use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{ProfileView, RecommendationResult},
    services::messages,
};

use super::AppState;

const DEFAULT_USER_ID: &str = "default_user";

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub result: RecommendationResult,
    /// Plain-text rendering for chat-style clients
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub item_info: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub user_id: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub user_id: String,
    pub message: String,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "service": "soulmate-api" })),
    )
}

/// Runs one recommendation request
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    let top_k = request.top_k.unwrap_or(state.default_top_k);

    tracing::info!(
        request_id = %request_id,
        user_id = %request.user_id,
        top_k,
        "Processing chat request"
    );

    let result = state
        .recommender
        .recommend(&request.user_id, &request.message, top_k)
        .await?;
    let text = messages::render(&result);

    tracing::info!(
        request_id = %request_id,
        outcome = ?result.outcome,
        recommendations = result.recommendations.len(),
        "Chat request completed"
    );

    Ok(Json(ChatResponse { result, text }))
}

/// Records a like or dislike for a recommended item
pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<Json<Value>> {
    let item_id = request
        .item_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("item_id 不能为空".to_string()))?;

    state
        .recommender
        .feedback(&request.user_id, &item_id, request.liked, request.item_info)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "感谢你的反馈！这将帮助我为你提供更好的推荐。"
    })))
}

/// Get a user's profile with recent feedback
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ProfileView>> {
    Ok(Json(state.recommender.profile(&user_id).await?))
}

/// Overwrite the preferences named in the body
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> AppResult<Json<Value>> {
    if fields.is_empty() {
        return Err(AppError::Validation("请求体不能为空".to_string()));
    }

    let preferences = state
        .recommender
        .update_preferences(&user_id, fields)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "偏好已更新",
        "preferences": preferences
    })))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<SummaryResponse>> {
    let summary = state.recommender.summary(&user_id).await?;
    Ok(Json(SummaryResponse { user_id, summary }))
}

pub async fn get_welcome(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<WelcomeResponse>> {
    let message = state.recommender.welcome(&user_id).await?;
    Ok(Json(WelcomeResponse { user_id, message }))
}

/// Append an item to the user's reading history
pub async fn add_reading_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(item): Json<Map<String, Value>>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if item.is_empty() {
        return Err(AppError::Validation("请求体不能为空".to_string()));
    }

    state
        .recommender
        .add_reading_history(&user_id, item)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}
