//! Todo handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use super::error::ApiError;
use super::models::{TodoCreateRequest, TodoResponse, TodoUpdateRequest};
use super::state::ApiState;

pub async fn list_todos(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let todos = state.todos.list_todos().await?;
    let body: Vec<TodoResponse> = todos.into_iter().map(TodoResponse::from).collect();
    Ok(Json(body))
}

pub async fn create_todo(
    State(state): State<ApiState>,
    payload: Result<Json<TodoCreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_json_rejection)?;

    let todo = state.todos.create_todo(payload.into()).await?;

    Ok((StatusCode::CREATED, Json(TodoResponse::from(todo))))
}

pub async fn update_todo(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TodoUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(ApiError::from_path_rejection)?;
    let Json(payload) = payload.map_err(ApiError::from_json_rejection)?;

    let todo = state.todos.update_todo(id, payload.into()).await?;

    Ok(Json(TodoResponse::from(todo)))
}

pub async fn delete_todo(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(ApiError::from_path_rejection)?;

    state.todos.delete_todo(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
