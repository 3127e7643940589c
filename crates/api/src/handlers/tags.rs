//! Tag handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use invoiceflow_common::{
    auth::AuthContext,
    db::{models::Tag, NewTag, TagUpdate, TagUsage},
    errors::Result,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,

    /// CSS colour, defaults to `#3B82F6`
    #[validate(length(min = 4, max = 32))]
    pub colors: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTagRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[validate(length(max = 500))]
    pub description: Option<String>,

    #[validate(length(min = 4, max = 32))]
    pub colors: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub colors: String,
    pub created_at: String,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            description: tag.description,
            colors: tag.colors,
            created_at: tag.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUsageResponse {
    #[serde(flatten)]
    pub tag: TagResponse,
    pub usage_count: u64,
}

impl From<TagUsage> for TagUsageResponse {
    fn from(usage: TagUsage) -> Self {
        Self {
            tag: usage.tag.into(),
            usage_count: usage.usage_count,
        }
    }
}

pub async fn create_tag(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<TagResponse>)> {
    request.validate()?;

    let tag = state
        .service
        .create_tag(NewTag {
            user_id: auth.user_id,
            name: request.name,
            description: request.description,
            colors: request.colors,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(tag.into())))
}

pub async fn list_tags(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<TagResponse>>> {
    let tags = state.service.list_tags(auth.user_id).await?;
    Ok(Json(tags.into_iter().map(Into::into).collect()))
}

pub async fn get_tag(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<TagResponse>> {
    let tag = state.service.find_tag(id, auth.user_id).await?;
    Ok(Json(tag.into()))
}

pub async fn update_tag(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(request): Json<UpdateTagRequest>,
) -> Result<Json<TagResponse>> {
    request.validate()?;

    let update = TagUpdate {
        name: request.name,
        description: request.description,
        colors: request.colors,
    };
    let tag = state.service.update_tag(id, auth.user_id, update).await?;
    Ok(Json(tag.into()))
}

/// Tags with `usageCount`, the number of invoices carrying each
pub async fn tag_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<TagUsageResponse>>> {
    let usage = state.service.tags_with_usage(auth.user_id).await?;
    Ok(Json(usage.into_iter().map(Into::into).collect()))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    state.service.delete_tag(id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
