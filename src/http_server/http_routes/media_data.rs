use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;

use crate::error::InputError;
use crate::http_server::{error::ApiError, state::AppState};
use crate::services::resolver::MediaInfo;

#[derive(Debug, Deserialize)]
pub struct MediaDataRequest {
    #[serde(default)]
    pub url: String,
}

#[axum::debug_handler]
pub async fn get_media_data(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<MediaDataRequest>, JsonRejection>,
) -> Result<Json<MediaInfo>, ApiError> {
    let Json(request) = payload.map_err(InputError::from)?;
    tracing::info!("Fetching media data for {}", request.url);

    let info = app_state.resolver.media_info(&request.url).await?;
    Ok(Json(info))
}
