//! Upload handler: field validation, duplicate detection, staged write.

use axum::extract::{Extension, Json};
use axum::response::Json as JsonResponse;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::category::Category;
use crate::config::DEFAULT_LOCK_WAIT_TIMEOUT_SECS;
use crate::error::ApiError;
use crate::http::PublicUrls;
use crate::locking::LockManager;
use crate::storage::Storage;

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct UploadRequest {
    #[serde(rename = "type")]
    category: String,
    name: String,
    base64: String,
    mimetype: String,
}

#[derive(Serialize)]
pub(crate) struct UploadResponse {
    pub message: String,
    pub url: String,
}

/// Accepts one fully-buffered upload and installs it as a new object.
///
/// Validation order is fixed: presence, category, content type, then the
/// duplicate check under the object lock. Existing objects are never
/// overwritten here; replacement goes through an explicit delete first.
pub async fn upload_media(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(locks): Extension<Arc<LockManager>>,
    Extension(urls): Extension<PublicUrls>,
    Json(payload): Json<UploadRequest>,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    if payload.category.trim().is_empty() {
        return Err(ApiError::MissingField("type"));
    }
    if payload.name.trim().is_empty() {
        return Err(ApiError::MissingField("name"));
    }
    if payload.base64.trim().is_empty() {
        return Err(ApiError::MissingField("base64"));
    }
    if payload.mimetype.trim().is_empty() {
        return Err(ApiError::MissingField("mimetype"));
    }

    let category = Category::parse(&payload.category)
        .ok_or_else(|| ApiError::InvalidCategory(payload.category.clone()))?;
    if !category.allows(&payload.mimetype) {
        return Err(ApiError::InvalidContentType(format!(
            "Invalid mimetype {} for type {}",
            payload.mimetype, category
        )));
    }

    let name = Storage::sanitize_file_name(payload.name.trim());
    let bytes = BASE64
        .decode(payload.base64.trim().as_bytes())
        .map_err(|_| ApiError::BadRequest("invalid base64 payload".into()))?;

    let _guard = locks
        .lock_object_with_timeout(
            category,
            &name,
            Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
        )
        .await
        .map_err(|_| ApiError::Conflict("object is busy".into()))?;
    storage.create(category, &name, &bytes).await?;

    info!(category = %category, name, size = bytes.len(), "upload stored");
    Ok(JsonResponse(UploadResponse {
        message: "File uploaded successfully".into(),
        url: urls.object_url(category, &name),
    }))
}
