//! Listing, fetch, and delete handlers for stored objects.

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use serde::Serialize;
use std::fs::Metadata;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::category::Category;
use crate::config::DEFAULT_LOCK_WAIT_TIMEOUT_SECS;
use crate::error::ApiError;
use crate::http::PublicUrls;
use crate::locking::LockManager;
use crate::storage::Storage;

/// One listing entry. The URL points at the API fetch route and is
/// recomputed on every listing, never persisted.
#[derive(Serialize)]
pub(crate) struct StoredObject {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub modified: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct DeleteResponse {
    pub message: String,
}

#[derive(Serialize)]
pub(crate) struct BulkDeleteResponse {
    pub message: String,
    pub removed: u64,
    pub failed: Vec<String>,
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    Category::parse(raw).ok_or_else(|| ApiError::InvalidCategory(raw.to_string()))
}

/// Lists every stored object in one category.
pub async fn list_media(
    Path(raw_category): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(urls): Extension<PublicUrls>,
) -> Result<JsonResponse<Vec<StoredObject>>, ApiError> {
    let category = parse_category(&raw_category)?;
    let objects = storage
        .list(category)
        .await?
        .into_iter()
        .map(|stat| StoredObject {
            url: urls.object_url(category, &stat.name),
            name: stat.name,
            size: stat.size,
            modified: stat.modified,
        })
        .collect::<Vec<_>>();
    info!(category = %category, count = objects.len(), "list objects");
    Ok(JsonResponse(objects))
}

/// Streams one object back with its extension-inferred content type.
/// Supports `If-None-Match` revalidation against a weak ETag.
pub async fn fetch_media(
    Path((raw_category, name)): Path<(String, String)>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let category = parse_category(&raw_category)?;
    let target = storage.object_path(category, &name).await?;
    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| ApiError::Storage(err.to_string()))?;
    let mime = mime_guess::from_path(&name).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Storage("invalid content type".into()))?,
    );
    let etag = etag_from_metadata(&metadata);
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag)
            .map_err(|_| ApiError::Storage("response header build failed".into()))?,
    );
    if let Ok(modified) = metadata.modified() {
        let value = fmt_http_date(modified);
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::Storage("response header build failed".into()))?,
        );
    }

    if if_none_match_hits(&request_headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::Storage("response header build failed".into()))?,
    );
    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::Storage(err.to_string()))?;
    info!(category = %category, name, size = metadata.len(), "fetch object");
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Deletes one object. Irreversible.
pub async fn delete_media(
    Path((raw_category, name)): Path<(String, String)>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(locks): Extension<Arc<LockManager>>,
) -> Result<JsonResponse<DeleteResponse>, ApiError> {
    let category = parse_category(&raw_category)?;
    let _guard = locks
        .lock_object_with_timeout(
            category,
            &name,
            Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
        )
        .await
        .map_err(|_| ApiError::Conflict("object is busy".into()))?;
    storage.delete(category, &name).await?;
    info!(category = %category, name, "delete object");
    Ok(JsonResponse(DeleteResponse {
        message: "File deleted successfully".into(),
    }))
}

/// Removes every object in a category, best effort: one failed removal
/// does not stop the sweep, it is reported back instead.
pub async fn delete_all_media(
    Path(raw_category): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<BulkDeleteResponse>, ApiError> {
    let category = parse_category(&raw_category)?;
    let outcome = storage.delete_all(category).await?;
    if outcome.failed.is_empty() {
        info!(category = %category, removed = outcome.removed, "bulk delete");
    } else {
        warn!(
            category = %category,
            removed = outcome.removed,
            failed = outcome.failed.len(),
            "bulk delete finished with failures"
        );
    }
    Ok(JsonResponse(BulkDeleteResponse {
        message: format!("Deleted {} files", outcome.removed),
        removed: outcome.removed,
        failed: outcome.failed,
    }))
}

/// Weak ETag derived from size and mtime, enough for revalidation.
fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    if let Some(duration) = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{size}\"")
}

fn if_none_match_hits(headers: &HeaderMap, current_etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    value.trim() == "*"
        || value
            .split(',')
            .map(|item| item.trim())
            .any(|item| item == current_etag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use tempfile::tempdir;

    use crate::upload;

    fn make_storage() -> (tempfile::TempDir, Arc<Storage>) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        (temp, Arc::new(Storage::new(root)))
    }

    fn make_urls() -> PublicUrls {
        PublicUrls::new("http://localhost:5005")
    }

    async fn list(storage: Arc<Storage>, category: &str) -> Vec<StoredObject> {
        let JsonResponse(objects) = list_media(
            Path(category.to_string()),
            Extension(storage),
            Extension(make_urls()),
        )
        .await
        .expect("list");
        objects
    }

    #[tokio::test]
    async fn list_unknown_category_is_invalid() {
        let (_temp, storage) = make_storage();
        let result = list_media(
            Path("archives".to_string()),
            Extension(storage),
            Extension(make_urls()),
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidCategory(_))));
    }

    #[tokio::test]
    async fn list_is_empty_before_first_upload() {
        let (_temp, storage) = make_storage();
        assert!(list(storage, "images").await.is_empty());
    }

    #[tokio::test]
    async fn listing_url_is_fetchable_through_the_api() {
        let (_temp, storage) = make_storage();
        storage
            .create(Category::Images, "photo.png", b"bytes")
            .await
            .expect("create");

        let objects = list(storage.clone(), "images").await;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].url, "http://localhost:5005/api/images/photo.png");

        let response = fetch_media(
            Path(("images".to_string(), "photo.png".to_string())),
            HeaderMap::new(),
            Extension(storage),
        )
        .await
        .expect("fetch");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("image/png")
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"bytes");
    }

    #[tokio::test]
    async fn fetch_missing_object_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = fetch_media(
            Path(("images".to_string(), "ghost.png".to_string())),
            HeaderMap::new(),
            Extension(storage),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn fetch_revalidates_with_if_none_match() {
        let (_temp, storage) = make_storage();
        storage
            .create(Category::Images, "photo.png", b"bytes")
            .await
            .expect("create");

        let first = fetch_media(
            Path(("images".to_string(), "photo.png".to_string())),
            HeaderMap::new(),
            Extension(storage.clone()),
        )
        .await
        .expect("fetch");
        let etag = first
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .expect("etag")
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_str(&etag).unwrap());
        let second = fetch_media(
            Path(("images".to_string(), "photo.png".to_string())),
            headers,
            Extension(storage),
        )
        .await
        .expect("fetch");
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn delete_missing_object_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = delete_media(
            Path(("images".to_string(), "ghost.png".to_string())),
            Extension(storage),
            Extension(Arc::new(LockManager::new())),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_all_reports_removed_count() {
        let (_temp, storage) = make_storage();
        for name in ["a.png", "b.png"] {
            storage
                .create(Category::Images, name, b"bytes")
                .await
                .expect("create");
        }

        let JsonResponse(response) =
            delete_all_media(Path("images".to_string()), Extension(storage.clone()))
                .await
                .expect("delete all");
        assert_eq!(response.removed, 2);
        assert_eq!(response.message, "Deleted 2 files");
        assert!(response.failed.is_empty());
        assert!(list(storage, "images").await.is_empty());
    }

    // Full lifecycle: upload, list, duplicate, replace, delete.
    #[tokio::test]
    async fn upload_conflict_replace_delete_round_trip() {
        let (_temp, storage) = make_storage();
        let locks = Arc::new(LockManager::new());

        let upload_once = |payload: &'static [u8]| {
            let storage = storage.clone();
            let locks = locks.clone();
            async move {
                upload::upload_media(
                    Extension(storage),
                    Extension(locks),
                    Extension(make_urls()),
                    axum::Json(serde_json::from_value(serde_json::json!({
                        "type": "images",
                        "name": "photo.png",
                        "base64": BASE64.encode(payload),
                        "mimetype": "image/png",
                    })).expect("request")),
                )
                .await
            }
        };

        upload_once(b"first").await.expect("first upload");
        assert_eq!(list(storage.clone(), "images").await.len(), 1);

        let duplicate = upload_once(b"second").await;
        assert!(matches!(duplicate, Err(ApiError::Conflict(_))));

        // Replace flow: explicit delete, then re-upload.
        delete_media(
            Path(("images".to_string(), "photo.png".to_string())),
            Extension(storage.clone()),
            Extension(locks.clone()),
        )
        .await
        .expect("delete");
        upload_once(b"second").await.expect("re-upload");

        let objects = list(storage.clone(), "images").await;
        assert_eq!(objects.len(), 1);
        let stored = storage
            .category_dir(Category::Images)
            .join("photo.png");
        assert_eq!(std::fs::read(stored).expect("read"), b"second");

        delete_media(
            Path(("images".to_string(), "photo.png".to_string())),
            Extension(storage.clone()),
            Extension(locks),
        )
        .await
        .expect("final delete");
        assert!(list(storage, "images").await.is_empty());
    }
}
