//! HTTP surface: `POST /convert`.
//!
//! The handler is three steps: receive the multipart upload into the file
//! store, run the job, stream the artifact. Every error is a
//! [`ConvertError`], which renders itself as `{"error": "..."}` with the
//! right status.
//!
//! Multipart form:
//!
//! | Field          | Kind | Notes |
//! |----------------|------|-------|
//! | `file`         | file | exactly one; streamed to disk |
//! | `sourceFormat` | text | required, informational |
//! | `targetFormat` | text | required, resolved via the format table |
//!
//! Other text fields are ignored.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::job::{ConversionRequest, ConversionService, NO_FILE_MESSAGE};
use crate::store::FileStore;
use crate::transfer;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub const FILE_FIELD: &str = "file";
pub const SOURCE_FORMAT_FIELD: &str = "sourceFormat";
pub const TARGET_FORMAT_FIELD: &str = "targetFormat";

/// Build the router for a service using the LibreOffice invoker from `config`.
pub fn build(config: &ServiceConfig) -> Router {
    router(ConversionService::from_config(config))
}

/// Room for multipart boundaries, part headers and the format fields on top
/// of the file itself. The exact file cap is enforced while storing.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the router around an existing service.
pub fn router(service: ConversionService) -> Router {
    let limit = service
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route("/convert", post(convert))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// `POST /convert`
async fn convert(
    State(service): State<ConversionService>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    let multipart = multipart.map_err(|e| {
        debug!(error = %e, "request is not multipart");
        ConvertError::Validation(NO_FILE_MESSAGE.into())
    })?;

    let request = receive_upload(service.store(), multipart, service.max_upload_bytes()).await?;
    let artifact = service.run(request).await?;
    transfer::respond(artifact).await
}

/// Read every multipart field, streaming the file part into the store.
///
/// If reading fails after the file was stored, the stored file is removed
/// before the error is returned.
async fn receive_upload(
    store: &FileStore,
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<ConversionRequest, ConvertError> {
    let mut request = ConversionRequest::default();
    if let Err(e) = read_fields(store, &mut multipart, &mut request, max_bytes).await {
        if let Some(upload) = request.upload.take() {
            store.remove(upload.path()).await;
        }
        return Err(e);
    }
    Ok(request)
}

async fn read_fields(
    store: &FileStore,
    multipart: &mut Multipart,
    request: &mut ConversionRequest,
    max_bytes: usize,
) -> Result<(), ConvertError> {
    let bad_multipart =
        |e: axum::extract::multipart::MultipartError| ConvertError::Validation(format!("Failed to read multipart field: {e}"));

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                if request.upload.is_some() {
                    return Err(ConvertError::Validation(
                        "Only one file may be uploaded".into(),
                    ));
                }
                debug!(
                    file_name = field.file_name().unwrap_or("upload"),
                    content_type = field.content_type().unwrap_or("application/octet-stream"),
                    "receiving upload"
                );
                request.upload = Some(store.store_stream(field, Some(max_bytes)).await?);
            }
            SOURCE_FORMAT_FIELD => {
                request.source_format = Some(field.text().await.map_err(bad_multipart)?);
            }
            TARGET_FORMAT_FIELD => {
                request.target_format = Some(field.text().await.map_err(bad_multipart)?);
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }
    Ok(())
}
