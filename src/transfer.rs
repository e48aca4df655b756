//! Transfer responder: stream a finished artifact to the caller.
//!
//! The body is a chunked stream over the file, never a buffer of the whole
//! artifact. hyper only polls for the next chunk once the previous one has
//! been written to the socket, so a slow client slows the disk reads down
//! instead of growing memory.
//!
//! The stream owns the job. It finishes the job (removing the upload and the
//! artifact) as soon as the last announced byte has been read, or as
//! `FailedTransfer` on a read error or a short file. If the client
//! disconnects, hyper drops the stream and the job's `Drop` does the same
//! cleanup.

use crate::error::ConvertError;
use crate::job::{Artifact, ConversionJob, JobState};
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// `attachment; filename="<name>"`, with quotes and backslashes escaped.
pub fn content_disposition(file_name: &str) -> String {
    let escaped: String = file_name
        .chars()
        .filter(|c| !c.is_control())
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            c => vec![c],
        })
        .collect();
    format!("attachment; filename=\"{escaped}\"")
}

/// Build the 200 response for `artifact`.
///
/// Fails with [`ConvertError::Transfer`] (after cleaning up) if the artifact
/// cannot be opened.
pub async fn respond(artifact: Artifact) -> Result<Response, ConvertError> {
    let content_type = artifact.content_type();
    let file_name = artifact.file_name();
    let Artifact { job, path, .. } = artifact;

    let opened = async {
        let file = tokio::fs::File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok::<_, std::io::Error>((file, len))
    }
    .await;

    let (file, len) = match opened {
        Ok(v) => v,
        Err(e) => {
            warn!(job = %job.id(), error = %e, "could not open artifact");
            job.finish(JobState::FailedTransfer).await;
            return Err(ConvertError::Transfer(e));
        }
    };
    debug!(job = %job.id(), bytes = len, %content_type, "streaming artifact");

    let mut response = Response::new(stream_body(file, len, job).await);
    *response.status_mut() = StatusCode::OK;
    let disposition = HeaderValue::from_str(&content_disposition(&file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

struct Streaming<R> {
    reader: ReaderStream<R>,
    job: ConversionJob,
    sent: u64,
    len: u64,
}

/// Body streaming `len` bytes from `reader`, finishing `job` along the way.
///
/// With `Content-Length` set, hyper stops polling once `len` bytes are out,
/// so the job is finished as soon as the last byte has been read rather than
/// on end-of-stream.
pub(crate) async fn stream_body<R>(reader: R, len: u64, job: ConversionJob) -> Body
where
    R: AsyncRead + Send + Unpin + 'static,
{
    if len == 0 {
        drop(reader);
        job.finish(JobState::Responding).await;
        return Body::empty();
    }

    let state = Streaming {
        reader: ReaderStream::new(reader),
        job,
        sent: 0,
        len,
    };
    let body = stream::unfold(Some(state), |state| async move {
        let mut s = state?;
        match s.reader.next().await {
            Some(Ok(chunk)) => {
                s.sent += chunk.len() as u64;
                if s.sent < s.len {
                    return Some((Ok(chunk), Some(s)));
                }
                let Streaming { reader, job, .. } = s;
                drop(reader);
                job.finish(JobState::Responding).await;
                Some((Ok(chunk), None))
            }
            Some(Err(e)) => {
                warn!(job = %s.job.id(), error = %e, "transfer aborted mid-stream");
                let Streaming { reader, job, .. } = s;
                drop(reader);
                job.finish(JobState::FailedTransfer).await;
                Some((Err(e), None))
            }
            None => {
                warn!(job = %s.job.id(), sent = s.sent, expected = s.len, "artifact shorter than announced");
                let Streaming { reader, job, .. } = s;
                drop(reader);
                job.finish(JobState::FailedTransfer).await;
                None
            }
        }
    });
    Body::from_stream(body)
}
