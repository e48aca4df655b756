//! # edgequake-docconv
//!
//! Upload a document, convert it with headless LibreOffice, stream it back.
//!
//! ## Why this crate?
//!
//! LibreOffice already converts between nearly every office format, but only
//! as a command-line program that reads and writes files. Putting it behind
//! HTTP means getting the boring parts right: unique temp names so concurrent
//! jobs never collide, a deadline so a hung converter does not hold a request
//! forever, a cap on concurrent converter processes, streamed responses, and
//! cleanup of every temp file on every outcome.
//!
//! ## Lifecycle
//!
//! ```text
//! POST /convert (multipart: file, sourceFormat, targetFormat)
//!  │
//!  ├─ 1. Receive   stream the file part into uploads/<uuid>
//!  ├─ 2. Validate  file present and non-empty, both formats present
//!  ├─ 3. Convert   libreoffice --headless --convert-to <token> --outdir converted/
//!  ├─ 4. Verify    converted/<uuid>.<ext> must exist
//!  ├─ 5. Respond   stream it back with Content-Type / Content-Disposition
//!  └─ 6. Clean     remove upload and artifact, whatever happened above
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docconv::{server, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .converter_program("soffice")
//!         .build()?;
//!     let app = server::build(&config);
//!     let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Target formats
//!
//! | `targetFormat` | LibreOffice token | Response `Content-Type` |
//! |----------------|-------------------|-------------------------|
//! | `pdf`   | `pdf`  | `application/pdf` |
//! | `word`  | `docx` | `application/octet-stream` |
//! | `excel` | `xlsx` | `application/octet-stream` |
//! | `ppt`   | `pptx` | `application/octet-stream` |
//! | `txt`   | `txt`  | `application/octet-stream` |
//! | `image` | `jpg`  | `application/octet-stream` |
//! | anything else | `pdf` (fallback) | `application/pdf` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod format;
pub mod invoker;
pub mod job;
pub mod progress;
pub mod server;
pub mod store;
pub mod transfer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::ConvertError;
pub use format::{FormatMapping, UnknownFormatPolicy};
pub use invoker::{ConverterInvoker, LibreOfficeInvoker};
pub use job::{Artifact, ConversionJob, ConversionRequest, ConversionService, JobState};
pub use progress::{JobObserver, JobObserverRef, NoopObserver};
pub use store::{FileStore, StoredFile};
