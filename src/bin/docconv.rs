//! CLI binary for edgequake-docconv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig`, sets up logging and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docconv::{server, FormatMapping, ServiceConfig, UnknownFormatPolicy};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on :3000 with the default libreoffice binary
  docconv

  # Use soffice, keep temp files under /var/tmp
  docconv --converter soffice --upload-dir /var/tmp/dc/uploads --output-dir /var/tmp/dc/converted

  # Flatpak install
  docconv --converter flatpak --converter-arg run --converter-arg org.libreoffice.LibreOffice

  # Map "word" to ODT instead of DOCX and refuse unknown targets
  docconv --map word=odt --reject-unknown-formats

REQUEST:
  curl -F file=@report.docx -F sourceFormat=word -F targetFormat=pdf \
       http://localhost:3000/convert -o report.pdf

DEFAULT FORMAT TABLE:
  targetFormat   token
  ────────────   ─────
  pdf            pdf
  word           docx
  excel          xlsx
  ppt            pptx
  txt            txt
  image          jpg
  (other)        pdf   unless --reject-unknown-formats

ENVIRONMENT VARIABLES:
  RUST_LOG                 tracing filter, overrides --verbose / --quiet
  DOCCONV_BIND             listen address
  DOCCONV_CONVERTER        converter program
  DOCCONV_TIMEOUT          converter deadline in seconds (0 = none)
"#;

/// Convert uploaded documents over HTTP with headless LibreOffice.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Convert uploaded documents over HTTP with headless LibreOffice",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "DOCCONV_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// Directory for uploaded files.
    #[arg(long, env = "DOCCONV_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory the converter writes into.
    #[arg(long, env = "DOCCONV_OUTPUT_DIR", default_value = "converted")]
    output_dir: PathBuf,

    /// Converter program.
    #[arg(long, env = "DOCCONV_CONVERTER", default_value = "libreoffice")]
    converter: String,

    /// Extra argument placed before the conversion flags (repeatable).
    #[arg(long = "converter-arg", allow_hyphen_values = true)]
    converter_args: Vec<String>,

    /// Converter deadline in seconds; 0 disables it.
    #[arg(long, env = "DOCCONV_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Maximum converter processes running at once.
    #[arg(long, env = "DOCCONV_MAX_CONCURRENT", default_value_t = 4)]
    max_concurrent: usize,

    /// Maximum upload size in MiB.
    #[arg(long, env = "DOCCONV_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    /// Add or override a format mapping, e.g. `word=odt` (repeatable).
    #[arg(long = "map", value_name = "TARGET=TOKEN")]
    mappings: Vec<String>,

    /// Token used for unknown target formats.
    #[arg(long, env = "DOCCONV_FALLBACK", default_value = "pdf")]
    fallback: String,

    /// Reject unknown target formats with 400 instead of falling back.
    #[arg(long, env = "DOCCONV_REJECT_UNKNOWN")]
    reject_unknown_formats: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, env = "DOCCONV_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    info!(?config, "configuration loaded");

    // ── Serve ────────────────────────────────────────────────────────────
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "docconv listening");

    axum::serve(listener, server::build(&config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("docconv stopped");
    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut mapping = FormatMapping::default().with_fallback(cli.fallback.clone());
    for raw in &cli.mappings {
        let (target, token) = parse_mapping(raw)?;
        mapping = mapping.with_entry(target, token);
    }
    if cli.reject_unknown_formats {
        mapping = mapping.with_policy(UnknownFormatPolicy::Reject);
    }

    ServiceConfig::builder()
        .bind_address(cli.bind.clone())
        .upload_dir(cli.upload_dir.clone())
        .output_dir(cli.output_dir.clone())
        .converter_program(cli.converter.clone())
        .converter_args(cli.converter_args.clone())
        .conversion_timeout_secs(cli.timeout)
        .max_concurrent_conversions(cli.max_concurrent)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .format_mapping(mapping)
        .build()
        .context("Invalid configuration")
}

/// Parse `--map target=token`.
fn parse_mapping(s: &str) -> Result<(&str, &str)> {
    let (target, token) = s
        .split_once('=')
        .with_context(|| format!("Invalid mapping '{s}': expected TARGET=TOKEN"))?;
    let (target, token) = (target.trim(), token.trim());
    if target.is_empty() || token.is_empty() {
        anyhow::bail!("Invalid mapping '{s}': target and token must be non-empty");
    }
    Ok((target, token))
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mapping_accepts_pairs() {
        assert_eq!(parse_mapping("word=odt").unwrap(), ("word", "odt"));
        assert_eq!(parse_mapping(" csv = csv:Text ").unwrap(), ("csv", "csv:Text"));
    }

    #[test]
    fn parse_mapping_rejects_garbage() {
        assert!(parse_mapping("word").is_err());
        assert!(parse_mapping("=odt").is_err());
        assert!(parse_mapping("word=").is_err());
    }

    #[test]
    fn cli_maps_to_config() {
        let cli = Cli::parse_from([
            "docconv",
            "--converter",
            "soffice",
            "--map",
            "word=odt",
            "--reject-unknown-formats",
            "--timeout",
            "0",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.converter_program, "soffice");
        assert_eq!(config.format_mapping.resolve("word").unwrap(), "odt");
        assert!(config.format_mapping.resolve("hologram").is_err());
        assert_eq!(config.conversion_timeout(), None);
    }
}
