//! Service configuration.
//!
//! Everything a running service needs, directories, converter command,
//! limits and the format table, lives in one [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. The same struct drives the library, the HTTP
//! router and the `docconv` binary, so a test can stand up a fully
//! configured service without touching the environment.

use crate::error::ConvertError;
use crate::format::FormatMapping;
use crate::progress::JobObserverRef;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use edgequake_docconv::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .upload_dir("/var/tmp/docconv/uploads")
///     .output_dir("/var/tmp/docconv/converted")
///     .conversion_timeout_secs(60)
///     .max_concurrent_conversions(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// TCP address the binary binds. Default: `0.0.0.0:3000`.
    pub bind_address: String,

    /// Where uploads are written under unique names. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Where the converter writes its artifacts. Default: `converted`.
    pub output_dir: PathBuf,

    /// Converter executable. Default: `libreoffice`.
    pub converter_program: String,

    /// Arguments placed before the conversion flags, e.g.
    /// `["run", "org.libreoffice.LibreOffice"]` for a flatpak install.
    pub converter_args: Vec<String>,

    /// Deadline for one converter run, in seconds. `0` disables it. Default: 300.
    ///
    /// LibreOffice can hang on malformed input or a stale profile lock;
    /// without a deadline the request and the child process stay alive
    /// forever. On expiry the child is killed.
    pub conversion_timeout_secs: u64,

    /// Maximum converter processes running at once. Default: 4.
    ///
    /// Requests beyond this wait for a permit instead of spawning another
    /// process, so load spikes queue up rather than exhaust memory.
    pub max_concurrent_conversions: usize,

    /// Maximum request body size in bytes. Default: 100 MiB.
    pub max_upload_bytes: usize,

    /// Target format → converter token table.
    pub format_mapping: FormatMapping,

    /// Lifecycle observer. If None, events only go to `tracing`.
    pub observer: Option<JobObserverRef>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("converted"),
            converter_program: "libreoffice".to_string(),
            converter_args: Vec::new(),
            conversion_timeout_secs: 300,
            max_concurrent_conversions: 4,
            max_upload_bytes: 100 * 1024 * 1024,
            format_mapping: FormatMapping::default(),
            observer: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_address", &self.bind_address)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("converter_program", &self.converter_program)
            .field("converter_args", &self.converter_args)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("max_concurrent_conversions", &self.max_concurrent_conversions)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("format_mapping", &self.format_mapping)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn JobObserver>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// The converter deadline, or None when disabled.
    pub fn conversion_timeout(&self) -> Option<Duration> {
        match self.conversion_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_address(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn converter_program(mut self, program: impl Into<String>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn converter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.converter_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn max_concurrent_conversions(mut self, n: usize) -> Self {
        self.config.max_concurrent_conversions = n.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn format_mapping(mut self, mapping: FormatMapping) -> Self {
        self.config.format_mapping = mapping;
        self
    }

    pub fn observer(mut self, observer: JobObserverRef) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let c = &self.config;
        if c.converter_program.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "converter program must not be empty".into(),
            ));
        }
        if c.upload_dir.as_os_str().is_empty() || c.output_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "upload and output directories must be set".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max upload size must be ≥ 1 byte".into(),
            ));
        }
        c.format_mapping.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ServiceConfig::builder().build().unwrap();
        assert_eq!(c.converter_program, "libreoffice");
        assert_eq!(c.upload_dir, PathBuf::from("uploads"));
        assert_eq!(c.output_dir, PathBuf::from("converted"));
        assert_eq!(c.conversion_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let c = ServiceConfig::builder()
            .conversion_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.conversion_timeout(), None);
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let c = ServiceConfig::builder()
            .max_concurrent_conversions(0)
            .build()
            .unwrap();
        assert_eq!(c.max_concurrent_conversions, 1);
    }

    #[test]
    fn empty_program_is_rejected() {
        let err = ServiceConfig::builder()
            .converter_program("  ")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn bad_mapping_is_rejected() {
        let err = ServiceConfig::builder()
            .format_mapping(FormatMapping::default().with_entry("x", ""))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn debug_hides_observer() {
        let c = ServiceConfig::builder()
            .observer(std::sync::Arc::new(crate::progress::NoopObserver))
            .build()
            .unwrap();
        assert!(format!("{c:?}").contains("<dyn JobObserver>"));
    }
}
