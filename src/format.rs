//! Target-format → converter-token mapping.
//!
//! Callers ask for a *logical* target ("word", "excel") and the converter
//! wants a *token* it understands on its `--convert-to` flag ("docx",
//! "xlsx"). [`FormatMapping`] is that table. It is built once, injected
//! through [`crate::config::ServiceConfig`], and never mutated afterwards.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token produced when a target format is not in the table and the policy
/// is [`UnknownFormatPolicy::Fallback`].
pub const DEFAULT_FALLBACK_TOKEN: &str = "pdf";

/// The token whose artifacts are served as `application/pdf`.
pub const PDF_TOKEN: &str = "pdf";

/// What to do when the requested target format is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnknownFormatPolicy {
    /// Silently convert to the fallback token. (default)
    #[default]
    Fallback,
    /// Reject the request with a validation error.
    Reject,
}

/// Immutable table of logical target format → converter output token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatMapping {
    entries: BTreeMap<String, String>,
    fallback: String,
    policy: UnknownFormatPolicy,
}

impl Default for FormatMapping {
    fn default() -> Self {
        let entries = [
            ("pdf", "pdf"),
            ("word", "docx"),
            ("excel", "xlsx"),
            ("ppt", "pptx"),
            ("txt", "txt"),
            ("image", "jpg"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            entries,
            fallback: DEFAULT_FALLBACK_TOKEN.to_string(),
            policy: UnknownFormatPolicy::default(),
        }
    }
}

impl FormatMapping {
    /// An empty table; every lookup goes through the unknown-format policy.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback: DEFAULT_FALLBACK_TOKEN.to_string(),
            policy: UnknownFormatPolicy::default(),
        }
    }

    /// Add or replace an entry. Target names are stored lower-cased.
    pub fn with_entry(mut self, target: impl AsRef<str>, token: impl Into<String>) -> Self {
        self.entries
            .insert(normalise(target.as_ref()), token.into());
        self
    }

    pub fn with_fallback(mut self, token: impl Into<String>) -> Self {
        self.fallback = token.into();
        self
    }

    pub fn with_policy(mut self, policy: UnknownFormatPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn policy(&self) -> UnknownFormatPolicy {
        self.policy
    }

    /// Direct table lookup, no fallback.
    pub fn get(&self, target: &str) -> Option<&str> {
        self.entries.get(&normalise(target)).map(String::as_str)
    }

    /// Resolve a target format to the converter token.
    ///
    /// Lookup is case-insensitive. Unknown targets resolve to the fallback
    /// token under [`UnknownFormatPolicy::Fallback`] and fail with
    /// [`ConvertError::Validation`] under [`UnknownFormatPolicy::Reject`].
    pub fn resolve(&self, target: &str) -> Result<&str, ConvertError> {
        match self.get(target) {
            Some(token) => Ok(token),
            None => match self.policy {
                UnknownFormatPolicy::Fallback => Ok(&self.fallback),
                UnknownFormatPolicy::Reject => Err(ConvertError::Validation(format!(
                    "Unsupported target format: {}",
                    target.trim()
                ))),
            },
        }
    }

    /// Check the table is usable: no empty tokens, no path separators.
    pub(crate) fn validate(&self) -> Result<(), ConvertError> {
        for token in self.entries.values().chain(std::iter::once(&self.fallback)) {
            if !is_valid_token(token) {
                return Err(ConvertError::InvalidConfig(format!(
                    "invalid converter token {token:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Content type for an artifact produced with `token`.
///
/// Only PDF gets its own type; everything else is served as opaque binary.
/// The match is exact: a `PDF` token is served as binary.
pub fn content_type_for(token: &str) -> &'static str {
    if output_extension(token) == PDF_TOKEN {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

/// File extension the converter gives its artifact for `token`.
///
/// LibreOffice accepts `ext:FilterName` tokens; the file still only gets `ext`.
pub fn output_extension(token: &str) -> &str {
    token.split(':').next().unwrap_or(token)
}

fn normalise(target: &str) -> String {
    target.trim().to_lowercase()
}

/// Tokens end up as a file extension and a converter argument.
fn is_valid_token(token: &str) -> bool {
    let ext = output_extension(token);
    !ext.is_empty()
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && !token.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let m = FormatMapping::default();
        assert_eq!(m.resolve("pdf").unwrap(), "pdf");
        assert_eq!(m.resolve("word").unwrap(), "docx");
        assert_eq!(m.resolve("excel").unwrap(), "xlsx");
        assert_eq!(m.resolve("ppt").unwrap(), "pptx");
        assert_eq!(m.resolve("txt").unwrap(), "txt");
        assert_eq!(m.resolve("image").unwrap(), "jpg");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let m = FormatMapping::default();
        assert_eq!(m.resolve("WORD").unwrap(), "docx");
        assert_eq!(m.resolve("  Excel ").unwrap(), "xlsx");
    }

    #[test]
    fn unknown_target_falls_back() {
        let m = FormatMapping::default();
        assert_eq!(m.resolve("hologram").unwrap(), DEFAULT_FALLBACK_TOKEN);

        let m = m.with_fallback("odt");
        assert_eq!(m.resolve("hologram").unwrap(), "odt");
    }

    #[test]
    fn unknown_target_rejected_under_reject_policy() {
        let m = FormatMapping::default().with_policy(UnknownFormatPolicy::Reject);
        let err = m.resolve("hologram").unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
        assert!(err.to_string().contains("hologram"));
        assert_eq!(m.resolve("word").unwrap(), "docx");
    }

    #[test]
    fn entries_can_be_overridden() {
        let m = FormatMapping::default().with_entry("Word", "odt");
        assert_eq!(m.resolve("word").unwrap(), "odt");
    }

    #[test]
    fn content_type_is_pdf_or_binary() {
        assert_eq!(content_type_for("pdf"), "application/pdf");
        assert_eq!(content_type_for("docx"), "application/octet-stream");
        assert_eq!(content_type_for("jpg"), "application/octet-stream");
    }

    #[test]
    fn validate_rejects_bad_tokens() {
        assert!(FormatMapping::default().validate().is_ok());
        assert!(FormatMapping::default()
            .with_entry("evil", "../x")
            .validate()
            .is_err());
        assert!(FormatMapping::default().with_fallback("").validate().is_err());
        // LibreOffice filter syntax stays allowed.
        assert!(FormatMapping::default()
            .with_entry("csv", "csv:Text - txt - csv (StarCalc)")
            .validate()
            .is_ok());
    }

    #[test]
    fn filter_suffix_is_not_part_of_extension() {
        assert_eq!(output_extension("docx"), "docx");
        assert_eq!(output_extension("pdf:writer_pdf_Export"), "pdf");
        assert_eq!(content_type_for("pdf:writer_pdf_Export"), "application/pdf");
    }

    #[test]
    fn content_type_match_is_exact() {
        assert_eq!(content_type_for("PDF"), "application/octet-stream");
        assert_eq!(content_type_for("Pdf:writer_pdf_Export"), "application/octet-stream");
    }
}
