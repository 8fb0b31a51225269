//! Whole-collection export and import.

use crate::coordinator::DataSyncCoordinator;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use stockwatch_core::BulkKind;
use stockwatch_telemetry::Metrics;
use tracing::{info, warn};

const JSON_MIME: &str = "application/json";

/// A downloaded collection, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A user-selected file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub filename: String,
    /// Declared media type, when the source provides one.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImportFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Only declared JSON files are uploaded.
    pub fn validate(&self) -> SyncResult<()> {
        let is_json_name = Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json_name {
            return Err(SyncError::Validation(format!(
                "{}: only .json files can be imported",
                self.filename
            )));
        }
        if let Some(content_type) = &self.content_type {
            let essence = content_type.split(';').next().unwrap_or_default().trim();
            if !essence.eq_ignore_ascii_case(JSON_MIME) {
                return Err(SyncError::Validation(format!(
                    "{}: content type {content_type} is not {JSON_MIME}",
                    self.filename
                )));
            }
        }
        Ok(())
    }
}

/// Asks the user whether a non-empty collection may be replaced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OverwriteConfirm: Send + Sync {
    async fn confirm_overwrite(&self, kind: BulkKind, existing: usize) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { count: u64 },
    /// The user declined to overwrite; nothing was uploaded.
    Cancelled,
}

/// Moves whole collections between the backend and local files.
pub struct BulkReconciler {
    coordinator: Arc<DataSyncCoordinator>,
}

impl BulkReconciler {
    pub fn new(coordinator: Arc<DataSyncCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Download a collection verbatim.
    pub async fn export(&self, kind: BulkKind) -> SyncResult<ExportedFile> {
        let payload = match self.coordinator.backend().export_collection(kind).await {
            Ok(payload) => payload,
            Err(e) => {
                Metrics::bulk_op(kind.slug(), "export", "error");
                warn!(kind = %kind, error = %e, "Export failed");
                return Err(e.into());
            }
        };

        let filename = payload
            .content_disposition
            .as_deref()
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| kind.default_filename().to_string());

        Metrics::bulk_op(kind.slug(), "export", "ok");
        info!(
            kind = %kind,
            filename = %filename,
            bytes = payload.bytes.len(),
            "Collection exported"
        );
        Ok(ExportedFile {
            filename,
            bytes: payload.bytes,
        })
    }

    /// Replace a collection with the contents of `file`.
    ///
    /// Validation happens before any network call. A non-empty destination
    /// needs the user's confirmation. A successful import refreshes every
    /// read model.
    pub async fn import(
        &self,
        kind: BulkKind,
        file: ImportFile,
        confirm: &dyn OverwriteConfirm,
    ) -> SyncResult<ImportOutcome> {
        if let Err(e) = file.validate() {
            Metrics::bulk_op(kind.slug(), "import", "rejected");
            return Err(e);
        }

        let existing = self.coordinator.collection(kind).await?.len();
        if existing > 0 && !confirm.confirm_overwrite(kind, existing).await {
            Metrics::bulk_op(kind.slug(), "import", "cancelled");
            info!(kind = %kind, existing, "Import cancelled by user");
            return Ok(ImportOutcome::Cancelled);
        }

        let count = match self
            .coordinator
            .backend()
            .import_collection(kind, &file.filename, file.bytes)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                Metrics::bulk_op(kind.slug(), "import", "error");
                warn!(kind = %kind, error = %e, "Import failed");
                return Err(e.into());
            }
        };

        Metrics::bulk_op(kind.slug(), "import", "ok");
        info!(kind = %kind, count, "Collection imported");
        if let Err(e) = self.coordinator.refresh_all().await {
            warn!(error = %e, "Refresh after import failed");
        }
        Ok(ImportOutcome::Imported { count })
    }
}

/// Filename from a `Content-Disposition` header.
///
/// `filename*=` (RFC 5987) wins over `filename=`. Quoted values may contain
/// `;` and backslash escapes. Directory components are stripped so the name
/// is always a bare file name.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for param in split_params(header).into_iter().skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'lang'percent-encoded
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                extended = percent_decode(encoded.trim_matches('"'));
            }
            "filename" => plain = Some(unquote(value)),
            _ => {}
        }
    }
    extended.or(plain).and_then(|name| sanitize_filename(&name))
}

/// Split header parameters on `;` outside quoted strings.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in header.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&header[start..]);
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => None,
        base => Some(base.to_string()),
    }
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
