//! Captures the orchestration tool's report file and hands it a unique name.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{DownloadError, ExtractError};

/// File the orchestration tool writes into its project directory.
pub const DEFAULT_REPORT_FILENAME: &str = "report.md";

/// Maximum slug length inside a derived report filename.
pub const MAX_SLUG_LEN: usize = 50;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

/// A report read from disk, with its post-rename name when the rename worked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub original_path: PathBuf,
    pub final_filename: Option<String>,
    pub content: String,
    pub rename_warning: Option<String>,
}

/// Lowercase `topic` and collapse every non-alphanumeric run into `_`.
pub fn slugify_topic(topic: &str) -> String {
    let lowered = topic.to_ascii_lowercase();
    let collapsed = NON_ALNUM.replace_all(&lowered, "_");
    let slug: String = collapsed
        .trim_matches('_')
        .chars()
        .take(MAX_SLUG_LEN)
        .collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "topic".to_string()
    } else {
        slug.to_string()
    }
}

/// `research_<slug>_<YYYYMMDD_HHMMSS>_<8 hex>.md`
pub fn unique_report_filename(topic: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "research_{}_{}_{}.md",
        slugify_topic(topic),
        timestamp,
        &suffix[..8]
    )
}

/// Read `known_filename` from `project_directory`, then move it aside.
///
/// Returns `Ok(None)` when the tool produced no report. A failed rename still
/// yields the content, with `final_filename` unset and a warning attached.
pub fn extract_and_rename_report(
    project_directory: &Path,
    topic: &str,
    known_filename: &str,
) -> Result<Option<ReportArtifact>, ExtractError> {
    let original_path = project_directory.join(known_filename);

    let content = match fs::read_to_string(&original_path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %original_path.display(), "No report file produced");
            return Ok(None);
        }
        Err(source) => {
            warn!(path = %original_path.display(), error = %source, "Failed to read report");
            return Err(ExtractError::Read {
                path: original_path,
                source,
            });
        }
    };

    let final_name = unique_report_filename(topic);
    let final_path = project_directory.join(&final_name);

    let (final_filename, rename_warning) = match fs::rename(&original_path, &final_path) {
        Ok(()) => {
            info!(
                from = %original_path.display(),
                to = %final_path.display(),
                bytes = content.len(),
                "Report renamed"
            );
            (Some(final_name), None)
        }
        Err(err) => {
            warn!(
                from = %original_path.display(),
                to = %final_path.display(),
                error = %err,
                "Failed to rename report"
            );
            (
                None,
                Some(format!("report was read but could not be renamed: {err}")),
            )
        }
    };

    Ok(Some(ReportArtifact {
        original_path,
        final_filename,
        content,
        rename_warning,
    }))
}

/// Reject anything but a bare filename.
pub fn validate_report_filename(filename: &str) -> Result<(), DownloadError> {
    let invalid = filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0');
    if invalid {
        return Err(DownloadError::InvalidFilename(filename.to_string()));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(DownloadError::InvalidFilename(filename.to_string())),
    }
}

/// Resolve `filename` inside `project_directory`, following symlinks.
///
/// The resolved path must remain under the resolved project directory.
pub fn resolve_report_path(
    project_directory: &Path,
    filename: &str,
) -> Result<PathBuf, DownloadError> {
    validate_report_filename(filename)?;

    let root = project_directory.canonicalize().map_err(|err| {
        debug!(dir = %project_directory.display(), error = %err, "Project directory unavailable");
        DownloadError::NotFound(filename.to_string())
    })?;

    let candidate = root.join(filename);
    let resolved = match candidate.canonicalize() {
        Ok(path) => path,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(DownloadError::NotFound(filename.to_string()));
        }
        Err(source) => {
            return Err(DownloadError::Io {
                path: candidate,
                source,
            });
        }
    };

    if !resolved.starts_with(&root) {
        warn!(
            requested = filename,
            resolved = %resolved.display(),
            "Report path escapes project directory"
        );
        return Err(DownloadError::OutsideProject);
    }
    if !resolved.is_file() {
        return Err(DownloadError::NotFound(filename.to_string()));
    }
    Ok(resolved)
}

/// Read a previously extracted report for download.
pub fn read_report(project_directory: &Path, filename: &str) -> Result<Vec<u8>, DownloadError> {
    let path = resolve_report_path(project_directory, filename)?;
    fs::read(&path).map_err(|source| DownloadError::Io { path, source })
}
