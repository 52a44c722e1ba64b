//! Rewrites the model key in a backend project's `key=value` env file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::backend::{BackendRegistry, apply_prefix};
use crate::error::ConfigError;

/// Default key selecting the orchestration project's model.
pub const DEFAULT_MODEL_KEY: &str = "MODEL";

/// Outcome of a successful rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// Identifier written to the file.
    pub identifier: String,
    /// Whether an existing key line was replaced (false: appended).
    pub replaced: bool,
    /// Non-fatal condition worth surfacing, such as an unknown backend.
    pub warning: Option<String>,
}

/// Writes the active model identifier into backend env files.
#[derive(Debug, Clone, Copy)]
pub struct ModelEnvWriter<'a> {
    registry: &'a BackendRegistry,
    key: &'a str,
}

impl<'a> ModelEnvWriter<'a> {
    pub fn new(registry: &'a BackendRegistry, key: &'a str) -> Self {
        Self { registry, key }
    }

    /// Set the model key in `file_path`, creating the file when missing.
    pub fn update_model_config(
        &self,
        file_path: &Path,
        model_name: &str,
        backend_name: &str,
    ) -> Result<ConfigUpdate, ConfigError> {
        let (identifier, warning) = match self.registry.resolve(backend_name) {
            Ok(descriptor) => (descriptor.qualify_model(model_name), None),
            Err(err) => {
                warn!(backend = backend_name, model = model_name, "{err}; writing model verbatim");
                (
                    model_name.to_string(),
                    Some(format!("{err}; model identifier used verbatim")),
                )
            }
        };

        let existing = match fs::read_to_string(file_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %file_path.display(), "env file missing, starting empty");
                String::new()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: file_path.to_path_buf(),
                    source,
                });
            }
        };

        let replaced = find_key_line(&existing, self.key).is_some();
        let rewritten = rewrite_env_contents(&existing, self.key, &identifier);
        write_atomically(file_path, &rewritten)?;

        debug!(
            path = %file_path.display(),
            key = self.key,
            identifier = %identifier,
            replaced,
            "env file updated"
        );

        Ok(ConfigUpdate {
            identifier,
            replaced,
            warning,
        })
    }
}

/// Identifier a backend would write for `model_name`, without touching disk.
pub fn effective_identifier(registry: &BackendRegistry, model_name: &str, backend_name: &str) -> String {
    registry
        .resolve(backend_name)
        .map(|descriptor| apply_prefix(&descriptor.model_prefix, model_name))
        .unwrap_or_else(|_| model_name.to_string())
}

/// Replace the first `key=` line (or append one) and normalize the rest.
///
/// Blank lines are dropped, trailing whitespace is trimmed, and every other
/// line is kept in order. Later duplicates of the key are left untouched.
pub fn rewrite_env_contents(existing: &str, key: &str, value: &str) -> String {
    let key_line = format!("{key}={value}");
    let target = find_key_line(existing, key);

    let mut out = String::with_capacity(existing.len() + key_line.len() + 1);
    for (index, line) in existing.lines().enumerate() {
        if Some(index) == target {
            out.push_str(&key_line);
            out.push('\n');
            continue;
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    if target.is_none() {
        out.push_str(&key_line);
        out.push('\n');
    }
    out
}

fn find_key_line(contents: &str, key: &str) -> Option<usize> {
    contents
        .lines()
        .position(|line| is_key_line(line, key))
}

fn is_key_line(line: &str, key: &str) -> bool {
    line.trim_start()
        .strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}
