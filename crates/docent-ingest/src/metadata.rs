use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::chunk::Metadata;
use crate::source::FileInput;

/// Provenance fields every handler attaches before adding its own.
///
/// Filesystem errors are not fatal here; the affected fields are omitted.
#[must_use]
pub fn base_metadata(input: &FileInput) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("source".into(), Value::String(input.display_name()));

    if let Some(name) = input.file_name() {
        meta.insert("filename".into(), Value::String(name));
    }
    if let Some(ext) = input.extension() {
        meta.insert("file_extension".into(), Value::String(ext));
    }

    match input {
        FileInput::Path(path) => match std::fs::metadata(path) {
            Ok(stat) => {
                meta.insert("file_size".into(), Value::from(stat.len()));
                if let Ok(created) = stat.created() {
                    meta.insert("created_time".into(), Value::String(rfc3339(created)));
                }
                if let Ok(modified) = stat.modified() {
                    meta.insert("modified_time".into(), Value::String(rfc3339(modified)));
                }
            }
            Err(e) => tracing::debug!("cannot stat {}: {e}", path.display()),
        },
        FileInput::Buffer { data, .. } => {
            meta.insert("file_size".into(), Value::from(data.len()));
        }
    }

    if let Some(mime) = input.guess_mimetype() {
        meta.insert("mimetype".into(), Value::String(mime));
    }
    meta
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Copy `extra` on top of `base`, overwriting duplicate keys.
pub(crate) fn merged(base: &Metadata, extra: impl IntoIterator<Item = (&'static str, Value)>) -> Metadata {
    let mut meta = base.clone();
    for (key, value) in extra {
        meta.insert(key.to_owned(), value);
    }
    meta
}
