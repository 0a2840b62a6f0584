//! Multipart body for the album API
//!
//! The API expects a single part named `file` whose filename is the entry
//! name. reqwest generates the boundary and the request `Content-Type`.

use super::ForwardError;
use crate::queue::Entry;
use reqwest::multipart::{Form, Part};

/// Form field the album API reads the upload from
pub const FILE_FIELD: &str = "file";

/// Fallback part type when the extension is unknown
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for a file name, judged by its extension
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Build the upload form for an entry
///
/// With `detect_content_type` the part gets an explicit type from the file
/// extension; otherwise the part carries no `Content-Type`.
pub fn build_form(entry: &Entry, detect_content_type: bool) -> Result<Form, ForwardError> {
    let body = reqwest::Body::from(entry.content.clone());
    let mut part = Part::stream_with_length(body, entry.len() as u64).file_name(entry.name.clone());

    if detect_content_type {
        part = part
            .mime_str(&content_type_for(&entry.name))
            .map_err(|e| ForwardError::ConfigError(e.to_string()))?;
    }

    Ok(Form::new().part(FILE_FIELD, part))
}
