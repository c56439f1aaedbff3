pub mod convert;
pub mod download_image;
pub mod media_data;

use std::sync::LazyLock;

use axum::extract::rejection::JsonRejection;
use regex::Regex;

use crate::error::InputError;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_\- ]").unwrap());

/// Make `title` safe for a `Content-Disposition` filename.
///
/// Every character outside `[a-zA-Z0-9_- ]` becomes `_`; an empty result
/// falls back to `fallback`.
pub fn sanitize_filename(title: &str, fallback: &str) -> String {
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(title, "_");
    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        fallback.to_string()
    } else {
        sanitized.to_string()
    }
}

pub fn attachment(filename: &str) -> String {
    format!("attachment; filename=\"{filename}\"")
}

/// Bad JSON bodies are input errors like any other.
impl From<JsonRejection> for InputError {
    fn from(rejection: JsonRejection) -> Self {
        InputError::Invalid(rejection.body_text())
    }
}
