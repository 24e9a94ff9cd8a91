//! API utility functions
//!
//! Pure, stateless helpers for the delivery endpoint.

use crate::storage::TEMP_SUFFIX;

/// Content type for a delivered asset, derived from its extension
pub fn content_type_for(filename: &str) -> mime::Mime {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let known = match extension.as_str() {
        "js" | "mjs" => return mime::APPLICATION_JAVASCRIPT_UTF_8,
        "css" => return mime::TEXT_CSS_UTF_8,
        "json" => return mime::APPLICATION_JSON,
        "pdf" => return mime::APPLICATION_PDF,
        "png" => return mime::IMAGE_PNG,
        "jpg" | "jpeg" => return mime::IMAGE_JPEG,
        "gif" => return mime::IMAGE_GIF,
        "svg" => return mime::IMAGE_SVG,
        "html" | "htm" => return mime::TEXT_HTML_UTF_8,
        "txt" => return mime::TEXT_PLAIN_UTF_8,
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "eot" => "application/vnd.ms-fontobject",
        "ico" => "image/x-icon",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };

    known.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// A delivery name is a single path segment that is not a staging file
pub fn is_servable_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\'])
        && !name.ends_with(TEMP_SUFFIX)
}
