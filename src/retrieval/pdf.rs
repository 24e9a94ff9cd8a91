//! Minimal PDF sanity check used to reject error pages served as PDFs

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_TRAILER: &[u8] = b"%%EOF";
const TRAILER_WINDOW: usize = 8;

/// Strip a leading UTF-8 byte-order mark
pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

/// True if `data` starts with `%PDF-` and its last eight bytes contain
/// `%%EOF` in order (other bytes such as trailing whitespace may sit in
/// between).
pub fn is_pdf(data: &[u8]) -> bool {
    let data = strip_bom(data);
    if !data.starts_with(PDF_MAGIC) {
        return false;
    }

    let tail = &data[data.len().saturating_sub(TRAILER_WINDOW)..];
    contains_in_order(tail, PDF_TRAILER)
}

fn contains_in_order(haystack: &[u8], needle: &[u8]) -> bool {
    let mut remaining = needle.iter().peekable();
    for byte in haystack {
        if remaining.peek() == Some(&byte) {
            remaining.next();
        }
    }
    remaining.peek().is_none()
}
