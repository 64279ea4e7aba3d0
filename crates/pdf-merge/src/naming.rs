/// Name used when a caller does not supply a usable output name
pub const DEFAULT_OUTPUT_NAME: &str = "merged.pdf";

/// Reduce a client-supplied file name to something safe to store and to put in a
/// `Content-Disposition` header. Always ends in `.pdf`.
pub fn sanitize_output_name(name: &str) -> String {
    // Drop any directory components, whichever separator the client used
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut cleaned = String::with_capacity(base.len());
    for ch in base.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
            cleaned.push(ch);
        } else if !cleaned.ends_with('_') {
            cleaned.push('_');
        }
    }

    let stem = strip_pdf_extension(&cleaned).trim_matches(['.', '_']);

    if stem.is_empty() {
        DEFAULT_OUTPUT_NAME.to_string()
    } else {
        format!("{stem}.pdf")
    }
}

/// `cleaned` is ASCII, so the split point is always a char boundary
fn strip_pdf_extension(cleaned: &str) -> &str {
    match cleaned.len().checked_sub(4) {
        Some(split) if cleaned[split..].eq_ignore_ascii_case(".pdf") => &cleaned[..split],
        _ => cleaned,
    }
}
