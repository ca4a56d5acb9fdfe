/// Parse an amount written with Chilean conventions, e.g. `"$1.234,56"`.
///
/// The currency sign is dropped, `.` is read as a thousands separator and the
/// first `,` as the decimal separator. Only the leading numeric part is read,
/// so trailing units such as `"/kWh"` are ignored. Returns `None` when no
/// digits lead the cleaned text.
pub fn parse_locale_amount(raw: &str) -> Option<f64> {
    let cleaned = raw.replace('$', "").replace('.', "").replacen(',', ".", 1);
    let cleaned = cleaned.trim();

    let mut end = 0;
    let mut seen_point = false;
    for (idx, ch) in cleaned.char_indices() {
        match ch {
            '0'..='9' => end = idx + 1,
            '.' if !seen_point => seen_point = true,
            _ => break,
        }
    }

    if end == 0 {
        return None;
    }
    cleaned[..end].parse().ok()
}
