//! String-encoded boolean flags.

const TRUE_VALUES: [&str; 5] = ["true", "t", "1", "yes", "y"];
const FALSE_VALUES: [&str; 5] = ["false", "f", "0", "no", "n"];

/// Parse a boolean literal, case-insensitively. `None` if `s` is not one.
pub fn parse_bool(s: &str) -> Option<bool> {
    let lower = s.trim().to_ascii_lowercase();
    if TRUE_VALUES.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_VALUES.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}
