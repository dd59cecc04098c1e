//! Milepost parsing and identifier normalization.
//!
//! Mileposts arrive as `"major+minor"` strings (e.g. `"663+0.0150"` meaning
//! milepost 663.015). Malformed values are a per-record condition, not an
//! error: callers treat `None` as "unmatched".

/// Parse a `"major+minor"` milepost string into a float.
///
/// Leading zeros in the major part are stripped; an empty major part counts
/// as zero. Returns `None` for anything that does not fit the format.
///
/// # Example
/// ```
/// use roadmatch::milepost::parse_milepost;
/// assert_eq!(parse_milepost("663+0.0150"), Some(663.015));
/// assert_eq!(parse_milepost("000+0.0000"), Some(0.0));
/// assert_eq!(parse_milepost("garbage"), None);
/// ```
pub fn parse_milepost(text: &str) -> Option<f64> {
    let (major, minor) = text.trim().split_once('+')?;

    let major = major.trim_start_matches('0');
    let major: f64 = if major.is_empty() {
        0.0
    } else {
        major.parse().ok()?
    };
    let minor: f64 = minor.parse().ok()?;

    Some(major + minor)
}

/// Normalize a corridor or department id: trim and upper-case.
pub fn normalize_id(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Strip trailing ASCII letters from a departmental route id.
///
/// Route variants carry a letter suffix that the signed-route lookup does
/// not: `"N-1A"` maps through `"N-1"`.
pub fn strip_route_suffix(s: &str) -> String {
    s.trim()
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .to_string()
}
