//! Identifier generation: slugs, disambiguation, and sortable timestamps.

use chrono::{SecondsFormat, Utc};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use uuid::Uuid;

/// Normalize a human-readable name into an identifier: NFKD-decompose,
/// drop combining marks, lowercase, collapse runs of non-alphanumerics
/// into single hyphens, and trim hyphens at the ends.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for c in s.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Disambiguate a slug against a set of taken ids by appending `-2`,
/// `-3`, ... until unused. An empty base becomes `entry`.
pub fn unique_slug<'a, I>(base: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let base = if base.is_empty() { "entry" } else { base };
    let taken: std::collections::HashSet<&str> = taken.into_iter().collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

/// Current UTC time as a filename-safe, lexicographically sortable
/// string (RFC 3339 with `:` and `.` replaced by `-`).
pub fn iso_safe_now() -> String {
    iso_safe(&Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Make an RFC 3339 timestamp filename-safe.
pub fn iso_safe(ts: &str) -> String {
    ts.replace([':', '.'], "-")
}

/// Sortable snapshot identifier: microsecond-precision safe timestamp
/// plus a short random nonce so near-simultaneous snapshots stay
/// distinct and ordered.
pub fn version_id_now() -> String {
    let ts = iso_safe(&Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}-{}", ts, &nonce[..6])
}
