use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static TRAILING_EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.[^.]+$").unwrap());

/// Used when neither the candidate nor the fallback has anything left to offer.
pub const LAST_RESORT_NAME: &str = "image";

/// Normalize arbitrary user or OS text into a safe base name (no extension).
///
/// The trailing extension is stripped, accents are folded away (NFKD, then
/// combining marks dropped), anything other than ASCII letters, digits, `_`,
/// `-` and whitespace is removed, whitespace runs become single hyphens and the
/// result is lowercased.
///
/// When nothing survives, `fallback` is put through the same process. If that
/// is empty too, the fallback is returned with only its extension removed, and
/// if even that is empty the constant [`LAST_RESORT_NAME`].
///
/// ```
/// use recast_library::sanitize;
///
/// assert_eq!(sanitize("My Photo.PNG", "x"), "my-photo");
/// assert_eq!(sanitize("café España", "x"), "cafe-espana");
/// assert_eq!(sanitize("***", "original.png"), "original");
/// ```
pub fn sanitize(candidate: &str, fallback: &str) -> String {
    let cleaned = clean(candidate);
    if !cleaned.is_empty() {
        return cleaned;
    }
    let cleaned = clean(fallback);
    if !cleaned.is_empty() {
        return cleaned;
    }
    let raw = strip_extension(fallback);
    if raw.is_empty() { LAST_RESORT_NAME.to_string() } else { raw.to_string() }
}

/// Remove a trailing `.ext` (the last dot and everything after it).
pub(crate) fn strip_extension(name: &str) -> &str {
    match TRAILING_EXTENSION.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}

fn clean(text: &str) -> String {
    let folded: String = strip_extension(text)
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join("-").to_ascii_lowercase()
}
