//! Destination filename sanitizing
//!
//! Scraped video links carry percent-encoding, a hosting artifact token and
//! release qualifiers like "(Raw)" that should not end up in the library.

use regex::Regex;
use std::sync::LazyLock;

/// Artifact appended to names by one of the scraped hosts
pub const NOISE_TOKEN: &str = "_ImSM8O";

/// Characters that are invalid in file names on at least one supported platform
pub const FORBIDDEN_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

#[allow(clippy::expect_used)]
static QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\((?:raw|partial)\)\s*").expect("qualifier pattern is valid")
});

#[allow(clippy::expect_used)]
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Produce a filesystem-safe file name from a raw (possibly URL-encoded) name.
///
/// The result never contains any of [`FORBIDDEN_CHARS`], and
/// `sanitize(&sanitize(x)) == sanitize(x)` for every input.
///
/// ```
/// use media_dl::sanitize::sanitize;
///
/// assert_eq!(sanitize("Show%20Ep%201%20(Raw).mkv"), "Show Ep 1.mkv");
/// assert_eq!(sanitize("a:b?c.mp4"), "abc.mp4");
/// ```
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    // A changing pass either shortens the name in bytes or leaves it settled
    for _ in 0..raw.len() + 2 {
        let next = sanitize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// One cleanup pass. Decoding can expose new noise (e.g. `%2F`), so [`sanitize`]
/// repeats passes until the name is stable.
fn sanitize_pass(name: &str) -> String {
    let decoded = percent_decode(name);
    let without_noise = decoded.replace(NOISE_TOKEN, "");
    let without_qualifiers = QUALIFIER_RE.replace_all(&without_noise, " ");
    let allowed: String = without_qualifiers
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();
    let collapsed = WHITESPACE_RE.replace_all(&allowed, " ");
    tidy_extension(collapsed.trim())
}

/// Remove a space left in front of the extension by qualifier stripping ("Show .mkv").
fn tidy_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = name.split_at(dot);
            format!("{}{}", stem.trim_end(), ext)
        }
        _ => name.to_string(),
    }
}

fn percent_decode(name: &str) -> String {
    if !name.contains('%') {
        return name.to_string();
    }
    String::from_utf8_lossy(&urlencoding::decode_binary(name.as_bytes())).into_owned()
}

/// Last path segment of a URL, ignoring query string and fragment.
pub fn url_file_name(url: &url::Url) -> Option<&str> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
}
