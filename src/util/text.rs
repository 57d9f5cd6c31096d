use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Ellipsis appended to truncated titles
const ELLIPSIS: &str = "…";
/// Characters reserved at the end of a truncated title
const ELLIPSIS_RESERVE: usize = 3;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").expect("valid entity regex")
});

/// Removes anything that looks like a markup tag (`<...>`).
///
/// Unterminated `<` sequences are left alone, so plain text such as `a < b`
/// survives. Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }
    TAG_RE.replace_all(s, "")
}

/// Collapses every run of whitespace into a single space and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves XML/HTML character references.
///
/// Handles the five XML builtins, numeric references, and a handful of HTML
/// entities that show up in scraped markup. Each reference is resolved on
/// its own: unknown names, invalid code points and dangling `&` stay literal.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    ENTITY_RE.replace_all(s, |caps: &regex::Captures<'_>| {
        let reference = &caps[1];
        let resolved = match reference.strip_prefix('#') {
            Some(numeric) => resolve_char_ref(numeric),
            None => resolve_html_entity(reference).map(str::to_string),
        };
        resolved.unwrap_or_else(|| caps[0].to_string())
    })
}

fn resolve_char_ref(numeric: &str) -> Option<String> {
    let code = match numeric.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => numeric.parse().ok()?,
    };
    char::from_u32(code).filter(|c| *c != '\0').map(String::from)
}

fn resolve_html_entity(name: &str) -> Option<&'static str> {
    let resolved = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "hellip" => "…",
        "mdash" => "—",
        "ndash" => "–",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        _ => return None,
    };
    Some(resolved)
}

/// Turns a fragment of scraped markup into display text.
///
/// Tags are stripped first so that escaped markup inside the text stays
/// literal, then entities are decoded and whitespace collapsed.
pub fn clean_text(raw: &str) -> String {
    let stripped = strip_tags(raw);
    let decoded = decode_entities(&stripped);
    collapse_whitespace(&decoded)
}

/// Truncates text to at most `cap` characters for use as an item title.
///
/// Counts characters, not bytes or columns. When truncation is needed the
/// result keeps `cap - 3` characters and appends `…`.
///
/// - `cap == 0` returns `Cow::Borrowed("")`
/// - `cap <= 3` returns the first `cap` characters with no ellipsis
/// - text that fits is returned borrowed
///
/// # Examples
///
/// ```
/// use mirrorfeed::util::truncate_title;
///
/// assert_eq!(truncate_title("Short", 10), "Short");
/// assert_eq!(truncate_title("Hello World", 8), "Hello…");
/// ```
pub fn truncate_title(s: &str, cap: usize) -> Cow<'_, str> {
    if cap == 0 {
        return Cow::Borrowed("");
    }

    // Single pass: remember where the kept prefix ends, stop once we know the
    // text overflows.
    let keep = if cap <= ELLIPSIS_RESERVE {
        cap
    } else {
        cap - ELLIPSIS_RESERVE
    };
    let mut keep_end = None;
    for (count, (idx, _)) in s.char_indices().enumerate() {
        if count == keep {
            keep_end = Some(idx);
        }
        if count == cap {
            let cut = keep_end.unwrap_or(idx);
            if cap <= ELLIPSIS_RESERVE {
                return Cow::Owned(s[..cut].to_string());
            }
            return Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS));
        }
    }

    Cow::Borrowed(s)
}

/// Byte offsets of the window `[at - radius, at + radius)`, clamped to `s`
/// and widened onto char boundaries.
pub fn window_bounds(s: &str, at: usize, radius: usize) -> (usize, usize) {
    let mut start = at.min(s.len()).saturating_sub(radius);
    while !s.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = at.saturating_add(radius).min(s.len());
    while !s.is_char_boundary(end) {
        end += 1;
    }
    (start, end)
}
