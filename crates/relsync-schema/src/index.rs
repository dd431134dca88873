//! Plain-text release index codec.
//!
//! One entry per line, `sha1 filename size`, newline-terminated. The filename
//! field may carry an absolute HTTP(S) URL for entries served from another
//! origin, and a trailing `# NN%` comment marks a staged rollout.

use std::sync::LazyLock;

use regex::Regex;

use crate::entry::ReleaseEntry;
use crate::error::FormatError;
use crate::hash::Sha1Hash;

static ENTRY_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]{40})\s+(\S+)\s+(\d+)$"));

static STAGING_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"#\s+(\d{1,3})%$"));

const INVALID_FILENAME_CHARS: &[char] = &['"', '/', '\\', '<', '>', '|', '\0', ':', '*', '?'];

/// Parse the contents of a release index.
///
/// Blank lines and `#` comment lines are skipped. Any other line that does
/// not parse fails the whole call; partial results are never returned.
///
/// # Errors
///
/// Returns the first [`FormatError`] encountered.
///
/// # Example
///
/// ```
/// use relsync_schema::index;
///
/// let text = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed MyApp-1.0.0-full.nupkg 1024\n";
/// let entries = index::parse(text).unwrap();
/// assert_eq!(entries.len(), 1);
/// assert_eq!(index::serialize(&entries), text);
/// ```
pub fn parse(text: &str) -> Result<Vec<ReleaseEntry>, FormatError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let entry_re = ENTRY_RE.as_ref().map_err(|e| pattern_error(&e))?;
    let staging_re = STAGING_RE.as_ref().map_err(|e| pattern_error(&e))?;

    let mut entries = Vec::new();
    for (idx, raw) in text.split('\n').enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        let staging = match staging_re.captures(line) {
            Some(caps) => {
                let pct: u8 = caps[1].parse().map_err(|_| malformed(line_no, line))?;
                if pct > 100 {
                    return Err(malformed(line_no, line));
                }
                Some(pct)
            }
            None => None,
        };

        let body = line.split_once('#').map_or(line, |(body, _)| body).trim();
        if body.is_empty() {
            continue;
        }

        let caps = entry_re
            .captures(body)
            .ok_or_else(|| malformed(line_no, line))?;

        let hash = Sha1Hash::new(&caps[1]).map_err(|_| malformed(line_no, line))?;
        let size: u64 = caps[3]
            .parse()
            .map_err(|_| FormatError::InvalidSize(caps[3].to_string()))?;
        let (base_url, filename, query) = split_location(&caps[2])?;

        let entry = ReleaseEntry::new(filename, hash, size)?
            .with_origin(base_url, query)
            .with_staging_percentage(staging);
        entries.push(entry);
    }

    Ok(entries)
}

/// Parse raw index bytes, rejecting invalid UTF-8.
///
/// # Errors
///
/// Returns [`FormatError::NotUtf8`] or any error from [`parse`].
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<ReleaseEntry>, FormatError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FormatError::NotUtf8)?;
    parse(text)
}

/// Serialize entries in the order given, one newline-terminated line each.
pub fn serialize(entries: &[ReleaseEntry]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for entry in entries {
        let _ = write!(
            out,
            "{} {} {}",
            entry.content_hash(),
            entry.location(),
            entry.size_bytes()
        );
        if let Some(pct) = entry.staging_percentage() {
            let _ = write!(out, " # {pct}%");
        }
        out.push('\n');
    }
    out
}

/// Split the filename field into `(base_url, filename, query)`.
fn split_location(
    location: &str,
) -> Result<(Option<String>, String, Option<String>), FormatError> {
    let lower = location.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        if location.contains(INVALID_FILENAME_CHARS) {
            return Err(FormatError::PathLikeFilename(location.to_string()));
        }
        return Ok((None, location.to_string(), None));
    }

    let (without_query, query) = match location.split_once('?') {
        Some((head, q)) => (head, Some(format!("?{q}"))),
        None => (location, None),
    };

    let scheme_end = without_query.find("://").map_or(0, |i| i + 3);
    let path_start = without_query[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i)
        .ok_or_else(|| FormatError::InvalidUrl(location.to_string()))?;
    if path_start == scheme_end {
        return Err(FormatError::InvalidUrl(location.to_string()));
    }

    let last_slash = without_query.rfind('/').unwrap_or(path_start);
    let filename = &without_query[last_slash + 1..];
    if filename.is_empty() {
        return Err(FormatError::InvalidUrl(location.to_string()));
    }
    if filename.contains(INVALID_FILENAME_CHARS) {
        return Err(FormatError::PathLikeFilename(location.to_string()));
    }

    Ok((
        Some(without_query[..=last_slash].to_string()),
        filename.to_string(),
        query,
    ))
}

fn malformed(line: usize, text: &str) -> FormatError {
    FormatError::MalformedLine {
        line,
        text: text.to_string(),
    }
}

fn pattern_error(e: &regex::Error) -> FormatError {
    FormatError::MalformedLine {
        line: 0,
        text: format!("internal pattern error: {e}"),
    }
}
