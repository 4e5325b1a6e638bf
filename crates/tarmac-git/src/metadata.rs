//! Commit metadata stored as git trailers.
//!
//! Landing commits carry the approval metadata (merge URL, reviews,
//! co-authors) as `Key: value` lines in the final paragraph of the
//! message, and issue fixes are read back the same way.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Trailer key for reviewer votes.
pub const REVIEW: &str = "Review";
/// Trailer key for additional authors.
pub const CO_AUTHORED_BY: &str = "Co-authored-by";

#[allow(clippy::expect_used)]
static TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9-]*):\s*(.*?)\s*$").expect("trailer pattern is valid")
});

#[allow(clippy::expect_used)]
static ISSUE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:#|/|id=)(\d+)/?$").expect("issue pattern is valid"));

/// Split `Name <email>` into its parts.
#[must_use]
pub fn parse_identity(identity: &str) -> (String, Option<String>) {
    let identity = identity.trim();
    match (identity.rfind('<'), identity.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = identity[..open].trim().to_string();
            let email = identity[open + 1..close].trim().to_string();
            (name, Some(email))
        }
        _ => (identity.to_string(), None),
    }
}

/// Format a name and email as `Name <email>`.
#[must_use]
pub fn format_identity(name: &str, email: &str) -> String {
    if email.is_empty() {
        name.to_string()
    } else {
        format!("{name} <{email}>")
    }
}

/// Whether `key` can be written as a trailer key.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    TRAILER.is_match(&format!("{key}: x"))
}

/// Append trailers for revision properties, reviews and co-authors.
///
/// If the message already ends in a trailer block, the new trailers join it.
#[must_use]
pub fn compose_message(
    message: &str,
    revprops: &BTreeMap<String, String>,
    reviews: &[String],
    co_authors: &[String],
) -> String {
    let lines: Vec<String> = revprops
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .chain(reviews.iter().map(|review| format!("{REVIEW}: {review}")))
        .chain(
            co_authors
                .iter()
                .map(|author| format!("{CO_AUTHORED_BY}: {author}")),
        )
        .collect();

    let mut composed = message.trim_end().to_string();
    if !lines.is_empty() {
        let separator = if trailers(&composed).is_empty() {
            "\n\n"
        } else {
            "\n"
        };
        if !composed.is_empty() {
            composed.push_str(separator);
        }
        composed.push_str(&lines.join("\n"));
    }
    composed.push('\n');
    composed
}

/// Parse the trailer block (the final paragraph) of a commit message.
///
/// Returns nothing unless every line of the final paragraph is a trailer.
#[must_use]
pub fn trailers(message: &str) -> Vec<(String, String)> {
    let Some(paragraph) = message
        .trim_end()
        .rsplit("\n\n")
        .find(|p| !p.trim().is_empty())
    else {
        return Vec::new();
    };

    // A single-paragraph message is a subject, not a trailer block.
    if message.trim().split("\n\n").count() < 2 {
        return Vec::new();
    }

    let mut found = Vec::new();
    for line in paragraph.lines().filter(|l| !l.trim().is_empty()) {
        let Some(caps) = TRAILER.captures(line.trim()) else {
            return Vec::new();
        };
        found.push((caps[1].to_string(), caps[2].to_string()));
    }
    found
}

/// Values of every trailer named `key` (case-insensitive).
#[must_use]
pub fn trailer_values(message: &str, key: &str) -> Vec<String> {
    trailers(message)
        .into_iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
        .collect()
}

/// References to fixed issues recorded in a commit message.
///
/// Understands `Fixes:`/`Closes:`/`Resolves:` trailers and the older
/// `Bugs: <url> fixed` form, where each URL is followed by its status.
#[must_use]
pub fn fixed_issue_refs(message: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for (key, value) in trailers(message) {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "fixes" | "closes" | "resolves" => {
                refs.extend(
                    value
                        .split([',', ' '])
                        .filter(|part| !part.is_empty())
                        .map(String::from),
                );
            }
            "bugs" => {
                let words: Vec<&str> = value.split_whitespace().collect();
                for pair in words.chunks(2) {
                    if let [url, status] = pair {
                        if status.eq_ignore_ascii_case("fixed") {
                            refs.push((*url).to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    refs
}

/// Issue identifier for a reference: the trailing number of a URL or
/// `#N` reference, otherwise the reference itself.
#[must_use]
pub fn issue_id(reference: &str) -> String {
    ISSUE_ID
        .captures(reference)
        .map_or_else(|| reference.to_string(), |caps| caps[1].to_string())
}
