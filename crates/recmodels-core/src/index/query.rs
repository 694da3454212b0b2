//! LIKE pattern helpers for catalog queries.

use regex::Regex;
use std::sync::LazyLock;

/// Characters with a meaning inside a LIKE pattern (plus the escape itself).
static LIKE_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\\%_]").expect("static regex"));

/// Escape a literal for use in `LIKE ? ESCAPE '\'`.
pub fn escape_like(literal: &str) -> String {
    LIKE_SPECIAL_CHARS
        .replace_all(literal, r"\$0")
        .into_owned()
}

/// Pattern matching every `groupId:artifactId:<version>` coordinate.
pub fn coordinate_prefix_pattern(group_id: &str, artifact_id: &str) -> String {
    format!("{}%", escape_like(&coordinate_prefix(group_id, artifact_id)))
}

pub fn coordinate_prefix(group_id: &str, artifact_id: &str) -> String {
    format!("{}:{}:", group_id, artifact_id)
}
