//! Presentation-markup stripping applied before a document is stored.
//!
//! Uploaded content often arrives as rendered Markdown. Bold markers,
//! heading markers and bullet markers carry no retrieval signal, and runs
//! of blank lines only inflate chunk sizes.

use regex::Regex;
use std::sync::LazyLock;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*").expect("valid regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("valid regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*•][ \t]+").expect("valid regex"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

/// Remove bold, heading and bullet markup and collapse blank-line runs.
///
/// ```rust
/// use docvault_core::clean::clean_content;
///
/// let cleaned = clean_content("# Title\n\n\n\n- **first** point\n* second");
/// assert_eq!(cleaned, "Title\n\nfirst point\nsecond");
/// ```
pub fn clean_content(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    let text = BOLD.replace_all(&normalized, "");
    let text = HEADING.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
