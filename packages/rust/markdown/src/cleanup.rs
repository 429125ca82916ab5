//! Post-conversion cleanup for chapter Markdown.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_nbsp(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Non-breaking spaces
// ---------------------------------------------------------------------------

/// EPUB typesetting leans on `&nbsp;` for indentation; flatten it to spaces.
fn strip_nbsp(md: &str) -> String {
    md.replace('\u{a0}', " ")
}

// ---------------------------------------------------------------------------
// Pass 2: Normalize whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into one.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing newline
// ---------------------------------------------------------------------------

/// Ensure the text ends with exactly one newline (empty input stays empty).
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_matches('\n');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_blank_lines_collapses_excess() {
        let input = "Line 1\n\n\n\n\nLine 2";
        assert_eq!(clean_blank_lines(input), "Line 1\n\nLine 2");
    }

    #[test]
    fn clean_blank_lines_keeps_single_gap() {
        let input = "Line 1\n\nLine 2";
        assert_eq!(clean_blank_lines(input), input);
    }

    #[test]
    fn normalize_whitespace_trims_trailing() {
        let input = "Line 1   \nLine 2\t\nLine 3";
        assert_eq!(normalize_whitespace(input), "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn ensure_trailing_newline_normalizes() {
        assert_eq!(ensure_trailing_newline("Content"), "Content\n");
        assert_eq!(ensure_trailing_newline("\n\nContent\n\n\n"), "Content\n");
        assert_eq!(ensure_trailing_newline("\n\n"), "");
    }

    #[test]
    fn full_pipeline_cleans_markdown() {
        let input = "\n# Chapter I\u{a0}\n\n\n\n\nIt was a dark night.   \n\n\n";
        assert_eq!(run_pipeline(input), "# Chapter I\n\nIt was a dark night.\n");
    }
}
