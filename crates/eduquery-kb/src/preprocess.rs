//! Cleanup applied to text pulled out of office documents and PDFs.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(https?://\S+|www\.\S+)").unwrap());

static LINE_HYPHEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\n\s*").unwrap());

static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new("[•\u{f071}◉]").unwrap());

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());

/// Normalize extracted text before chunking.
///
/// Steps, in order: drop markup tags and URLs, join words hyphenated across
/// a line break, turn bullet glyphs into `- `, cap blank lines at one,
/// squeeze repeated spaces, spell em-dashes as ` - `, trim.
pub fn preprocess(text: &str) -> String {
    let text = HTML_TAG.replace_all(text, "");
    let text = URL.replace_all(&text, "");
    let text = LINE_HYPHEN.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "- ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = SPACES.replace_all(&text, " ");
    text.replace('\u{2014}', " - ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_urls() {
        assert_eq!(
            preprocess("<b>Limits</b> are covered at https://example.org/limits today"),
            "Limits are covered at today"
        );
        assert_eq!(preprocess("see www.example.org"), "see");
    }

    #[test]
    fn test_joins_hyphenated_words() {
        assert_eq!(preprocess("differen-\n   tiation"), "differentiation");
    }

    #[test]
    fn test_bullets_and_whitespace() {
        let text = "Topics:\n\n\n\n• limits\n◉ series    and   sums";
        assert_eq!(preprocess(text), "Topics:\n\n- limits\n- series and sums");
    }

    #[test]
    fn test_em_dash() {
        assert_eq!(preprocess("rate\u{2014}of change"), "rate - of change");
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(preprocess("  \n\n "), "");
    }
}
