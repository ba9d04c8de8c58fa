//! Image URL extraction from upstream response text.
//!
//! Upstream replies are natural-language text with an embedded link in
//! one of several formats. Rules are tried in [`ExtractionRule::ORDER`];
//! the first rule that matches anywhere in the text wins, so explicit
//! markers beat incidental URLs that appear earlier.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// `[点击下载](URL)`: the platform's explicit download link.
const DOWNLOAD_LINK_PATTERN: &str = r"\[点击下载\]\((.*?)\)";

/// `![图片](URL)`: the platform's labelled image markup.
const LABELED_IMAGE_PATTERN: &str = r"!\[图片\]\((.*?)\)";

/// Any markdown image with an http(s) target.
const MARKDOWN_IMAGE_PATTERN: &str = r"!\[.*?\]\((https?://[^\)]+)\)";

/// A bare URL ending in a known image extension.
const IMAGE_URL_PATTERN: &str = r"(?i)(https?://[^\s\)\]]+\.(?:jpg|jpeg|png|gif|webp|bmp))";

/// Any bare http(s) URL.
const ANY_URL_PATTERN: &str = r"(https?://[^\s\)\]]+)";

static DOWNLOAD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DOWNLOAD_LINK_PATTERN).expect("valid regex"));
static LABELED_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LABELED_IMAGE_PATTERN).expect("valid regex"));
static MARKDOWN_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MARKDOWN_IMAGE_PATTERN).expect("valid regex"));
static IMAGE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IMAGE_URL_PATTERN).expect("valid regex"));
static ANY_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ANY_URL_PATTERN).expect("valid regex"));

/// Which pattern family produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRule {
    DownloadLink,
    LabeledImage,
    MarkdownImage,
    ImageUrl,
    AnyUrl,
}

impl ExtractionRule {
    /// Strict priority order.
    pub const ORDER: [ExtractionRule; 5] = [
        ExtractionRule::DownloadLink,
        ExtractionRule::LabeledImage,
        ExtractionRule::MarkdownImage,
        ExtractionRule::ImageUrl,
        ExtractionRule::AnyUrl,
    ];

    fn regex(&self) -> &'static Regex {
        match self {
            Self::DownloadLink => &DOWNLOAD_LINK_RE,
            Self::LabeledImage => &LABELED_IMAGE_RE,
            Self::MarkdownImage => &MARKDOWN_IMAGE_RE,
            Self::ImageUrl => &IMAGE_URL_RE,
            Self::AnyUrl => &ANY_URL_RE,
        }
    }
}

/// A URL found in response text and the rule that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extracted {
    pub url: String,
    pub rule: ExtractionRule,
}

/// Return the first image URL in `text`, trying rules in priority order.
///
/// Empty captures (e.g. `[点击下载]()`) do not count as a match for their
/// rule; lower-priority rules are still tried.
pub fn extract_image_url(text: &str) -> Option<Extracted> {
    ExtractionRule::ORDER.iter().find_map(|rule| {
        rule.regex()
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|url| !url.is_empty())
            .map(|url| Extracted {
                url: url.to_string(),
                rule: *rule,
            })
    })
}
