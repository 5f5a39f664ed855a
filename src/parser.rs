use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use url::Url;

use crate::config::LimitsConfig;
use crate::page::Page;
use crate::patterns::{
    matches_any, matches_exact, FOLLOW_BUTTON_TEXTS, GROUP_SUGGESTIONS_TEXTS,
    PEOPLE_YOU_MAY_KNOW_TEXTS, SPONSORED_TEXTS, SUGGESTED_FOR_YOU_TEXTS,
};

const AUTHOR_SELECTORS: &[&str] = &[
    r#"[data-ad-rendering-role="profile_name"] span"#,
    "h4 a span",
    "h3 a span",
    "strong a",
    r#"a[role="link"] span strong"#,
    "h2 span a strong span",
    "span a strong span",
];

const CONTENT_SELECTORS: &[&str] = &[
    r#"[data-ad-rendering-role="story_message"]"#,
    r#"[data-ad-comet-preview="message"]"#,
    r#"div[dir="auto"]"#,
    r#"span[dir="auto"]"#,
];

const MIN_CONTENT_CHARS: usize = 20;

static AUTHOR: Lazy<Vec<Selector>> = Lazy::new(|| compile(AUTHOR_SELECTORS));
static CONTENT: Lazy<Vec<Selector>> = Lazy::new(|| compile(CONTENT_SELECTORS));
static PERMALINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="?__cft__"], a[href*="/posts/"], a[href*="/permalink/"]"#)
        .expect("valid permalink selector")
});
static IMAGES: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"img[src*="fbcdn"], img[alt]"#).expect("valid image selector")
});
static REACTIONS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[aria-label*="reaction"], [aria-label*="like"]"#)
        .expect("valid reaction selector")
});
static HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect("valid h3 selector"));
static SPANS: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("valid span selector"));
static BOLD: Lazy<Selector> = Lazy::new(|| Selector::parse("b").expect("valid b selector"));

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("valid number regex"));
static COMMENTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+)\s*(comment|bình luận|commentaire|kommentar|comentario|comentário|コメント|댓글|条评论|則留言|komentar|ความคิดเห็น)",
    )
    .expect("valid comments regex")
});
static SHARES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+)\s*(share|chia sẻ|partage|geteilt|compartido|compartilhamento|シェア|공유|次分享|bagikan|การแชร์)",
    )
    .expect("valid shares regex")
});

fn compile(patterns: &[&str]) -> Vec<Selector> {
    patterns
        .iter()
        .map(|css| Selector::parse(css).expect("valid post selector"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Following,
    Suggested,
    Sponsored,
    Reels,
    PeopleSuggestion,
    GroupSuggestion,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Following => "following",
            SourceCategory::Suggested => "suggested",
            SourceCategory::Sponsored => "sponsored",
            SourceCategory::Reels => "reels",
            SourceCategory::PeopleSuggestion => "people_suggestion",
            SourceCategory::GroupSuggestion => "group_suggestion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reactions {
    pub total: String,
    pub like: String,
    pub love: String,
}

impl Default for Reactions {
    fn default() -> Self {
        Self {
            total: "0".into(),
            like: "0".into(),
            love: "0".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPost {
    pub author: Option<String>,
    pub content: Option<String>,
    pub permalink: Option<Url>,
    pub images: Vec<Url>,
    pub reactions: Reactions,
    pub comments: String,
    pub shares: String,
    pub source: SourceCategory,
}

impl ParsedPost {
    pub fn is_unparsed(&self) -> bool {
        self.author.is_none() && self.content.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct PostParser {
    content_max_chars: usize,
    max_images: usize,
}

impl Default for PostParser {
    fn default() -> Self {
        Self::new(&LimitsConfig::default())
    }
}

impl PostParser {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            content_max_chars: limits.content_max_chars,
            max_images: limits.max_images,
        }
    }

    /// Snapshot of a post element. A node that is gone yields an empty,
    /// `following` post rather than an error.
    pub fn parse_post(&self, page: &Page, id: NodeId) -> ParsedPost {
        let Some(element) = page.element(id) else {
            return ParsedPost {
                author: None,
                content: None,
                permalink: None,
                images: Vec::new(),
                reactions: Reactions::default(),
                comments: "0".into(),
                shares: "0".into(),
                source: SourceCategory::Following,
            };
        };
        let base = page.base_url();

        let author = AUTHOR
            .iter()
            .filter_map(|selector| element.select(selector).next())
            .map(|el| trimmed_text(&el))
            .find(|text| !text.is_empty());

        let content = CONTENT
            .iter()
            .filter_map(|selector| element.select(selector).next())
            .map(|el| trimmed_text(&el))
            .find(|text| text.chars().count() > MIN_CONTENT_CHARS)
            .map(|text| text.chars().take(self.content_max_chars).collect());

        let permalink = element
            .select(&PERMALINK)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve(base, href));

        let images = element
            .select(&IMAGES)
            .filter_map(|el| el.value().attr("src"))
            .filter(|src| !src.is_empty() && !src.contains("emoji") && !src.contains("static"))
            .filter_map(|src| resolve(base, src))
            .take(self.max_images)
            .collect();

        let total = element
            .select(&REACTIONS)
            .filter_map(|el| el.value().attr("aria-label"))
            .find_map(|label| NUMBER_RE.captures(label).map(|caps| caps[1].to_string()))
            .unwrap_or_else(|| "0".into());

        let text = element.text().collect::<String>();
        let comments = count_before_unit(&COMMENTS_RE, &text);
        let shares = count_before_unit(&SHARES_RE, &text);

        ParsedPost {
            author,
            content,
            permalink,
            images,
            reactions: Reactions {
                total,
                ..Reactions::default()
            },
            comments,
            shares,
            source: detect_post_source(element),
        }
    }
}

/// First matching step wins: reels, sponsored, people, groups, suggested,
/// follow button, otherwise following.
pub fn detect_post_source(element: ElementRef<'_>) -> SourceCategory {
    let is_reels = element
        .select(&HEADINGS)
        .any(|heading| trimmed_text(&heading).to_lowercase() == "reels");
    if is_reels {
        return SourceCategory::Reels;
    }

    let spans: Vec<ElementRef<'_>> = element.select(&SPANS).collect();

    if spans
        .iter()
        .any(|span| matches_exact(Some(visible_text(span).as_str()), SPONSORED_TEXTS))
    {
        return SourceCategory::Sponsored;
    }

    let texts: Vec<String> = spans.iter().map(trimmed_text).collect();

    if any_contains(&texts, PEOPLE_YOU_MAY_KNOW_TEXTS) {
        SourceCategory::PeopleSuggestion
    } else if any_contains(&texts, GROUP_SUGGESTIONS_TEXTS) {
        SourceCategory::GroupSuggestion
    } else if any_equals(&texts, SUGGESTED_FOR_YOU_TEXTS) || any_equals(&texts, FOLLOW_BUTTON_TEXTS)
    {
        SourceCategory::Suggested
    } else {
        SourceCategory::Following
    }
}

/// Text a reader actually sees. Sponsored labels are often rendered as a run
/// of `<b>` leaves next to `display: none` decoys meant for screen readers.
pub fn visible_text(element: &ElementRef<'_>) -> String {
    let visible: String = element
        .select(&BOLD)
        .filter(|b| b.select(&BOLD).next().is_none())
        .filter(|b| {
            let style = b.value().attr("style").unwrap_or_default();
            !style.contains("display: none") && !style.contains("display:none")
        })
        .flat_map(|b| b.text())
        .collect();

    if !visible.trim().is_empty() {
        return visible.trim().to_string();
    }
    trimmed_text(element)
}

fn any_contains(texts: &[String], patterns: &[&str]) -> bool {
    texts.iter().any(|text| matches_any(Some(text.as_str()), patterns))
}

fn any_equals(texts: &[String], patterns: &[&str]) -> bool {
    texts.iter().any(|text| matches_exact(Some(text.as_str()), patterns))
}

fn trimmed_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn count_before_unit(re: &Regex, text: &str) -> String {
    re.captures(text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "0".into())
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|base| base.join(href).ok()),
        Err(_) => None,
    }
}
