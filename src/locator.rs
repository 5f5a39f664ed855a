use ego_tree::NodeId;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::config::LimitsConfig;
use crate::page::Page;
use crate::patterns::{matches_any, FEED_HEADER_TEXTS};

/// Text every navigation banner starts with when the page renders the logo twice.
pub const NAV_BOILERPLATE_PREFIX: &str = "FacebookFacebook";

static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3").expect("valid heading selector"));
static ARTICLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[role="article"]"#).expect("valid article selector"));

#[derive(Debug, Clone)]
pub struct FeedLocator {
    min_post_text: usize,
    min_fallback_text: usize,
}

impl Default for FeedLocator {
    fn default() -> Self {
        Self::new(&LimitsConfig::default())
    }
}

impl FeedLocator {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            min_post_text: limits.min_post_text,
            min_fallback_text: limits.min_fallback_text,
        }
    }

    pub fn find_feed_container(&self, page: &Page) -> Option<NodeId> {
        for heading in page.select(&HEADING_SELECTOR) {
            let text = heading.text().collect::<String>();
            if !matches_any(Some(text.as_str()), FEED_HEADER_TEXTS) {
                continue;
            }
            let Some(parent) = heading.parent().and_then(ElementRef::wrap) else {
                continue;
            };
            let container = parent.children().filter_map(ElementRef::wrap).find(|child| {
                child.value().name() == "div"
                    && !is_aria_hidden(child)
                    && child.children().any(|node| node.value().is_element())
            });
            if let Some(container) = container {
                return Some(container.id());
            }
        }
        None
    }

    /// Candidate post elements in document order.
    pub fn get_all_posts(&self, page: &Page) -> Vec<NodeId> {
        if let Some(container) = self.find_feed_container(page) {
            let Some(container) = page.element(container) else {
                return Vec::new();
            };
            return container
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| text_len(el) > self.min_post_text && !is_aria_hidden(el))
                .map(|el| el.id())
                .collect();
        }

        debug!("feed container not found, using article fallback");
        page.select(&ARTICLE_SELECTOR)
            .filter(|el| {
                let text = el.text().collect::<String>();
                text.chars().count() > self.min_fallback_text
                    && !text.starts_with(NAV_BOILERPLATE_PREFIX)
            })
            .map(|el| el.id())
            .collect()
    }
}

pub(crate) fn is_aria_hidden(el: &ElementRef<'_>) -> bool {
    el.value().attr("aria-hidden") == Some("true")
}

fn text_len(el: &ElementRef<'_>) -> usize {
    el.text().map(|chunk| chunk.chars().count()).sum()
}
