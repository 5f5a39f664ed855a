use ego_tree::NodeId;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;

use crate::page::{Marker, Page};
use crate::parser::{ParsedPost, SourceCategory};
use crate::patterns::{matches_exact, STORIES_TEXTS};
use crate::settings::{FeatureKey, Settings};

static STORY_PAGELET: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-pagelet*="Stories"]"#).expect("valid stories pagelet selector")
});
static ARIA_LABELLED: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[aria-label]").expect("valid aria-label selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Sponsored,
    Reels,
    Suggested,
    PeopleYouMayKnow,
    GroupSuggestions,
    Stories,
}

impl Rule {
    /// Evaluation order. The first enabled rule that applies wins.
    pub const ORDERED: [Rule; 6] = [
        Rule::Sponsored,
        Rule::Reels,
        Rule::Suggested,
        Rule::PeopleYouMayKnow,
        Rule::GroupSuggestions,
        Rule::Stories,
    ];

    /// Settings flag controlling this rule.
    pub fn feature_key(&self) -> FeatureKey {
        match self {
            Rule::Sponsored => FeatureKey::RemoveSponsored,
            Rule::Reels => FeatureKey::RemoveReels,
            Rule::Suggested => FeatureKey::RemoveSuggested,
            Rule::PeopleYouMayKnow => FeatureKey::RemovePeopleYouMayKnow,
            Rule::GroupSuggestions => FeatureKey::RemoveGroupSuggestions,
            Rule::Stories => FeatureKey::RemoveStories,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Rule::Sponsored => "sponsored",
            Rule::Reels => "reels",
            Rule::Suggested => "suggested",
            Rule::PeopleYouMayKnow => "people_you_may_know",
            Rule::GroupSuggestions => "group_suggestions",
            Rule::Stories => "stories",
        }
    }

    pub fn is_enabled(&self, settings: &Settings) -> bool {
        settings.get(self.feature_key())
    }

    /// Stories are never a feed post; trays are handled by [`hide_story_trays`].
    pub fn should_apply(&self, post: &ParsedPost) -> bool {
        match self {
            Rule::Sponsored => post.source == SourceCategory::Sponsored,
            Rule::Reels => post.source == SourceCategory::Reels,
            Rule::Suggested => post.source == SourceCategory::Suggested,
            Rule::PeopleYouMayKnow => post.source == SourceCategory::PeopleSuggestion,
            Rule::GroupSuggestions => post.source == SourceCategory::GroupSuggestion,
            Rule::Stories => false,
        }
    }

    pub fn apply(&self, page: &mut Page, id: NodeId) {
        page.set_display_none(id, true);
        page.set_marker(id, Marker::Hidden, true);
        page.set_marker(id, Marker::Approved, false);
        debug!(rule = self.name(), "post hidden");
    }
}

/// Rules enabled by the current settings, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    enabled: Vec<Rule>,
}

impl Rules {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: Rule::ORDERED
                .iter()
                .copied()
                .filter(|rule| rule.is_enabled(settings))
                .collect(),
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_enabled(&self, rule: Rule) -> bool {
        self.enabled.contains(&rule)
    }

    pub fn first_match(&self, post: &ParsedPost) -> Option<Rule> {
        self.enabled
            .iter()
            .copied()
            .find(|rule| rule.should_apply(post))
    }
}

/// Hides story trays that are not hidden yet. Returns how many were newly hidden.
pub fn hide_story_trays(page: &mut Page) -> usize {
    let trays: Vec<NodeId> = page
        .elements()
        .filter(|el| {
            STORY_PAGELET.matches(el)
                || (ARIA_LABELLED.matches(el)
                    && matches_exact(el.value().attr("aria-label"), STORIES_TEXTS))
        })
        .map(|el| el.id())
        .filter(|id| !page.is_hidden(*id))
        .collect();

    for id in &trays {
        Rule::Stories.apply(page, *id);
    }
    trays.len()
}
