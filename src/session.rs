use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::Utc;
use crossbeam_channel::Receiver;
use ego_tree::NodeId;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::locator::FeedLocator;
use crate::page::{Marker, Page};
use crate::parser::{ParsedPost, PostParser};
use crate::rules::{hide_story_trays, Rule, Rules};
use crate::settings::Settings;
use crate::watcher::{NewContent, Watcher};

const PREVIEW_CHARS: usize = 80;

/// Posts already evaluated, oldest first. Evicted entries keep their
/// `Processed` marker on the page, so eviction never causes reprocessing.
#[derive(Debug, Clone)]
pub struct ProcessedSet {
    capacity: usize,
    ids: HashSet<NodeId>,
    order: VecDeque<NodeId>,
}

impl ProcessedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, id: NodeId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    /// Forgets posts the host has removed from the document.
    pub fn prune(&mut self, page: &Page) -> usize {
        let before = self.ids.len();
        self.order.retain(|id| page.is_attached(*id));
        self.ids = self.order.iter().copied().collect();
        before - self.ids.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hidden(Rule),
    Approved,
}

#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub id: NodeId,
    pub post: ParsedPost,
    pub action: Action,
}

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub processed: usize,
    pub hidden: usize,
    pub approved: usize,
    /// New posts left for a follow-up pass.
    pub backlog: usize,
    pub stories_hidden: usize,
    pub outcomes: Vec<PostOutcome>,
}

impl PassReport {
    fn absorb(&mut self, other: PassReport) {
        self.processed += other.processed;
        self.hidden += other.hidden;
        self.approved += other.approved;
        self.backlog = other.backlog;
        self.stories_hidden += other.stories_hidden;
        self.outcomes.extend(other.outcomes);
    }
}

/// Running totals since the session started or the last reset.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub passes: u64,
    pub processed: u64,
    pub hidden: u64,
    pub approved: u64,
    pub stories_hidden: u64,
    pub hidden_by_rule: BTreeMap<&'static str, u64>,
    /// Milliseconds since the Unix epoch.
    pub last_reset: i64,
}

impl Default for FilterStats {
    fn default() -> Self {
        Self {
            passes: 0,
            processed: 0,
            hidden: 0,
            approved: 0,
            stories_hidden: 0,
            hidden_by_rule: BTreeMap::new(),
            last_reset: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_posts: usize,
    pub features_enabled: usize,
    pub filter: FilterStats,
}

pub struct Session {
    locator: FeedLocator,
    parser: PostParser,
    watcher: Watcher,
    rules: Rules,
    settings: Settings,
    processed: ProcessedSet,
    stats: FilterStats,
    max_batch_size: usize,
}

impl Session {
    pub fn new(config: &Config, settings: Settings) -> Self {
        Self {
            locator: FeedLocator::new(&config.limits),
            parser: PostParser::new(&config.limits),
            watcher: Watcher::new(
                config.timing.observer_throttle,
                config.timing.body_poll_interval,
            ),
            rules: Rules::from_settings(&settings),
            settings,
            processed: ProcessedSet::new(config.limits.processed_capacity),
            stats: FilterStats::default(),
            max_batch_size: config.limits.max_batch_size.max(1),
        }
    }

    pub fn start(&mut self, page: &Page) -> Option<Receiver<NewContent>> {
        self.watcher.start(page)
    }

    pub fn stop(&mut self) {
        self.watcher.stop();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut Watcher {
        &mut self.watcher
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    fn is_processed(&self, page: &Page, id: NodeId) -> bool {
        self.processed.contains(id) || page.has_marker(id, Marker::Processed)
    }

    /// One filtering pass over posts not seen before, in document order.
    pub fn process_all_posts(&mut self, page: &mut Page) -> PassReport {
        let pending: Vec<NodeId> = self
            .locator
            .get_all_posts(page)
            .into_iter()
            .filter(|id| !self.is_processed(page, *id))
            .collect();

        let mut report = PassReport {
            backlog: pending.len().saturating_sub(self.max_batch_size),
            ..PassReport::default()
        };

        for id in pending.into_iter().take(self.max_batch_size) {
            let post = self.parser.parse_post(page, id);
            if post.is_unparsed() {
                let preview: String = page.text(id).trim().chars().take(PREVIEW_CHARS).collect();
                debug!(%preview, "post has no author or content");
            }

            let action = match self.rules.first_match(&post) {
                Some(rule) => {
                    rule.apply(page, id);
                    *self.stats.hidden_by_rule.entry(rule.name()).or_default() += 1;
                    report.hidden += 1;
                    Action::Hidden(rule)
                }
                None => {
                    approve(page, id);
                    report.approved += 1;
                    Action::Approved
                }
            };
            debug!(
                source = post.source.as_str(),
                author = post.author.as_deref().unwrap_or("-"),
                ?action,
                "post processed"
            );

            page.set_marker(id, Marker::Processed, true);
            self.processed.insert(id);
            report.processed += 1;
            report.outcomes.push(PostOutcome { id, post, action });
        }

        if self.rules.is_enabled(Rule::Stories) {
            report.stories_hidden = hide_story_trays(page);
        }

        self.stats.passes += 1;
        self.stats.processed += report.processed as u64;
        self.stats.hidden += report.hidden as u64;
        self.stats.approved += report.approved as u64;
        self.stats.stories_hidden += report.stories_hidden as u64;

        if report.processed > 0 || report.stories_hidden > 0 {
            info!(
                processed = report.processed,
                hidden = report.hidden,
                approved = report.approved,
                stories = report.stories_hidden,
                backlog = report.backlog,
                "filter pass complete"
            );
        }
        report
    }

    /// Forgets every earlier decision and reprocesses the whole feed.
    pub fn rescan(&mut self, page: &mut Page) -> PassReport {
        self.processed.clear();
        page.clear_marker(Marker::Processed);
        info!("rescanning feed");

        let mut total = self.process_all_posts(page);
        while total.backlog > 0 {
            let next = self.process_all_posts(page);
            if next.processed == 0 {
                break;
            }
            total.absorb(next);
        }
        total
    }

    pub fn stats(&self, page: &Page) -> Stats {
        let total_posts = self
            .locator
            .get_all_posts(page)
            .into_iter()
            .filter(|id| !page.is_hidden(*id))
            .count();
        Stats {
            total_posts,
            features_enabled: self.rules.enabled_count(),
            filter: self.stats.clone(),
        }
    }

    /// Zeroes the counters. Decisions already made on the page are kept.
    pub fn reset_stats(&mut self) {
        self.stats = FilterStats::default();
        info!("filter stats reset");
    }

    /// New settings affect posts processed from now on; earlier decisions
    /// stand until a rescan.
    pub fn apply_settings(&mut self, settings: Settings) {
        self.rules = Rules::from_settings(&settings);
        info!(enabled = self.rules.enabled_count(), "settings updated");
        self.settings = settings;
    }

    pub fn prune(&mut self, page: &mut Page) -> usize {
        let pruned = self.processed.prune(page);
        let forgotten = page.forget_detached();
        if pruned > 0 || forgotten > 0 {
            debug!(pruned, forgotten, "dropped state for detached nodes");
        }
        pruned
    }

    pub fn on_document_replaced(&mut self) {
        self.processed.clear();
        debug!("document replaced, processed posts forgotten");
    }
}

fn approve(page: &mut Page, id: NodeId) {
    page.set_display_none(id, false);
    page.set_marker(id, Marker::Hidden, false);
    page.set_marker(id, Marker::Approved, true);
}
