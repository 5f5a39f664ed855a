use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use ego_tree::NodeId;
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::{debug, info};

use crate::page::{MutationRecord, Page};
use crate::timing::Throttle;

static POST_ROLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[role="article"]"#).expect("valid post role selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    AwaitingBody,
    Watching,
}

/// One coalesced notification; `batches` mutation batches were folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewContent {
    pub batches: usize,
}

pub struct Watcher {
    state: WatchState,
    tx: Option<Sender<NewContent>>,
    frame_requested: bool,
    pending_batches: usize,
    throttle: Throttle,
    body_poll_interval: Duration,
    last_body_poll: Option<Instant>,
}

impl Watcher {
    pub fn new(throttle: Duration, body_poll_interval: Duration) -> Self {
        Self {
            state: WatchState::Idle,
            tx: None,
            frame_requested: false,
            pending_batches: 0,
            throttle: Throttle::new(throttle),
            body_poll_interval,
            last_body_poll: None,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn has_pending_frame(&self) -> bool {
        self.frame_requested
    }

    /// Returns the consumer side of the notification channel, or `None` when
    /// the watcher is already running.
    pub fn start(&mut self, page: &Page) -> Option<Receiver<NewContent>> {
        if self.state != WatchState::Idle {
            debug!("observer already running");
            return None;
        }

        let (tx, rx) = unbounded();
        self.tx = Some(tx);
        if page.body().is_some() {
            self.state = WatchState::Watching;
            info!("observer attached to document body");
        } else {
            self.state = WatchState::AwaitingBody;
            debug!("document body not available yet, polling");
        }
        Some(rx)
    }

    /// Attaches once the body shows up, checking at most every poll interval.
    pub fn poll_body(&mut self, page: &Page, now: Instant) -> bool {
        if self.state != WatchState::AwaitingBody {
            return false;
        }
        if let Some(last) = self.last_body_poll {
            if now.saturating_duration_since(last) < self.body_poll_interval {
                return false;
            }
        }
        self.last_body_poll = Some(now);
        if page.body().is_none() {
            return false;
        }
        self.state = WatchState::Watching;
        info!("observer attached to document body");
        true
    }

    /// Inspects one batch of mutations; requests a frame if anything that can
    /// hold a post was inserted.
    pub fn observe(&mut self, page: &Page, records: &[MutationRecord]) -> bool {
        if self.state != WatchState::Watching {
            return false;
        }
        let has_new_content = records
            .iter()
            .flat_map(|record| record.added.iter())
            .any(|id| may_hold_post(page, *id));
        if has_new_content {
            self.frame_requested = true;
            self.pending_batches += 1;
        }
        has_new_content
    }

    /// Animation-frame callback. Emits at most one notification per frame and
    /// keeps the request pending while throttled.
    pub fn on_frame(&mut self, now: Instant) -> bool {
        if !self.frame_requested || self.state != WatchState::Watching {
            return false;
        }
        if !self.throttle.try_fire(now) {
            return false;
        }
        let batches = std::mem::take(&mut self.pending_batches);
        self.frame_requested = false;
        match self.tx.as_ref() {
            Some(tx) => tx.send(NewContent { batches }).is_ok(),
            None => false,
        }
    }

    pub fn stop(&mut self) {
        if self.state != WatchState::Idle {
            info!("observer stopped");
        }
        self.state = WatchState::Idle;
        self.tx = None;
        self.frame_requested = false;
        self.pending_batches = 0;
        self.last_body_poll = None;
        self.throttle.reset();
    }
}

fn may_hold_post(page: &Page, id: NodeId) -> bool {
    let Some(element) = page.element(id) else {
        return false;
    };
    element.value().name() == "div"
        || POST_ROLE.matches(&element)
        || element.select(&POST_ROLE).next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<html><body><div id="feed"></div></body></html>"#;

    fn watcher() -> Watcher {
        Watcher::new(Duration::ZERO, Duration::from_millis(10))
    }

    #[test]
    fn bursts_coalesce_into_one_frame() {
        let mut page = Page::parse(DOC);
        let mut watcher = watcher();
        let rx = watcher.start(&page).unwrap();

        for i in 0..5 {
            let record = page.append_to("#feed", &format!("<div>post {i}</div>")).unwrap();
            assert!(watcher.observe(&page, &[record]));
        }
        assert!(watcher.on_frame(Instant::now()));
        assert!(!watcher.on_frame(Instant::now()));
        assert_eq!(rx.try_recv().unwrap(), NewContent { batches: 5 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn irrelevant_insertions_are_ignored() {
        let mut page = Page::parse(DOC);
        let mut watcher = watcher();
        let _rx = watcher.start(&page).unwrap();
        let record = page.append_to("#feed", "<span>typing…</span>").unwrap();
        assert!(!watcher.observe(&page, &[record]));
        assert!(!watcher.has_pending_frame());

        let record = page
            .append_to("#feed", r#"<section><p role="article">post</p></section>"#)
            .unwrap();
        assert!(watcher.observe(&page, &[record]));
    }

    #[test]
    fn starting_twice_is_a_no_op() {
        let page = Page::parse(DOC);
        let mut watcher = watcher();
        assert!(watcher.start(&page).is_some());
        assert!(watcher.start(&page).is_none());
        assert_eq!(watcher.state(), WatchState::Watching);
    }

    #[test]
    fn waits_for_body_before_watching() {
        let mut page = Page::blank();
        let mut watcher = watcher();
        let _rx = watcher.start(&page).unwrap();
        assert_eq!(watcher.state(), WatchState::AwaitingBody);

        let now = Instant::now();
        assert!(!watcher.poll_body(&page, now));
        page.load(DOC);
        assert!(!watcher.poll_body(&page, now + Duration::from_millis(2)));
        assert!(watcher.poll_body(&page, now + Duration::from_millis(20)));
        assert_eq!(watcher.state(), WatchState::Watching);
    }

    #[test]
    fn throttled_frame_stays_pending() {
        let mut page = Page::parse(DOC);
        let mut watcher = Watcher::new(Duration::from_millis(300), Duration::from_millis(10));
        let rx = watcher.start(&page).unwrap();
        let start = Instant::now();

        let record = page.append_to("#feed", "<div>a</div>").unwrap();
        watcher.observe(&page, &[record]);
        assert!(watcher.on_frame(start));

        let record = page.append_to("#feed", "<div>b</div>").unwrap();
        watcher.observe(&page, &[record]);
        assert!(!watcher.on_frame(start + Duration::from_millis(16)));
        assert!(watcher.has_pending_frame());
        assert!(watcher.on_frame(start + Duration::from_millis(320)));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn stop_disconnects_and_clears_pending_frame() {
        let mut page = Page::parse(DOC);
        let mut watcher = watcher();
        let rx = watcher.start(&page).unwrap();
        let record = page.append_to("#feed", "<div>a</div>").unwrap();
        watcher.observe(&page, &[record]);

        watcher.stop();
        watcher.stop();
        assert_eq!(watcher.state(), WatchState::Idle);
        assert!(!watcher.has_pending_frame());
        assert!(!watcher.on_frame(Instant::now()));
        assert!(rx.recv().is_err());
    }
}
