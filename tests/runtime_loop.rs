use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Sender};
use feed_clarity::config::Config;
use feed_clarity::page::Page;
use feed_clarity::runtime::{HostEvent, Request, Response, Runtime};
use feed_clarity::session::{Session, Stats};
use feed_clarity::settings::{FeatureKey, Settings, SettingsStore};

const FEED: &str = r#"<html><body><div role="main"><h3>Feed posts</h3><div id="feed">
    <div id="p1"><h4><a href="/sam"><span>Sam Lee</span></a></h4><span>3h</span><div dir="auto">Spent the weekend hiking along the coast with friends.</div></div>
</div></div></body></html>"#;

const SPONSORED: &str = r#"<div id="ad"><h4><a href="/ads"><span>Acme Corp</span></a></h4><span>Sponsored</span><div dir="auto">Buy the new Acme widget today, limited offer for everyone.</div></div>"#;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> Config {
    let mut config = Config::default();
    config.timing.initial_delay = Duration::from_millis(10);
    config.timing.frame_interval = Duration::from_millis(5);
    config.timing.body_poll_interval = Duration::from_millis(5);
    config.timing.observer_throttle = Duration::from_millis(20);
    config.timing.batch_debounce = Duration::from_millis(20);
    config.timing.rescan_interval = Duration::from_secs(60);
    config.timing.prune_interval = Duration::from_secs(60);
    config
}

fn runtime(config: &Config, document: &str) -> Runtime {
    let session = Session::new(config, Settings::default());
    Runtime::new(Page::parse(document), session, config.timing.clone())
}

fn ask(events: &Sender<HostEvent>, request: Request) -> Response {
    let (tx, rx) = bounded(1);
    events.send(HostEvent::Request(request, tx)).unwrap();
    rx.recv_timeout(WAIT).unwrap()
}

fn stats(events: &Sender<HostEvent>) -> Stats {
    match ask(events, Request::GetStats) {
        Response::Stats(stats) => stats,
        other => panic!("unexpected response {other:?}"),
    }
}

/// Polls stats until `ready` holds, failing after a generous deadline.
fn wait_for_stats(events: &Sender<HostEvent>, ready: impl Fn(&Stats) -> bool) -> Stats {
    let deadline = Instant::now() + WAIT;
    loop {
        let current = stats(events);
        if ready(&current) {
            return current;
        }
        assert!(Instant::now() < deadline, "stats never settled: {current:?}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn feed_of(posts: &str) -> String {
    format!(
        r#"<html><body><div role="main"><h3>Feed posts</h3><div id="feed">{posts}</div></div></body></html>"#
    )
}

#[test]
fn inserted_sponsored_post_is_hidden() {
    let config = fast_config();
    let runtime = runtime(&config, FEED);
    let (events, rx) = unbounded();

    let driver = thread::spawn(move || {
        wait_for_stats(&events, |s| s.filter.approved == 1);

        events
            .send(HostEvent::Append {
                target: "#feed".into(),
                html: SPONSORED.into(),
            })
            .unwrap();
        let after = wait_for_stats(&events, |s| s.filter.hidden == 1);
        assert_eq!(after.total_posts, 1);

        assert!(matches!(
            ask(&events, Request::Rescan),
            Response::Rescan(ack) if ack.success
        ));
        events.send(HostEvent::Shutdown).unwrap();
    });

    let runtime = runtime.run(rx);
    driver.join().unwrap();

    let page = runtime.page();
    let ad = page.query("#ad").unwrap()[0];
    assert!(page.is_hidden(ad));
    assert_eq!(runtime.session().stats(page).filter.processed, 4);
}

#[test]
fn periodic_scan_catches_unobserved_insertions() {
    let mut config = fast_config();
    config.timing.rescan_interval = Duration::from_millis(50);
    let runtime = runtime(&config, FEED);
    let (events, rx) = unbounded();

    let driver = thread::spawn(move || {
        wait_for_stats(&events, |s| s.filter.processed == 1);
        // A bare <section> holds no div or article, so the watcher skips it.
        events
            .send(HostEvent::Append {
                target: "#feed".into(),
                html: SPONSORED.replace("<div id=\"ad\">", "<section id=\"ad\">")
                    .replace("</div></div>", "</div></section>"),
            })
            .unwrap();
        let settled = wait_for_stats(&events, |s| s.filter.hidden == 1);
        assert_eq!(settled.filter.processed, 2);
        events.send(HostEvent::Shutdown).unwrap();
    });

    let runtime = runtime.run(rx);
    driver.join().unwrap();
    let page = runtime.page();
    assert!(page.is_hidden(page.query("section#ad").unwrap()[0]));
}

#[test]
fn batch_backlog_drains_through_follow_up_passes() {
    let mut config = fast_config();
    config.limits.max_batch_size = 2;
    let posts: String = (0..5)
        .map(|i| SPONSORED.replace("id=\"ad\"", &format!("id=\"ad{i}\"")))
        .collect();
    let runtime = runtime(&config, &feed_of(&posts));
    let (events, rx) = unbounded();

    let driver = thread::spawn(move || {
        let settled = wait_for_stats(&events, |s| s.filter.processed == 5);
        assert_eq!(settled.filter.hidden, 5);
        assert!(settled.filter.passes >= 3);
        events.send(HostEvent::Shutdown).unwrap();
    });

    runtime.run(rx);
    driver.join().unwrap();
}

#[test]
fn load_replaces_document_and_forgets_processed_posts() {
    let config = fast_config();
    let runtime = runtime(&config, FEED);
    let (events, rx) = unbounded();

    let driver = thread::spawn(move || {
        wait_for_stats(&events, |s| s.filter.processed == 1);
        events
            .send(HostEvent::Load {
                html: feed_of(SPONSORED),
            })
            .unwrap();
        let settled = wait_for_stats(&events, |s| s.filter.processed == 2);
        assert_eq!(settled.filter.approved, 1);
        assert_eq!(settled.filter.hidden, 1);
        assert_eq!(settled.total_posts, 0);
        events.send(HostEvent::Shutdown).unwrap();
    });

    let runtime = runtime.run(rx);
    driver.join().unwrap();
    let page = runtime.page();
    assert!(page.query("#p1").unwrap().is_empty());
    assert_eq!(runtime.session().processed().len(), 1);
}

#[test]
fn settings_updates_reach_the_loop() {
    let config = fast_config();
    let store = SettingsStore::open_in_memory().unwrap();
    let session = Session::new(&config, store.load());
    let runtime = Runtime::new(Page::parse(FEED), session, config.timing.clone())
        .with_settings_updates(store.subscribe());
    let (events, rx) = unbounded();

    let driver = thread::spawn(move || {
        store.update(FeatureKey::RemoveSponsored, false).unwrap();
        let settled = wait_for_stats(&events, |s| s.features_enabled == 5);
        assert_eq!(settled.features_enabled, 5);
        match ask(&events, Request::GetSettings) {
            Response::Settings(settings) => assert!(!settings.remove_sponsored),
            other => panic!("unexpected response {other:?}"),
        }
    });

    // The loop ends once the driver drops the last event sender.
    let runtime = runtime.run(rx);
    driver.join().unwrap();
    assert!(!runtime.session().settings().remove_sponsored);
}
