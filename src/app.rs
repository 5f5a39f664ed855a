use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::config::{self, Config};
use crate::page::Page;
use crate::parser::SourceCategory;
use crate::session::{Action, Session, Stats};
use crate::settings::{self, Settings, SettingsStore};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub snapshot: PathBuf,
    pub config_file: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEntry {
    pub index: usize,
    pub category: SourceCategory,
    pub author: Option<String>,
    pub permalink: Option<Url>,
    pub action: &'static str,
    pub rule: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub snapshot: String,
    pub settings_path: String,
    pub posts: Vec<PostEntry>,
    pub stories_hidden: usize,
    pub stats: Stats,
}

/// Filters one saved page and reports what happened to each post.
pub fn run(options: RunOptions) -> Result<Report> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    if let Err(err) = crate::logging::init(&cfg.log.level) {
        eprintln!("warning: {err:#}");
    }

    let settings_path = options
        .settings_path
        .clone()
        .or_else(|| cfg.storage.path.clone())
        .or_else(settings::default_path);
    let settings = load_settings(settings_path.clone());

    let document = fs::read_to_string(&options.snapshot)
        .with_context(|| format!("read snapshot {}", options.snapshot.display()))?;
    let report = filter_document(&cfg, settings, &document)?;

    Ok(Report {
        snapshot: options.snapshot.display().to_string(),
        settings_path: friendly_path(settings_path.as_deref()),
        ..report
    })
}

/// Runs a full rescan over `document` with the given settings.
pub fn filter_document(cfg: &Config, settings: Settings, document: &str) -> Result<Report> {
    let base_url = Url::parse(&cfg.page.base_url)
        .with_context(|| format!("invalid page.base_url `{}`", cfg.page.base_url))?;
    let mut page = Page::parse(document).with_base_url(Some(base_url));

    let mut session = Session::new(cfg, settings);
    let pass = session.rescan(&mut page);

    let posts = pass
        .outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            let (action, rule) = match outcome.action {
                Action::Hidden(rule) => ("hidden", Some(rule.name())),
                Action::Approved => ("approved", None),
            };
            PostEntry {
                index,
                category: outcome.post.source,
                author: outcome.post.author.clone(),
                permalink: outcome.post.permalink.clone(),
                action,
                rule,
            }
        })
        .collect();

    info!(
        posts = pass.processed,
        hidden = pass.hidden,
        "snapshot filtered"
    );

    Ok(Report {
        snapshot: String::new(),
        settings_path: String::new(),
        posts,
        stories_hidden: pass.stories_hidden,
        stats: session.stats(&page),
    })
}

fn load_settings(path: Option<PathBuf>) -> Settings {
    match SettingsStore::open(settings::Options { path }) {
        Ok(store) => store.load(),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "settings store unavailable, using defaults");
            Settings::default()
        }
    }
}

fn friendly_path(path: Option<&Path>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "(defaults)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"<html><body><div role="main"><h3>Feed posts</h3><div>
        <div><h4><a href="/ads"><span>Acme Corp</span></a></h4><span>Sponsored</span><div dir="auto">Buy the new Acme widget today, limited offer for everyone.</div></div>
        <div><h4><a href="/jane"><span>Jane Doe</span></a></h4><span>2h</span><div dir="auto">Spent the weekend hiking along the coast with friends.</div></div>
    </div></div><div data-pagelet="Stories">tray</div></body></html>"#;

    #[test]
    fn report_lists_every_post() {
        let report = filter_document(&Config::default(), Settings::default(), SNAPSHOT).unwrap();
        assert_eq!(report.posts.len(), 2);
        assert_eq!(report.posts[0].category, SourceCategory::Sponsored);
        assert_eq!(report.posts[0].action, "hidden");
        assert_eq!(report.posts[0].rule, Some("sponsored"));
        assert_eq!(report.posts[1].author.as_deref(), Some("Jane Doe"));
        assert_eq!(report.posts[1].action, "approved");
        assert_eq!(report.stories_hidden, 1);
        assert_eq!(report.stats.total_posts, 1);
    }

    #[test]
    fn bad_base_url_is_an_error() {
        let mut cfg = Config::default();
        cfg.page.base_url = "not a url".into();
        assert!(filter_document(&cfg, Settings::default(), SNAPSHOT).is_err());
    }

    #[test]
    fn friendly_path_falls_back_to_defaults_label() {
        assert_eq!(friendly_path(None), "(defaults)");
    }
}
