use std::ops::ControlFlow;
use std::time::Instant;

use crossbeam_channel::{after, at, never, select, tick, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::page::{MutationRecord, Page};
use crate::session::{Session, Stats};
use crate::settings::Settings;
use crate::timing::Debounce;
use crate::watcher::{NewContent, WatchState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    GetStats,
    Rescan,
    GetSettings,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RescanAck {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    Stats(Stats),
    Rescan(RescanAck),
    Settings(Settings),
}

/// Everything the host page can tell the filter.
#[derive(Debug)]
pub enum HostEvent {
    /// Append `html` under the first element matching the `target` selector.
    Append { target: String, html: String },
    /// Remove every element matching `target`.
    Remove { target: String },
    /// Navigation: the document is replaced wholesale.
    Load { html: String },
    Request(Request, Sender<Response>),
    Shutdown,
}

/// Owns the page and the session and drives both from one thread.
pub struct Runtime {
    page: Page,
    session: Session,
    timing: TimingConfig,
    settings_rx: Receiver<Settings>,
    content_rx: Receiver<NewContent>,
    debounce: Debounce,
}

impl Runtime {
    pub fn new(page: Page, session: Session, timing: TimingConfig) -> Self {
        Self {
            page,
            session,
            debounce: Debounce::new(timing.batch_debounce),
            timing,
            settings_rx: never(),
            content_rx: never(),
        }
    }

    pub fn with_settings_updates(mut self, updates: Receiver<Settings>) -> Self {
        self.settings_rx = updates;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until `Shutdown` arrives or every event sender is gone.
    pub fn run(mut self, events: Receiver<HostEvent>) -> Self {
        if let Some(rx) = self.session.start(&self.page) {
            self.content_rx = rx;
        }

        let frames = tick(self.timing.frame_interval);
        let body_poll = tick(self.timing.body_poll_interval);
        let periodic = tick(self.timing.rescan_interval);
        let prune = tick(self.timing.prune_interval);
        let mut initial = after(self.timing.initial_delay);

        info!("filter runtime started");
        loop {
            let content = self.content_rx.clone();
            let settings = self.settings_rx.clone();
            let startup = initial.clone();
            // Idle feeds only wake for the coarse timers.
            let frame = if self.wants_frame() {
                frames.clone()
            } else {
                never()
            };
            let body = if self.wants_body_poll() {
                body_poll.clone()
            } else {
                never()
            };
            let follow_up = match self.debounce.deadline() {
                Some(deadline) => at(deadline),
                None => never(),
            };

            select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        if self.handle(event).is_break() {
                            break;
                        }
                    }
                    Err(_) => {
                        debug!("host event channel closed");
                        break;
                    }
                },
                recv(settings) -> update => match update {
                    Ok(update) => self.session.apply_settings(update),
                    Err(_) => self.settings_rx = never(),
                },
                recv(frame) -> now => {
                    if let Ok(now) = now {
                        self.session.watcher_mut().on_frame(now);
                    }
                }
                recv(body) -> now => {
                    if let Ok(now) = now {
                        self.session.watcher_mut().poll_body(&self.page, now);
                    }
                }
                recv(content) -> signal => match signal {
                    Ok(signal) => {
                        debug!(batches = signal.batches, "new feed content");
                        self.run_pass();
                    }
                    Err(_) => self.content_rx = never(),
                },
                recv(startup) -> _ => {
                    initial = never();
                    self.run_pass();
                }
                recv(periodic) -> _ => self.run_pass(),
                recv(prune) -> _ => {
                    self.session.prune(&mut self.page);
                }
                recv(follow_up) -> now => {
                    if self.debounce.fire(now.unwrap_or_else(|_| Instant::now())) {
                        self.run_pass();
                    }
                }
            }
        }

        self.session.stop();
        self.debounce.cancel();
        info!("filter runtime stopped");
        self
    }

    pub fn handle(&mut self, event: HostEvent) -> ControlFlow<()> {
        match event {
            HostEvent::Append { target, html } => match self.page.append_to(&target, &html) {
                Ok(record) => self.observe(&[record]),
                Err(err) => warn!(%target, error = %err, "ignoring host append"),
            },
            HostEvent::Remove { target } => match self.page.remove_matching(&target) {
                Ok(records) => self.observe(&records),
                Err(err) => warn!(%target, error = %err, "ignoring host removal"),
            },
            HostEvent::Load { html } => {
                self.page.load(&html);
                self.session.on_document_replaced();
                self.debounce.schedule(Instant::now());
            }
            HostEvent::Request(request, reply) => {
                let response = self.respond(request);
                if reply.send(response).is_err() {
                    debug!(?request, "requester went away before the reply");
                }
            }
            HostEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn wants_frame(&self) -> bool {
        self.session.watcher().has_pending_frame()
    }

    fn wants_body_poll(&self) -> bool {
        self.session.watcher().state() == WatchState::AwaitingBody
    }

    fn observe(&mut self, records: &[MutationRecord]) {
        self.session.watcher_mut().observe(&self.page, records);
    }

    fn respond(&mut self, request: Request) -> Response {
        match request {
            Request::GetStats => Response::Stats(self.session.stats(&self.page)),
            Request::Rescan => {
                self.debounce.cancel();
                self.session.rescan(&mut self.page);
                Response::Rescan(RescanAck { success: true })
            }
            Request::GetSettings => Response::Settings(self.session.settings().clone()),
        }
    }

    fn run_pass(&mut self) {
        let report = self.session.process_all_posts(&mut self.page);
        if report.backlog > 0 {
            self.debounce.schedule(Instant::now());
        }
    }
}
