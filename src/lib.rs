#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod locator;
pub mod logging;
pub mod page;
pub mod parser;
pub mod patterns;
pub mod rules;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod timing;
pub mod watcher;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
