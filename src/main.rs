use std::path::PathBuf;

use anyhow::{bail, Context, Result};

const HELP: &str = "Feed Clarity - Hide sponsored, suggested and reel posts from a social feed.

Usage: feed-clarity [OPTIONS] <SNAPSHOT.html>

  --config <PATH>      Read configuration from PATH
  --settings <PATH>    Use the settings database at PATH
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

enum Command {
    Version,
    Help,
    Run(feed_clarity::app::RunOptions),
}

fn main() {
    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err:#}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    match command {
        Command::Version => println!("feed-clarity {}", feed_clarity::VERSION),
        Command::Help => println!("{HELP}"),
        Command::Run(options) => {
            if let Err(err) = run(options) {
                eprintln!("error: {err:?}");
                std::process::exit(1);
            }
        }
    }
}

fn run(options: feed_clarity::app::RunOptions) -> Result<()> {
    let report = feed_clarity::run(options)?;
    let json = serde_json::to_string_pretty(&report).context("encode report")?;
    println!("{json}");
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut options = feed_clarity::app::RunOptions::default();
    let mut snapshot: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                options.config_file = Some(PathBuf::from(path));
            }
            "--settings" => {
                let path = args.next().context("--settings needs a path")?;
                options.settings_path = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => bail!("unknown option `{other}`"),
            other => {
                if snapshot.is_some() {
                    bail!("only one snapshot may be given");
                }
                snapshot = Some(PathBuf::from(other));
            }
        }
    }

    options.snapshot = snapshot.context("missing snapshot path")?;
    Ok(Command::Run(options))
}
