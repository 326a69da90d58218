//! nspkit CLI
//!
//! Downloads titles and system updates from the CDN and optionally repacks
//! titles into installable NSP archives.

use std::cell::RefCell;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use nspkit::cdn::http::HttpTransport;
use nspkit::config::{Config, DEFAULT_CONFIG_FILE};
use nspkit::decrypt::Hactool;
use nspkit::fetch::{ByteRangeFetcher, Progress};
use nspkit::pipeline::Pipeline;
use nspkit::request::{TitleRequest, parse_system_version};

#[derive(Parser)]
#[command(name = "nspkit")]
#[command(version, about = "Download titles from the CDN and repack them as NSP")]
struct Cli {
    /// Configuration file (default: nspkit.json next to the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory, overriding the configured one
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Titles to download, formatted TID-VER or TID-VER-TKEY
    #[arg(short = 'g', long = "game", value_name = "TID-VER[-TKEY]", num_args = 1..)]
    games: Vec<String>,

    /// System updates to download, as a decimal version or X.Y.Z-B
    #[arg(short = 's', long = "sysupdate", value_name = "VER", num_args = 1..)]
    sysupdates: Vec<String>,

    /// Repack downloaded titles into NSP (base titles and add-ons need a title key for a ticket)
    #[arg(short, long)]
    repack: bool,
}

const BAR_STYLE: &str =
    "{prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Terminal progress bar for the running transfer.
#[derive(Default)]
struct Bar {
    current: RefCell<Option<ProgressBar>>,
}

impl Progress for Bar {
    fn begin(&self, name: &str, done: u64, total: Option<u64>) {
        let pb = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) = ProgressStyle::with_template(BAR_STYLE) {
            pb.set_style(style);
        }
        pb.set_prefix(name.chars().take(12).collect::<String>());
        pb.set_position(done);
        *self.current.borrow_mut() = Some(pb);
    }

    fn advance(&self, done: u64) {
        if let Some(pb) = self.current.borrow().as_ref() {
            pb.set_position(done);
        }
    }

    fn finish(&self) {
        if let Some(pb) = self.current.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}

fn load_config(path: Option<&Path>) -> nspkit::Result<Config> {
    if let Some(path) = path {
        return Config::load(path);
    }
    let default = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CONFIG_FILE)));
    match default {
        Some(path) if path.is_file() => Config::load(&path),
        _ => {
            warn!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            Ok(Config::default())
        }
    }
}

fn run(cli: Cli) -> nspkit::Result<bool> {
    let games = cli
        .games
        .iter()
        .map(|g| g.parse::<TitleRequest>())
        .collect::<nspkit::Result<Vec<_>>>()?;
    let sysupdates = cli
        .sysupdates
        .iter()
        .map(|v| parse_system_version(v))
        .collect::<nspkit::Result<Vec<_>>>()?;

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(output) = cli.output {
        config.paths.output_dir = output;
    }

    let fetcher = ByteRangeFetcher::new(HttpTransport::new(&config)?).with_progress(Bar::default());
    let mut pipeline = Pipeline::new(&config, fetcher, Hactool::from_paths(&config.paths));

    let mut ok = true;
    for request in &games {
        match pipeline.download_game(request, cli.repack) {
            Ok(got) => match got.archive {
                Some(nsp) => info!("{request}: created {}", nsp.display()),
                None => info!("{request}: saved to {}", got.dir.display()),
            },
            Err(e) => {
                error!("{request}: {e}");
                ok = false;
            }
        }
    }
    for version in sysupdates {
        match pipeline.download_system_update(version) {
            Ok(got) => info!(
                "system update {version}: {} titles saved to {}",
                got.titles.len(),
                got.dir.display()
            ),
            Err(e) => {
                error!("system update {version}: {e}");
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nspkit=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if cli.games.is_empty() && cli.sysupdates.is_empty() {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(true) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
