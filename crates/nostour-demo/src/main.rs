#![forbid(unsafe_code)]

//! nostour demo binary entry point.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use nostour_demo::cli::{self, Command, HELP_TEXT, VERSION};
use nostour_demo::tours::{self, TOUR_IDS};
use nostour_demo::walkthrough::{Outcome, Walkthrough};
use nostour_runtime::progress::{FileStorage, ProgressStore};
use nostour_web::{ControlAction, SessionConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NOSTOUR_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opts = match cli::parse_args(cli::Opts::from_env(), std::env::args().skip(1)) {
        Ok(Command::Run(opts)) => opts,
        Ok(Command::Help) => {
            println!("{HELP_TEXT}");
            return;
        }
        Ok(Command::Version) => {
            println!("nostour-demo {VERSION}");
            return;
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Run with --help for usage information.");
            process::exit(1);
        }
    };

    if opts.list {
        for id in TOUR_IDS {
            println!("{id}");
        }
        return;
    }

    let tour = match tours::by_id(&opts.tour) {
        Some(Ok(tour)) => tour,
        Some(Err(e)) => {
            eprintln!("Tour {} is misconfigured: {e}", opts.tour);
            process::exit(1);
        }
        None => {
            eprintln!("Unknown tour: {} (try --list)", opts.tour);
            process::exit(1);
        }
    };

    let store = Arc::new(match &opts.store {
        Some(path) => ProgressStore::new(Box::new(FileStorage::new(path))),
        None if opts.persist => ProgressStore::new(Box::new(FileStorage::default_for_app("demo"))),
        None => ProgressStore::in_memory(),
    });
    tracing::info!(backend = store.backend_name(), "progress store ready");
    if opts.reset {
        store.reset(tour.config.id());
    }

    let tour_id = tour.config.id().to_string();
    let auto = store.should_auto_start(&tour_id);
    let mut walkthrough = Walkthrough::new(
        tour,
        Arc::clone(&store),
        SessionConfig::default(),
        opts.width,
        opts.height,
    )
    .with_tick(Duration::from_millis(opts.tick_ms));
    if !auto {
        eprintln!("Tour {tour_id} was already completed or skipped; starting it by hand.");
        walkthrough.click(ControlAction::Start);
    }

    let outcome = walkthrough.autopilot(opts.max_ticks);

    if opts.json {
        match serde_json::to_string_pretty(walkthrough.transcript()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize transcript: {e}");
                process::exit(1);
            }
        }
    } else {
        for entry in walkthrough.transcript() {
            let frame = entry.frame.as_deref().unwrap_or("(no overlay)");
            print!("{:>6}ms  {:<12} {frame}", entry.at_ms, entry.view.to_string());
            if let Some(command) = &entry.dispatched {
                print!("  -> {command}");
            }
            println!();
        }
    }

    match outcome {
        Outcome::Completed | Outcome::Skipped => {
            eprintln!("Tour {tour_id}: {outcome:?}");
        }
        Outcome::NotStarted | Outcome::TimedOut => {
            eprintln!("Tour {tour_id}: {outcome:?}");
            process::exit(2);
        }
    }
}
