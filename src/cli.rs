use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tripfacets::brush::MoveOrigin;
use tripfacets::dimension::Extent;
use tripfacets::parser::{self, Command};
use tripfacets::source::{self, TripFetcher};
use tripfacets::storage::QueryCache;
use tripfacets::{Coordinator, ExplorerConfig, FacetView, RefreshReport};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Interactive trip delay explorer", long_about = None)]
struct Args {
    #[clap(long)]
    config: Option<PathBuf>,

    /// Load trips from a JSON file instead of the API.
    #[clap(long)]
    trips: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let args = Args::parse();
    print_banner();

    let mut coordinator = match open(&args) {
        Ok(coordinator) => {
            println!("[\u{2713}] Loaded {} trips.", coordinator.store().len());
            coordinator
        }
        Err(e) => {
            println!("[\u{2717}] Could not load trips: {}", e);
            std::process::exit(1);
        }
    };
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("trips> ");
        if io::stdout().flush().is_err() { break; }
        buffer.clear();

        match stdin.read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = execute_command(&mut coordinator, cmd) {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("BRUSH") {
                    println!("    \u{2139}\u{fe0f}  Hint: Try 'BRUSH date 2017-10-03..2017-10-10' or 'BRUSH date NONE'");
                }
            }
        }
    }
}

fn open(args: &Args) -> tripfacets::Result<Coordinator> {
    let config = match &args.config {
        Some(path) => ExplorerConfig::load(path)?,
        None => ExplorerConfig::default(),
    };

    let store = match &args.trips {
        Some(path) => source::load_file(path)?,
        None => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(tripfacets::error::FetchError::from)?;
            println!("Fetching trips {} .. {} from {}", config.start_date, config.end_date, config.api_base);
            runtime.block_on(
                TripFetcher::new(&config.api_base)
                    .with_cache(QueryCache::new(&config.cache_path))
                    .load(&config.start_date, &config.end_date),
            )?
        }
    };

    Coordinator::new(store, config.facets())
}

fn print_banner() {
    println!("\n==================================================");
    println!("   Trip Facets CLI - crossfiltered delay explorer");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. SHOW:     SHOW [facet]");
    println!("2. TOGGLE:   TOGGLE weekDay 0          (dates as 2017-10-03)");
    println!("3. RESET:    RESET [facet | ALL]");
    println!("4. BRUSH:    BRUSH date 2017-10-03..2017-10-10 | BRUSH date NONE");
    println!("5. DRAG:     DRAG date 120 480         (display units)");
    println!("6. RESIZE:   RESIZE date 640");
    println!("7. LINK:     LINK");
    println!("8. RESTORE:  RESTORE weekDay=0,6&date=2017-10-03..2017-10-10");
    println!("9. EXIT:     Quit\n");
}

fn execute_command(coordinator: &mut Coordinator, cmd: Command) -> tripfacets::Result<()> {
    match cmd {
        Command::Help => { print_help(); Ok(()) },
        Command::Show { code } => {
            let report = coordinator.refresh()?;
            print_report(&report, code.as_deref());
            Ok(())
        },
        Command::Toggle { code, key } => {
            let id = coordinator.facet_id(&code)?;
            let report = coordinator.toggle(id, key)?;
            print_summary(&report);
            Ok(())
        },
        Command::Reset { code } => {
            let report = match code {
                Some(code) => {
                    let id = coordinator.facet_id(&code)?;
                    coordinator.reset(id)?
                }
                None => coordinator.reset_all()?,
            };
            print_summary(&report);
            Ok(())
        },
        Command::Brush { code, range } => {
            let id = coordinator.facet_id(&code)?;
            let report = coordinator.brush_set_externally(id, range.map(|(lo, hi)| Extent::new(lo, hi)))?;
            print_summary(&report);
            Ok(())
        },
        Command::Drag { code, from, to } => perform_drag(coordinator, &code, from, to),
        Command::Resize { code, width } => {
            let id = coordinator.facet_id(&code)?;
            let clip = coordinator.brush_resize(id, width)?;
            println!("[\u{2713} OK] Clip window x={} width={}", clip.x, clip.width);
            Ok(())
        },
        Command::Link => {
            let link = coordinator.link();
            if link.is_empty() {
                println!("(no active selections)");
            } else {
                println!("?{}", link);
            }
            Ok(())
        },
        Command::Restore { link } => {
            let report = coordinator.restore_link(&link)?;
            print_summary(&report);
            Ok(())
        },
        Command::Exit => Ok(()),
    }
}

/// Replay a whole gesture: press, move, release.
fn perform_drag(coordinator: &mut Coordinator, code: &str, from: f64, to: f64) -> tripfacets::Result<()> {
    let id = coordinator.facet_id(code)?;
    let range = [from.min(to), from.max(to)];

    coordinator.brush_start(id)?;
    match coordinator.brush_move(id, Some(&range), MoveOrigin::Gesture)? {
        Some(update) => {
            let extent = update.frame.extent;
            println!("[\u{2713} OK] Brushed [{}, {})", extent.low, extent.high);
            if let Some([x0, x1]) = update.frame.realign {
                println!("    Handles snapped to {:.1} .. {:.1}", x0, x1);
            }
        }
        None => println!("[\u{2717}] Move ignored."),
    }

    let release = coordinator.brush_end(id, Some(&range))?;
    match release {
        Some(report) => {
            println!("[\u{2713} OK] Brush cleared.");
            print_summary(&report);
        }
        None => {
            let visible = coordinator.visible_count();
            println!("{} of {} trips selected.", visible, coordinator.store().len());
        }
    }
    Ok(())
}

fn print_summary(report: &RefreshReport) {
    println!("{} of {} trips selected.", report.visible, report.total);
}

fn print_report(report: &RefreshReport, only: Option<&str>) {
    for view in report.facets.iter().filter(|v| only.map_or(true, |c| c == v.code)) {
        print_facet(view);
    }
    print_summary(report);
}

fn print_facet(view: &FacetView) {
    let marker = if view.selection_active { " [filtered]" } else { "" };
    println!("\n{} ({}){} - {} trips", view.title, view.code, marker, view.visible);

    let peak = view.buckets.iter().map(|b| b.value).max().unwrap_or(0).max(1);
    for bucket in view.buckets.iter().filter(|b| b.value > 0) {
        let bar = "#".repeat(((bucket.value * 40) / peak) as usize);
        println!("  {:>24} {:>6} {}", bucket.label, bucket.value, bar);
    }
}
