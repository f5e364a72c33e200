use std::fmt;
use std::path::PathBuf;

use clap::Parser;

use thread_toc::dom::parser::parse_html;
use thread_toc::storage::{FileStore, KeyValueStore, MemoryStore};
use thread_toc::toc::NodeKind;
use thread_toc::window::{Viewport, Window, WindowError};
use thread_toc::{TocConfig, TocController};

/// Build the thread index for a saved conversation page.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Saved HTML page
    page: PathBuf,

    /// Location the page was saved from
    url: String,

    /// Prompt text budget before the "..." marker
    #[arg(long, default_value_t = 24)]
    truncate: usize,

    /// Path prefix of thread pages
    #[arg(long, default_value = "/search/")]
    prefix: String,

    #[arg(long, default_value_t = 1280.0)]
    viewport_width: f32,

    #[arg(long, default_value_t = 800.0)]
    viewport_height: f32,

    /// Directory for the persisted collapse flag (in-memory when omitted)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Print the integrity report
    #[arg(long, default_value_t = false)]
    report: bool,

    /// Print the generated sidebar markup
    #[arg(long, default_value_t = false)]
    dump_sidebar: bool,
}

#[derive(Debug)]
enum CliError {
    Read { path: PathBuf, source: std::io::Error },
    Location(WindowError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Read { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
            CliError::Location(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<WindowError> for CliError {
    fn from(e: WindowError) -> Self {
        CliError::Location(e)
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = match &args.state_dir {
        Some(dir) => run(&args, FileStore::new(dir)),
        None => run(&args, MemoryStore::new()),
    };
    if let Err(e) = result {
        eprintln!("thread-toc: {}", e);
        std::process::exit(1);
    }
}

fn run<S: KeyValueStore>(args: &Args, store: S) -> Result<(), CliError> {
    let html = std::fs::read_to_string(&args.page).map_err(|source| CliError::Read {
        path: args.page.clone(),
        source,
    })?;
    let window = Window::new(&args.url, Viewport::new(args.viewport_width, args.viewport_height))?;
    let config = TocConfig::default()
        .with_truncate_chars(args.truncate)
        .with_route_prefix(args.prefix.as_str());
    let settle = config.integrity_check_ms;

    let mut controller = TocController::new(parse_html(&html), window, store, config);
    controller.start();
    controller.advance_time(settle);

    if !controller.is_present() {
        println!("No thread index for {}", controller.window().location());
        return Ok(());
    }

    for entry in controller.entries() {
        let indent = match entry.kind {
            NodeKind::Prompt => "",
            NodeKind::Heading => "  ",
            NodeKind::Subheading => "    ",
        };
        println!("{:<18} {}{}", entry.id, indent, entry.text);
    }

    if args.dump_sidebar {
        if let Some(shell) = controller.state().shell {
            println!("\n{}", controller.document().outer_html(shell.root));
        }
    }

    if args.report {
        let report = controller.integrity_report();
        println!(
            "\n{} [{}]",
            report,
            if report.is_healthy() { "ok" } else { "degraded" }
        );
    }
    Ok(())
}
