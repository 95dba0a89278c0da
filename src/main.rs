use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use marginalia::comments::CommentStore;
use marginalia::panic_handler;
use marginalia::paths::{self, STORAGE_DIR_ENV};
use marginalia::settings::{self, Settings};
use marginalia::{DeleteOutcome, Document, FileStore, HighlightId, Session};

#[derive(Parser, Debug)]
#[command(
    name = "marginalia",
    version,
    about = "Highlight passages of saved HTML pages and keep comment threads on them"
)]
struct Cli {
    /// Settings file (default: <config dir>/marginalia/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding per-origin comment storage
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
    /// off, error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Highlight a passage and start its thread with a first comment
    Highlight(HighlightArgs),
    /// Add a comment to an existing highlight
    Comment(CommentArgs),
    /// Delete a comment; deleting the last one removes the highlight
    Delete(DeleteArgs),
    /// Print a highlight's quote and comments
    Thread(ThreadArgs),
    /// Print every stored thread for the origin of a URL
    List(ListArgs),
    /// Reconcile a page with storage and print or save the result
    Render(PageArgs),
}

#[derive(Args, Debug)]
struct PageArgs {
    /// Saved HTML page
    page: PathBuf,
    /// URL the page was loaded from; its origin selects the storage
    #[arg(long)]
    url: String,
    /// Where to write the page (default: overwrite the input; `render` prints it)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct HighlightArgs {
    #[command(flatten)]
    page: PageArgs,
    /// Text to highlight
    #[arg(long, conflicts_with = "span", required_unless_present = "span")]
    quote: Option<String>,
    /// Which match of --quote to use, counting from zero
    #[arg(long, default_value_t = 0, requires = "quote")]
    occurrence: usize,
    /// Character span START..END of the page text
    #[arg(long)]
    span: Option<CharSpan>,
    /// First comment of the thread
    #[arg(long)]
    comment: String,
}

#[derive(Args, Debug)]
struct CommentArgs {
    #[command(flatten)]
    page: PageArgs,
    #[arg(long)]
    id: String,
    #[arg(long)]
    text: String,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[command(flatten)]
    page: PageArgs,
    #[arg(long)]
    id: String,
    #[arg(long)]
    comment_id: i64,
}

#[derive(Args, Debug)]
struct ThreadArgs {
    #[command(flatten)]
    page: PageArgs,
    #[arg(long)]
    id: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    url: String,
}

#[derive(Debug, Clone, Copy)]
struct CharSpan {
    start: usize,
    end: usize,
}

impl FromStr for CharSpan {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let (start, end) = value
            .split_once("..")
            .ok_or_else(|| anyhow!("expected START..END, got {value:?}"))?;
        Ok(Self {
            start: start.trim().parse().context("invalid span start")?,
            end: end.trim().parse().context("invalid span end")?,
        })
    }
}

fn init_logging() -> Result<()> {
    let log_path = paths::resolve_log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {log_path:?}"))?;
    WriteLogger::init(LevelFilter::Trace, Config::default(), file)?;
    Ok(())
}

fn main() -> Result<()> {
    panic_handler::initialize_panic_handler();
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("warning: logging disabled: {e:#}");
    }
    let settings = settings::load_settings(cli.config.as_deref());
    let level = match cli.log_level.as_deref() {
        Some(level) => level
            .parse::<LevelFilter>()
            .with_context(|| format!("Unknown log level {level:?}"))?,
        None => settings.log_level_filter(),
    };
    log::set_max_level(level);

    info!("Starting marginalia: {:?}", cli.command);
    let result = run(cli, &settings);
    if let Err(e) = &result {
        error!("Command failed: {e:#}");
    }
    result
}

fn run(cli: Cli, settings: &Settings) -> Result<()> {
    let storage_dir = paths::resolve_storage_dir(
        cli.storage_dir.as_deref(),
        env::var_os(STORAGE_DIR_ENV),
        settings,
    )?;

    match cli.command {
        Commands::Highlight(args) => {
            let mut session = open_session(&args.page, &storage_dir, settings)?;
            let range = match (&args.quote, args.span) {
                (Some(quote), _) => session.select_text(quote, args.occurrence)?,
                (None, Some(span)) => session.select_offsets(span.start, span.end)?,
                (None, None) => bail!("Either --quote or --span is required"),
            };
            let id = session
                .begin_highlight(&range)
                .context("Could not highlight the selection")?;
            let record = session.submit_comment(&args.comment, Utc::now())?;
            session.close_thread();
            let Some(record) = record else {
                bail!("Comment text is empty; nothing was saved");
            };
            write_page(&session, &args.page)?;
            println!("{id}\t{}", record.id);
        }
        Commands::Comment(args) => {
            let mut session = open_session(&args.page, &storage_dir, settings)?;
            let id = HighlightId::new(args.id);
            session
                .open_thread(&id)
                .with_context(|| format!("No highlight {id} in {:?}", args.page.page))?;
            let record = session.submit_comment(&args.text, Utc::now())?;
            session.close_thread();
            let Some(record) = record else {
                bail!("Comment text is empty; nothing was saved");
            };
            write_page(&session, &args.page)?;
            println!("{}", record.id);
        }
        Commands::Delete(args) => {
            let mut session = open_session(&args.page, &storage_dir, settings)?;
            let id = HighlightId::new(args.id);
            match session.delete_comment(&id, args.comment_id)? {
                DeleteOutcome::NotFound => {
                    bail!("No comment {} in thread {id}", args.comment_id)
                }
                DeleteOutcome::Removed { remaining } => {
                    println!("{remaining} comments left in {id}")
                }
                DeleteOutcome::ThreadEmptied => println!("Removed highlight {id}"),
            }
            write_page(&session, &args.page)?;
        }
        Commands::Thread(args) => {
            let mut session = open_session(&args.page, &storage_dir, settings)?;
            let id = HighlightId::new(args.id);
            let view = session
                .open_thread(&id)
                .with_context(|| format!("No highlight {id} in {:?}", args.page.page))?;
            println!("{} ({} theme)", view.highlight_id, view.theme.as_str());
            println!("> {}", view.quote);
            for comment in &view.comments {
                println!(
                    "[{}] {}  {}",
                    comment.id,
                    comment.timestamp.format("%Y-%m-%d %H:%M"),
                    comment.text
                );
            }
        }
        Commands::List(args) => {
            let storage = FileStore::for_origin(&storage_dir, &args.url)?;
            let store = CommentStore::load(storage, settings.storage_key.clone());
            for id in store.highlight_ids() {
                println!("{id}");
                for comment in store.list(id) {
                    println!("  [{}] {}  ({})", comment.id, comment.text, comment.url);
                }
            }
        }
        Commands::Render(page) => {
            let session = open_session(&page, &storage_dir, settings)?;
            for id in session.pending_anchors() {
                eprintln!("Thread {id} has no highlight in this page");
            }
            if page.output.is_some() {
                write_page(&session, &page)?;
            } else {
                print!("{}", session.document().to_html()?);
            }
        }
    }
    Ok(())
}

fn open_session(page: &PageArgs, storage_dir: &Path, settings: &Settings) -> Result<Session<FileStore>> {
    let html = fs::read_to_string(&page.page)
        .with_context(|| format!("Failed to read page {:?}", page.page))?;
    let storage = FileStore::for_origin(storage_dir, &page.url)?;
    Ok(Session::start(Document::parse(&html), storage, settings, page.url.clone()))
}

fn write_page(session: &Session<FileStore>, page: &PageArgs) -> Result<()> {
    let target = page.output.as_deref().unwrap_or(&page.page);
    let html = session.document().to_html()?;
    fs::write(target, html).with_context(|| format!("Failed to write page {target:?}"))?;
    info!("Wrote page to {target:?}");
    Ok(())
}
