//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use further_core::{Library, Pipeline, TopicEvent, TopicProgress, TopicRequest};
use further_discovery::{OpenLibraryClient, build_client};
use further_shared::{AppConfig, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Further: discover free ebooks and read them as text.
#[derive(Parser)]
#[command(
    name = "further",
    version,
    about = "Discover free ebooks across public catalogs, download them, and extract their text.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search the public catalogs for a query.
    Discover {
        query: String,

        /// Catalog to search: gutendex, openlibrary, or standard-ebooks.
        /// Repeat for several; omit for all.
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Results per catalog.
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Search Open Library books.
    Search {
        query: String,

        /// Extra keyword appended to the query (repeatable).
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Look up an Open Library author and their works.
    Author {
        query: String,

        /// Treat the query as a book title and resolve its author.
        #[arg(long)]
        by_book: bool,
    },

    /// Download one book and print a text summary of it.
    Fetch {
        url: String,

        #[arg(long, default_value = "3")]
        limit_pages: usize,

        #[arg(long, default_value = "3")]
        limit_chapters: usize,
    },

    /// Discover, download, and summarize books about a topic.
    Topic {
        query: String,

        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Results per catalog.
        #[arg(short, long, default_value = "30")]
        limit: usize,

        /// Maximum number of books to download.
        #[arg(long, default_value = "30")]
        download_limit: usize,

        #[arg(long, default_value = "3")]
        limit_pages: usize,

        #[arg(long, default_value = "3")]
        limit_chapters: usize,
    },

    /// List EPUB and PDF files in the library.
    List,

    /// Print metadata for a library file.
    Metadata {
        /// Path relative to the library root.
        path: String,
    },

    /// Print the table of contents of a library file.
    Toc { path: String },

    /// Print one chapter: by href (EPUB) or by outline title (PDF).
    #[command(group = clap::ArgGroup::new("target").required(true))]
    Chapter {
        path: String,

        /// EPUB chapter href, as listed by `toc`.
        #[arg(long, group = "target")]
        chapter: Option<String>,

        /// PDF outline title.
        #[arg(long, group = "target")]
        title: Option<String>,
    },

    /// Start the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Start the MCP server on stdin/stdout.
    Mcp,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Logs go to stderr: stdout carries command output and MCP frames.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "further=info",
        1 => "further=debug",
        _ => "further=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Init must not depend on the existing file parsing.
    if matches!(
        cli.command,
        Command::Config {
            action: ConfigAction::Init
        }
    ) {
        return cmd_config_init();
    }
    let mut config = load_config()?;

    match cli.command {
        Command::Discover {
            query,
            sources,
            limit,
        } => cmd_discover(&config, &query, &sources, limit).await,
        Command::Search {
            query,
            keywords,
            limit,
        } => {
            let client = openlibrary_client(&config)?;
            print_json(&client.search_books(&query, &keywords, limit).await?)
        }
        Command::Author { query, by_book } => {
            let client = openlibrary_client(&config)?;
            let details = if by_book {
                client.search_author_with_book_name(&query).await?
            } else {
                client.search_author(&query).await?
            };
            print_json(&details)
        }
        Command::Fetch {
            url,
            limit_pages,
            limit_chapters,
        } => {
            let pipeline = Pipeline::from_config(&config)?;
            let parsed = pipeline
                .fetch_and_parse(&url, limit_pages, limit_chapters)
                .await?;
            print_json(&parsed)
        }
        Command::Topic {
            query,
            sources,
            limit,
            download_limit,
            limit_pages,
            limit_chapters,
        } => {
            let request = TopicRequest {
                query,
                sources: Some(sources),
                limit,
                download_limit,
                limit_pages,
                limit_chapters,
            };
            cmd_topic(&config, &request).await
        }
        Command::List => print_json(&library(&config)?.list()?),
        Command::Metadata { path } => print_json(&library(&config)?.metadata(&path)?),
        Command::Toc { path } => print_json(&library(&config)?.toc(&path)?),
        Command::Chapter {
            path,
            chapter,
            title,
        } => cmd_chapter(&config, &path, chapter.as_deref(), title.as_deref()),
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            further_server::serve(&config).await?;
            Ok(())
        }
        Command::Mcp => {
            further_server::serve_mcp(&config).await?;
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Spinner on stderr that follows topic pipeline events.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl TopicProgress for CliProgress {
    fn event(&self, event: &TopicEvent) {
        match event {
            TopicEvent::Start { query, .. } => {
                self.spinner.set_message(format!("Searching catalogs for \"{query}\""));
            }
            TopicEvent::Book { index, book } => {
                let title = book.title.as_deref().unwrap_or("untitled");
                self.spinner
                    .set_message(format!("[{index}] Downloaded {title}"));
            }
            TopicEvent::Complete { count, .. } => {
                self.spinner
                    .finish_with_message(format!("Done: {count} book(s) downloaded"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn openlibrary_client(config: &AppConfig) -> Result<OpenLibraryClient> {
    Ok(OpenLibraryClient::new(
        build_client(config.catalogs.timeout_secs)?,
        &config.catalogs.openlibrary_base_url,
    ))
}

fn library(config: &AppConfig) -> Result<Library> {
    let library = Library::new(&config.library.root);
    library.ensure_root()?;
    Ok(library)
}

async fn cmd_discover(
    config: &AppConfig,
    query: &str,
    sources: &[String],
    limit: usize,
) -> Result<()> {
    info!(query, ?sources, limit, "discovering books");
    let pipeline = Pipeline::from_config(config)?;
    let batch = pipeline.catalogs().discover_books(query, sources, limit).await;
    print_json(&batch)
}

async fn cmd_topic(config: &AppConfig, request: &TopicRequest) -> Result<()> {
    info!(query = %request.query, "running topic pipeline");
    let pipeline = Pipeline::from_config(config)?;
    let reporter = CliProgress::new();

    let result = pipeline.run_topic_with_progress(request, &reporter).await;
    if result.is_err() {
        reporter.spinner.abandon();
    }
    print_json(&result?)
}

fn cmd_chapter(
    config: &AppConfig,
    path: &str,
    chapter: Option<&str>,
    title: Option<&str>,
) -> Result<()> {
    let library = library(config)?;
    match (chapter, title) {
        (Some(href), _) => {
            println!("{}", library.epub_chapter_markdown(path, href)?);
            Ok(())
        }
        (None, Some(title)) => print_json(&library.pdf_chapter_text(path, title)?),
        (None, None) => Err(eyre!("pass --chapter (EPUB) or --title (PDF)")),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
