//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use tabdivider_core::{
    BroadcastHub, Broadcaster, CompressTarget, Divider, DividerEvent, Dividers, EventKind,
    FilterRegistry, MemoryHost, QueryStatus, Viewer,
};
use tabdivider_shared::{
    AppConfig, DividerSettings, ExpandCheck, init_config, load_config, resolve_path,
};
use tabdivider_storage::{SqlStore, TypedStore};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tabdivider: park open pages in named dividers and bring them back later.
#[derive(Parser)]
#[command(
    name = "tabdivider",
    version,
    about = "Park open pages in named dividers and bring them back later.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Divider database (overrides `defaults.database` from the config file).
    #[arg(long, env = "TABDIVIDER_DB", global = true)]
    pub db: Option<PathBuf>,

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
    /// List dividers in display order.
    List,

    /// Create a divider (a name is generated when omitted).
    Create {
        name: Option<String>,
    },

    /// Rename a divider.
    Rename {
        name: String,
        new_name: String,
    },

    /// Delete a divider and its pages.
    Delete {
        name: String,
    },

    /// Move a divider to a new position.
    Move {
        name: String,
        index: usize,
    },

    /// Show the pages of a divider.
    Pages {
        name: String,

        /// Filter query, e.g. `rust`, `:url docs.rs`, `:regex ^t`.
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Save a page at the front of a divider.
    Add {
        name: String,
        url: String,

        /// Page title (defaults to the url).
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Take pages out of a divider and print their urls.
    Expand {
        name: String,

        /// Page indices, as shown by `pages`.
        #[arg(required = true)]
        indices: Vec<usize>,

        /// Skip the confirmation threshold.
        #[arg(short, long)]
        yes: bool,
    },

    /// Move a page within a divider.
    MovePage {
        name: String,
        from: usize,
        to: usize,
    },

    /// Print every page of a divider using the export page rule.
    ExportUrls {
        name: String,
    },

    /// Export every stored key as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import keys from a JSON export (merged into the store).
    Import {
        file: PathBuf,
    },

    /// Report registry entries and keys that do not line up.
    Audit,

    /// List available query filters.
    Filters,

    /// Configuration management.
    Config {
        /// Config subcommand.
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
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tabdivider=info",
        1 => "tabdivider=debug",
        _ => "tabdivider=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
// Session
// ---------------------------------------------------------------------------

/// Everything a command needs, opened once per invocation.
struct Session {
    dividers: Dividers,
    host: Arc<MemoryHost>,
    // Keeps the transport open for the lifetime of the command
    _hub: BroadcastHub,
}

impl Session {
    async fn open(db: Option<&Path>, readonly: bool) -> Result<Self> {
        let config = load_config()?;
        let path = match db {
            Some(path) => path.to_path_buf(),
            None => resolve_path(&config.defaults.database)?,
        };

        let store = if readonly && path.exists() {
            SqlStore::open_readonly(&path).await?
        } else {
            SqlStore::open(&path).await?
        };
        info!(path = %path.display(), readonly, "opened divider database");

        let hub = BroadcastHub::new(config.broadcast.capacity);
        let host = Arc::new(MemoryHost::new());
        let dividers = Dividers::new(
            TypedStore::new(Arc::new(store)),
            host.clone(),
            hub.connect(),
            DividerSettings::from(&config),
        );
        Ok(Self {
            dividers,
            host,
            _hub: hub,
        })
    }

    /// Handle for an existing divider, with its events logged.
    async fn divider(&self, name: &str) -> Result<Divider> {
        if !self.dividers.contains(name).await? {
            return Err(eyre!("no divider named '{name}'"));
        }
        log_events(self.dividers.broadcaster(), name);
        Ok(self.dividers.get(name))
    }
}

/// Log every event published about `name`.
fn log_events(broadcaster: &Broadcaster, name: &str) {
    for kind in EventKind::ALL {
        let target = name.to_string();
        broadcaster.on(name, kind, move |event| match event {
            DividerEvent::PagesChanged(pages) => {
                info!(divider = %target, pages = pages.len(), "pages changed");
            }
            DividerEvent::Rename { old_name, new_name } => {
                info!(%old_name, %new_name, "divider renamed");
            }
            DividerEvent::IndexChanged {
                old_index,
                new_index,
            } => {
                info!(divider = %target, old_index, new_index, "divider moved");
            }
            DividerEvent::Delete { index } => {
                info!(divider = %target, index, "divider deleted");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db.as_deref();
    match cli.command {
        Command::List => cmd_list(&Session::open(db, true).await?).await,
        Command::Create { name } => cmd_create(&Session::open(db, false).await?, name.as_deref()).await,
        Command::Rename { name, new_name } => {
            cmd_rename(&Session::open(db, false).await?, &name, &new_name).await
        }
        Command::Delete { name } => cmd_delete(&Session::open(db, false).await?, &name).await,
        Command::Move { name, index } => {
            cmd_move(&Session::open(db, false).await?, &name, index).await
        }
        Command::Pages { name, query } => {
            cmd_pages(&Session::open(db, true).await?, &name, query.as_deref()).await
        }
        Command::Add { name, url, title } => {
            cmd_add(&Session::open(db, false).await?, &name, &url, title.as_deref()).await
        }
        Command::Expand { name, indices, yes } => {
            cmd_expand(&Session::open(db, false).await?, &name, &indices, yes).await
        }
        Command::MovePage { name, from, to } => {
            cmd_move_page(&Session::open(db, false).await?, &name, from, to).await
        }
        Command::ExportUrls { name } => {
            cmd_export_urls(&Session::open(db, true).await?, &name).await
        }
        Command::Export { out } => cmd_export(&Session::open(db, true).await?, out.as_deref()).await,
        Command::Import { file } => cmd_import(&Session::open(db, false).await?, &file).await,
        Command::Audit => cmd_audit(&Session::open(db, true).await?).await,
        Command::Filters => cmd_filters(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_list(session: &Session) -> Result<()> {
    let dividers = session.dividers.all().await?;
    if dividers.is_empty() {
        println!("No dividers yet. Create one with `tabdivider create <name>`.");
        return Ok(());
    }
    for (index, divider) in dividers.iter().enumerate() {
        let count = divider.pages().await?.len();
        println!("  {index:>3}  {:<30} {count} page(s)", divider.name());
    }
    Ok(())
}

async fn cmd_create(session: &Session, name: Option<&str>) -> Result<()> {
    let existed = match name {
        Some(name) => session.dividers.contains(name).await?,
        None => false,
    };
    let divider = session.dividers.create(name).await?;
    if existed {
        println!("Divider '{}' already exists", divider.name());
    } else {
        println!("Created divider '{}'", divider.name());
    }
    Ok(())
}

async fn cmd_rename(session: &Session, name: &str, new_name: &str) -> Result<()> {
    let mut divider = session.divider(name).await?;
    if !divider.rename(new_name).await? {
        return Err(eyre!(
            "cannot rename '{name}' to '{new_name}': the new name is empty, unchanged or taken"
        ));
    }
    println!("Renamed '{name}' to '{}'", divider.name());
    Ok(())
}

async fn cmd_delete(session: &Session, name: &str) -> Result<()> {
    let divider = session.divider(name).await?;
    let pages = divider.pages().await?.len();
    divider.delete().await?;
    println!("Deleted divider '{name}' ({pages} page(s))");
    Ok(())
}

async fn cmd_move(session: &Session, name: &str, index: usize) -> Result<()> {
    let divider = session.divider(name).await?;
    if !divider.set_index(index).await? {
        let count = session.dividers.names().await?.len();
        return Err(eyre!("index {index} is out of range (0..{count})"));
    }
    println!("Moved '{name}' to position {index}");
    Ok(())
}

async fn cmd_pages(session: &Session, name: &str, query: Option<&str>) -> Result<()> {
    session.divider(name).await?;
    let viewer = Viewer::open(
        session.dividers.clone(),
        Arc::new(FilterRegistry::new()),
        name,
    )
    .await?;

    if let Some(query) = query {
        if viewer.set_query(query) == QueryStatus::Failed {
            let reason = viewer
                .filters()
                .apply(query, &viewer.pages())
                .error
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(eyre!("query failed: {reason}"));
        }
    }

    let outcome = viewer.outcome();
    if outcome.indices.is_empty() {
        println!("No pages.");
        return Ok(());
    }
    for index in &outcome.indices {
        if let Some(page) = outcome.display.get(*index) {
            println!("  {index:>3}  {}", page.title);
            println!("       {}", page.url);
        }
    }
    Ok(())
}

async fn cmd_add(session: &Session, name: &str, url: &str, title: Option<&str>) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let divider = session.divider(name).await?;

    let document = session
        .host
        .open(title.unwrap_or(parsed.as_str()), parsed.as_str());
    divider
        .compress(CompressTarget::Document(document))
        .await?;

    println!("Added {parsed} to '{name}'");
    Ok(())
}

async fn cmd_expand(session: &Session, name: &str, indices: &[usize], yes: bool) -> Result<()> {
    let divider = session.divider(name).await?;
    let count = expandable(indices, divider.pages().await?.len());
    if count == 0 {
        return Err(eyre!("no page matched the given indices"));
    }

    match session.dividers.settings().check_expand(count) {
        ExpandCheck::Allowed => {}
        ExpandCheck::Confirm { count } if yes => {
            info!(count, "expand confirmed by flag");
        }
        ExpandCheck::Confirm { count } => {
            return Err(eyre!(
                "expanding {count} pages needs confirmation; pass --yes to proceed"
            ));
        }
        ExpandCheck::OverLimit { count, limit } => {
            return Err(eyre!("expanding {count} pages exceeds the limit of {limit}"));
        }
    }

    let removed = divider.expand(indices).await?;
    if removed.is_empty() {
        return Err(eyre!("no page matched the given indices"));
    }
    for page in &removed {
        println!("{}", page.url);
    }
    Ok(())
}

/// How many pages `indices` would take out: distinct and in range.
fn expandable(indices: &[usize], len: usize) -> usize {
    indices
        .iter()
        .filter(|&&index| index < len)
        .collect::<BTreeSet<_>>()
        .len()
}

async fn cmd_move_page(session: &Session, name: &str, from: usize, to: usize) -> Result<()> {
    let divider = session.divider(name).await?;
    if !divider.move_page(from, to).await? {
        let count = divider.pages().await?.len();
        return Err(eyre!("page index out of range (0..{count})"));
    }
    println!("Moved page {from} to {to} in '{name}'");
    Ok(())
}

async fn cmd_export_urls(session: &Session, name: &str) -> Result<()> {
    let divider = session.divider(name).await?;
    print!("{}", divider.export_urls().await?);
    Ok(())
}

async fn cmd_export(session: &Session, out: Option<&Path>) -> Result<()> {
    let json = session.dividers.export_config().await?;
    match out {
        Some(path) => {
            std::fs::write(path, &json)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn cmd_import(session: &Session, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let written = session.dividers.import_config(&json).await?;
    println!("Imported {written} key(s) from {}", file.display());
    Ok(())
}

async fn cmd_audit(session: &Session) -> Result<()> {
    let audit = session.dividers.store().audit().await?;
    if audit.is_clean() {
        println!("Store is consistent.");
        return Ok(());
    }
    for name in &audit.duplicate_names {
        println!("  duplicate name:    {name}");
    }
    for key in &audit.orphaned_keys {
        println!("  orphaned key:      {key}");
    }
    for name in &audit.missing_pages {
        println!("  missing pages key: {name}");
    }
    Ok(())
}

fn cmd_filters() -> Result<()> {
    let registry = FilterRegistry::new();
    for filter in registry.filters() {
        let aliases: Vec<String> = filter
            .aliases()
            .iter()
            .map(|a| if a.is_empty() { "(default)".to_string() } else { format!(":{a}") })
            .collect();
        println!("  {:<8} {}", filter.name(), filter.description());
        println!("           {}", aliases.join(", "));
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
