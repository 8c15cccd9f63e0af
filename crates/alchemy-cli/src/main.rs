mod config;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alchemy_engine::{Engine, HttpGateway, MemoryCache, ResultCache};
use alchemy_store::{ElementQuery, Store};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "alchemy", about = "Daily Alchemy combination engine server and admin CLI")]
struct Cli {
    /// Config file (defaults to ALCHEMY_CONFIG, then <data dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Combine two elements
    Combine { a: String, b: String },

    /// Show one element's recipes and uses
    Element { name: String },

    /// List known elements
    Elements {
        /// Only names starting with this letter
        #[arg(long)]
        letter: Option<String>,

        /// Only names containing this text
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Rename an element everywhere it appears
    Rename {
        old: String,
        new: String,

        /// Also set the element's canonical glyph
        #[arg(long)]
        glyph: Option<String>,
    },

    /// Change an element's canonical glyph
    Reglyph { name: String, glyph: String },

    /// Delete every combination involving an element
    Delete { name: String },

    /// Show store statistics
    Stats,

    /// Export all combinations to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import combinations from a JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_store(config: &Config) -> Result<Store> {
    let path = config.store_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Store::open(&path).with_context(|| format!("failed to open store {}", path.display()))
}

fn build_engine(config: &Config) -> Result<Engine> {
    let store = open_store(config)?;
    let gateway = Arc::new(HttpGateway::new(&config.model));
    let cache = config.cache.enabled.then(|| {
        Arc::new(MemoryCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_secs),
        )) as Arc<dyn ResultCache>
    });
    Ok(Engine::new(store, gateway, config.engine_config()).with_cache(cache))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Serve { bind } => cmd_serve(config, bind.as_deref()).await,
        Commands::Combine { a, b } => cmd_combine(&config, a, b).await,
        Commands::Element { name } => cmd_element(&config, name).await,
        Commands::Elements {
            letter,
            search,
            page,
            limit,
        } => {
            let query = ElementQuery {
                letter: letter.clone(),
                search: search.clone(),
                page: *page,
                limit: *limit,
            };
            cmd_elements(&config, &query).await
        }
        Commands::Rename { old, new, glyph } => {
            let engine = build_engine(&config)?;
            let change = engine.rename_element(old, new, glyph.as_deref()).await?;
            println!(
                "renamed {old} → {new}: {} updated, {} merged",
                change.rows_updated, change.rows_merged
            );
            Ok(())
        }
        Commands::Reglyph { name, glyph } => {
            let engine = build_engine(&config)?;
            let change = engine.reglyph_element(name, glyph).await?;
            println!("reglyphed {name} → {glyph}: {} updated", change.rows_updated);
            Ok(())
        }
        Commands::Delete { name } => {
            let engine = build_engine(&config)?;
            let change = engine.delete_element(name).await?;
            println!("deleted {name}: {} rows removed", change.rows_deleted);
            Ok(())
        }
        Commands::Stats => cmd_stats(&config).await,
        Commands::Export { path } => cmd_export(&config, path),
        Commands::Import { path } => cmd_import(&config, path),
    }
}

async fn cmd_serve(config: Config, bind: Option<&str>) -> Result<()> {
    let engine = Arc::new(build_engine(&config)?);
    let mut server_config = config.server.clone();
    if let Some(bind) = bind {
        server_config.bind = bind.to_string();
    }
    let state = server::AppState::new(engine, config.auth.clone());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        trigger.cancel();
    });

    server::serve(state, &server_config, shutdown).await
}

async fn cmd_combine(config: &Config, a: &str, b: &str) -> Result<()> {
    let engine = build_engine(config)?;
    let outcome = engine.combine(a, b, None).await?;
    let marker = if outcome.is_new { " (new)" } else { "" };
    println!(
        "{a} + {b} = {} {}{marker}",
        outcome.result_glyph, outcome.result_name
    );
    Ok(())
}

async fn cmd_element(config: &Config, name: &str) -> Result<()> {
    let engine = build_engine(config)?;
    let detail = engine.element_detail(name).await?;
    print_json(&detail)
}

async fn cmd_elements(config: &Config, query: &ElementQuery) -> Result<()> {
    let engine = build_engine(config)?;
    let page = engine.list_elements(query).await?;
    for element in &page.elements {
        let glyph = element.glyph.as_deref().unwrap_or(" ");
        let starter = if element.is_starter { "  (starter)" } else { "" };
        println!("{glyph} {}{starter}", element.name);
    }
    println!(
        "page {} · {} of {} elements{}",
        page.page,
        page.elements.len(),
        page.total,
        if page.has_more { " · more" } else { "" }
    );
    Ok(())
}

async fn cmd_stats(config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let stats = engine.stats().await?;

    println!("store:        {}", config.store_path().display());
    println!("combinations: {}", stats.combinations);
    println!("elements:     {}", stats.elements);
    println!("total uses:   {}", stats.total_uses);
    for (origin, count) in &stats.by_origin {
        println!("  {origin:<20} {count}");
    }
    Ok(())
}

fn cmd_export(config: &Config, path: &Path) -> Result<()> {
    let store = open_store(config)?;
    store
        .export_json_file(path)
        .context("failed to export JSON")?;
    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(config: &Config, path: &Path) -> Result<()> {
    let store = open_store(config)?;
    let report = store
        .import_json_file(path)
        .context("failed to import JSON")?;
    println!(
        "imported from {}: {} inserted, {} skipped, {} rejected",
        path.display(),
        report.inserted,
        report.skipped,
        report.rejected
    );
    Ok(())
}
