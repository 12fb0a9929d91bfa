use miette::{Context, IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use quire_common::assets::{CaptureOptions, HttpAssetStore, KrokiRenderer, SnapshotRasterizer};
use quire_common::config::FileStore;
use quire_common::docs::GoogleDocsClient;
use quire_common::telemetry::{self, TelemetryConfig};
use quire_common::{Config, TableStrategy};
use quire_compiler::{AssetResolver, DocumentCompiler, LogProgress, TableOutcome};

#[derive(Parser)]
#[command(version, about = "Quire - export markdown into rich-text documents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "QUIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a markdown file into a new remote document
    Export {
        /// Markdown file to export
        source: PathBuf,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Render tables as images instead of native tables
        #[arg(long)]
        table_images: bool,

        /// Fail the export when any table cannot be completed
        #[arg(long)]
        strict_tables: bool,
    },
    /// Print the first request batch as JSON without contacting any service
    Check {
        /// Markdown file to compile
        source: PathBuf,
    },
    /// Write a config file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env("quire");
    if cli.verbose {
        telemetry_config = telemetry_config.with_level(tracing::Level::DEBUG);
    }
    telemetry::init(telemetry_config);

    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Export {
            source,
            title,
            table_images,
            strict_tables,
        } => {
            let mut config = load_config(&config_path).await?;
            if table_images {
                config.export.table_strategy = TableStrategy::Image;
            }
            config.export.strict_tables |= strict_tables;
            let title = title.unwrap_or_else(|| title_from_path(&source));
            export(&source, &title, config).await?;
        }
        Commands::Check { source } => {
            let config = load_config(&config_path).await?;
            check(&source, &config).await?;
        }
        Commands::InitConfig { force } => {
            init_config(&config_path, force).await?;
        }
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quire")
        .join("config.toml")
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_owned())
}

/// Load the config file if there is one, then apply environment overrides.
async fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(&FileStore::new(path))
            .await
            .wrap_err_with(|| format!("loading {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };
    Ok(config.with_env_overrides())
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))
}

async fn export(source: &Path, title: &str, config: Config) -> Result<()> {
    let markdown = read_source(source).await?;

    let service = GoogleDocsClient::from_config(&config)?;
    let resolver = AssetResolver::new(
        KrokiRenderer::new(config.renderer.endpoint.clone()),
        SnapshotRasterizer,
        HttpAssetStore::new(&config.asset_store),
    )
    .with_capture(CaptureOptions::from(&config.renderer))
    .with_theme(config.renderer.theme.clone());

    let compiler =
        DocumentCompiler::new(service, resolver, config.export).with_progress(LogProgress);
    let report = compiler.compile_and_export(&markdown, title).await?;

    println!("Exported {} as document {}", source.display(), report.document_id);
    if let TableOutcome::Complete { tables } = report.tables {
        println!("{tables} table(s) written");
    }
    if report.is_degraded() {
        println!("{} element(s) could not be exported:", report.degraded);
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

async fn check(source: &Path, config: &Config) -> Result<()> {
    let markdown = read_source(source).await?;
    let run = quire_compiler::dry_run(&markdown, &config.export)?;
    let json = serde_json::to_string_pretty(&run.requests).into_diagnostic()?;
    println!("{json}");
    eprintln!(
        "{} request(s), {} table(s) pending, document ends at {}",
        run.requests.len(),
        run.tables,
        run.end_index
    );
    Ok(())
}

async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(miette::miette!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        ));
    }
    Config::default().save(&FileStore::new(path)).await?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
