//! CLI commands implementation.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use console::style;

use folio::config::{load_settings_with_options, LoadOptions, RendererKind, Settings};
use folio::storage::{ObjectStorageProbe, StorageRef};
use folio_analysis::ocr::{Granularity, PopplerRenderer};
use folio_analysis::services::{ExtractionParams, LocalDocumentHost, OperationKind};

use super::helpers::{build_operation, build_probe};

/// Property written when `--field` is not given.
const DEFAULT_TARGET_FIELD: &str = "folio:text";

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Extract text from multi-page documents with a remote analysis provider")]
#[command(version)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON). Discovered automatically when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Detect plain text in a document
    Detect {
        #[command(flatten)]
        target: ExtractArgs,
    },

    /// Analyze a document (tables, forms, ...) and extract its text
    Analyze {
        #[command(flatten)]
        target: ExtractArgs,
        /// Comma-separated features (default: TABLES,FORMS)
        #[arg(short, long)]
        features: Option<String>,
    },

    /// Show renderer, storage and provider configuration
    Check,
}

#[derive(Args)]
struct ExtractArgs {
    /// Document to process
    file: PathBuf,
    /// WORD or LINE
    #[arg(short, long, default_value_t = Granularity::default())]
    granularity: Granularity,
    /// Output the provider JSON instead of extracted text
    #[arg(long)]
    raw: bool,
    /// Property the result is written to
    #[arg(long, default_value = DEFAULT_TARGET_FIELD)]
    field: String,
    /// Persist the result next to the file (<FILE>.folio.json)
    #[arg(long)]
    save: bool,
    /// S3 key of the same content, to let the provider read it from the bucket
    #[arg(long)]
    s3_key: Option<String>,
    /// Bucket holding `--s3-key` when it is not the configured one
    #[arg(long, requires = "s3_key")]
    s3_bucket: Option<String>,
}

/// Remote location of the file given on the command line, if any.
fn storage_ref(args: &ExtractArgs) -> Option<StorageRef> {
    let storage = StorageRef::s3(args.s3_key.as_deref()?);
    Some(match &args.s3_bucket {
        Some(bucket) => storage.with_bucket(bucket),
        None => storage,
    })
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_settings_with_options(&LoadOptions {
        config_path: cli.config,
    })
    .await?;

    match cli.command {
        Commands::Detect { target } => {
            cmd_extract(&settings, target, OperationKind::Detect, None).await
        }
        Commands::Analyze { target, features } => {
            cmd_extract(&settings, target, OperationKind::Analyze, features).await
        }
        Commands::Check => cmd_check(&settings),
    }
}

async fn cmd_extract(
    settings: &Settings,
    args: ExtractArgs,
    kind: OperationKind,
    features: Option<String>,
) -> anyhow::Result<()> {
    let operation = build_operation(settings)?;
    let mut host = LocalDocumentHost::new();
    let document = host.open(&args.file, storage_ref(&args)).await?;

    let mut params = ExtractionParams::new(kind, args.field.clone());
    params.features = features;
    params.granularity = args.granularity;
    params.raw = args.raw;
    params.save = args.save;

    let document = operation
        .run(&mut host, document, &params)
        .await?;

    if let Some(value) = document.property(&args.field).and_then(|v| v.as_str()) {
        println!("{}", value);
    }
    if args.save {
        eprintln!(
            "{} Saved {} to {}",
            style("✓").green(),
            args.field,
            LocalDocumentHost::sidecar_path(&args.file).display()
        );
    }
    Ok(())
}

fn status(ok: bool, yes: &str, no: &str) -> String {
    if ok {
        style(format!("✓ {}", yes)).green().to_string()
    } else {
        style(format!("✗ {}", no)).red().to_string()
    }
}

fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("folio status").bold());
    println!("{}", "-".repeat(50));

    let config_source = settings
        .source_path
        .as_deref()
        .map(Path::display)
        .map(|p| p.to_string())
        .unwrap_or_else(|| "defaults + environment".to_string());
    println!("  {:<15} {}", "Config", config_source);

    println!("\n{}", style("Page renderer:").cyan());
    match settings.analysis.renderer {
        RendererKind::Lopdf => println!("  {:<15} {}", "lopdf", status(true, "built in", "")),
        RendererKind::Poppler => {
            let poppler = PopplerRenderer::new();
            println!(
                "  {:<15} {}",
                "poppler",
                status(poppler.is_available(), "found", "not found")
            );
            if !poppler.is_available() {
                println!(
                    "                  {}",
                    style("Install poppler-utils (apt install poppler-utils)").dim()
                );
            }
        }
    }
    println!(
        "  {:<15} {} ({:?})",
        "Dispatch",
        settings.analysis.dispatch_concurrency,
        settings.analysis.page_join
    );

    println!("\n{}", style("Object storage:").cyan());
    let probe = build_probe(settings);
    println!(
        "  {:<15} {}",
        "S3",
        status(probe.is_available(), "available", "unavailable (bytes are sent)")
    );
    match settings.storage.location() {
        Some(location) => println!(
            "  {:<15} s3://{}/{}",
            "Location",
            location.bucket,
            location.prefix()
        ),
        None => println!("  {:<15} {}", "Location", style("no bucket configured").dim()),
    }

    println!("\n{}", style("Provider:").cyan());
    let endpoint = settings.provider.endpoint_url();
    println!(
        "  {:<15} {}",
        "Endpoint",
        match &endpoint {
            Ok(url) => url.to_string(),
            Err(e) => style(e.to_string()).red().to_string(),
        }
    );
    println!("  {:<15} {}s", "Timeout", settings.provider.timeout_secs);
    println!();

    endpoint?;
    Ok(())
}
