//! Legacy-product harmonizer CLI.
//!
//! Converts legacy satellite products (SAFE packages, GRIB deliveries,
//! packed telemetry) into harmonized chunked-array stores driven by
//! JSON mapping documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use eo_accessors::AccessorRegistry;
use eo_common::{DirListing, FileListing};
use eo_mapping::MappingEngine;
use eo_model::Product;
use eo_store::{OpenMode, ZarrStore};

#[derive(Parser, Debug)]
#[command(name = "harmonizer")]
#[command(about = "Convert legacy satellite products into a harmonized store")]
struct Args {
    /// Directory holding mapping documents (*.json)
    #[arg(short, long, env = "HARMONIZER_MAPPINGS", default_value = "mappings")]
    mappings: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a legacy product and persist the harmonized tree
    Convert {
        /// Legacy product directory
        product: PathBuf,

        /// Output store path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show which mapping document recognizes a product and what it declares
    Info {
        /// Legacy product directory
        product: PathBuf,
    },
    /// Check the mandatory structure of an existing harmonized store
    Validate {
        /// Harmonized store path
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Convert { product, output } => convert(&args.mappings, &product, &output),
        Command::Info { product } => info_cmd(&args.mappings, &product),
        Command::Validate { store } => validate(&store),
    }
}

fn load_engine(mappings: &Path) -> Result<MappingEngine> {
    let mut engine = MappingEngine::new(AccessorRegistry::with_defaults());
    let loaded = engine
        .load_directory(mappings)
        .with_context(|| format!("loading mapping documents from {}", mappings.display()))?;
    if loaded == 0 {
        bail!("no mapping documents found in {}", mappings.display());
    }
    info!(count = loaded, "loaded mapping documents");
    Ok(engine)
}

fn convert(mappings: &Path, product_dir: &Path, output: &Path) -> Result<()> {
    if output.exists() {
        bail!("output {} already exists", output.display());
    }
    let mut engine = load_engine(mappings)?;
    let listing = DirListing::new(product_dir)?;

    let (mut product, report) = engine
        .convert(&listing)
        .with_context(|| format!("converting {}", product_dir.display()))?;
    product.validate()?;

    // write to a scratch sibling; only a fully populated product is
    // published under the requested name
    let partial = partial_path(output)?;
    let mut write = || -> Result<()> {
        product.open(Box::new(ZarrStore::new(&partial)), OpenMode::NewProduct)?;
        product.write()?;
        product.close()?;
        Ok(())
    };
    if let Err(err) = write() {
        let _ = fs::remove_dir_all(&partial);
        return Err(err.context("persisting harmonized product"));
    }
    fs::rename(&partial, output)
        .with_context(|| format!("publishing store at {}", output.display()))?;

    info!(
        document = %report.document,
        applied = report.entries_applied,
        skipped = report.skipped.len(),
        output = %output.display(),
        "conversion complete"
    );
    for skip in &report.skipped {
        println!("skipped optional {}: {}", skip.target_path, skip.reason);
    }
    println!(
        "{} -> {} ({} entries, {} skipped)",
        listing.name(),
        output.display(),
        report.entries_applied,
        report.skipped.len()
    );
    Ok(())
}

fn partial_path(output: &Path) -> Result<PathBuf> {
    let name = output
        .file_name()
        .with_context(|| format!("output path {} has no file name", output.display()))?;
    let mut partial = name.to_os_string();
    partial.push(".partial");
    Ok(output.with_file_name(partial))
}

fn info_cmd(mappings: &Path, product_dir: &Path) -> Result<()> {
    let engine = load_engine(mappings)?;
    let listing = DirListing::new(product_dir)?;
    let document = engine.recognize(listing.name())?;

    println!("product:  {}", listing.name());
    println!("document: {}", document.label());
    if let Some(version) = &document.recognition.version {
        println!("version:  {version}");
    }
    println!("entries:  {}", document.data_mapping.len());
    for entry in &document.data_mapping {
        let target = if entry.target_path.is_empty() {
            "<root attributes>"
        } else {
            &entry.target_path
        };
        let optional = if entry.is_optional { " (optional)" } else { "" };
        println!("  [{}] {}{}", entry.item_format, target, optional);
    }
    Ok(())
}

fn validate(store_path: &Path) -> Result<()> {
    let mut product = Product::new(
        store_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    product.open(Box::new(ZarrStore::new(store_path)), OpenMode::ReadOnly)?;
    product.fetch_structure()?;
    product.validate()?;
    product.close()?;
    println!("{}: valid harmonized product", store_path.display());
    Ok(())
}
