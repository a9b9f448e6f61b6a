//! Loader - Operator CLI for bulk loads
//!
//! Responsibilities:
//! - Create the tables and seed sample categories/products
//! - Write sample product files (valid, or with one error per rule)
//! - Stage a local file and preview or commit it, same pipeline as the API
//!
//! Usage:
//!   # Prepare the database:
//!   cargo run --bin loader -- --init-db
//!
//!   # Write a template:
//!   cargo run --bin loader -- --template plantillas/productos.csv [--with-errors]
//!
//!   # Preview, then load:
//!   cargo run --bin loader -- --entity productos --file plantillas/productos.csv --dry-run
//!   cargo run --bin loader -- --entity productos --file plantillas/productos.csv

mod template;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ingest::{
    storage, CommitReport, Config, EntityRegistry, EntityType, Ingestor, PgStore, Preview,
    RowMarker,
};
use tokio::fs;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loader", about = "Stages, previews and commits bulk load files")]
struct Args {
    /// Create tables if missing and insert sample data
    #[arg(long, default_value = "false")]
    init_db: bool,

    /// Write a sample product CSV to this path
    #[arg(long)]
    template: Option<PathBuf>,

    /// Make the template contain one error per validation rule
    #[arg(long, default_value = "false")]
    with_errors: bool,

    /// Entity type of the file (productos)
    #[arg(long, default_value = "productos")]
    entity: String,

    /// CSV/XLS/XLSX file to load
    #[arg(long)]
    file: Option<PathBuf>,

    /// Preview only - don't write to the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Print the preview/commit result as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

async fn connect(config: &Config) -> Result<PgStore> {
    let db_url = config.require_db_url()?;
    PgStore::connect(db_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")
}

async fn write_template(path: &Path, with_errors: bool) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let mut buf = Vec::new();
    let rows = template::write_product_template(&mut buf, with_errors)?;
    fs::write(path, buf)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  ✓ Template written: {} ({} rows)", path.display(), rows);
    Ok(())
}

async fn init_db(config: &Config) -> Result<()> {
    let store = connect(config).await?;
    store.ensure_schema().await.context("Failed to create tables")?;
    println!("  ✓ Tables ready");
    let (categories, products) = store.seed_samples().await.context("Failed to seed samples")?;
    println!("  ✓ Seeded {} categories, {} products", categories, products);
    Ok(())
}

fn print_preview(preview: &Preview) {
    println!("\n=== Preview ({} rows) ===", preview.row_count());
    for row in &preview.rows {
        match row.row {
            RowMarker::Row(n) => println!("  ✗ Row {}: {}", n, row.error),
            _ => println!("  ✓ {}", row.data.text("codigo")),
        }
    }
    if preview.has_errors {
        println!("\nFix the rows marked ✗ before committing.");
    }
}

fn print_report(report: &CommitReport) {
    let s = &report.summary;
    println!("\n=== Load Summary ===");
    println!("Total rows: {}", s.total_rows);
    println!("Created: {}", s.created);
    println!("Updated: {}", s.updated);
    println!("Skipped duplicates: {}", s.skipped_duplicates);
    println!("Errored: {}", s.errored);
    for error in &report.errors {
        match error.row {
            RowMarker::Row(n) => eprintln!("  ✗ Row {}: {}", n, error.error),
            _ => eprintln!("  ✗ {}", error.error),
        }
    }
    println!("\n{}", report.message);
}

async fn load_file(config: &Config, args: &Args, path: &Path) -> Result<()> {
    let entity: EntityType = args.entity.parse()?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("File path has no filename")?;
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    println!("Entity: {}", entity);
    println!("File: {} ({} bytes)", path.display(), bytes.len());

    let ingestor = Ingestor::new(
        storage::from_config(config),
        Arc::new(connect(config).await?),
        EntityRegistry::with_defaults(),
        config.max_file_size,
    );

    let session = ingestor.upload(entity, &filename, &bytes).await?;
    println!("  ✓ Staged: {}", session.carga_id);
    let carga_id = session.carga_id.to_string();

    if args.dry_run {
        let preview = ingestor.render(entity, &carga_id, &filename).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        } else {
            print_preview(&preview);
        }
    } else {
        let report = ingestor.commit(entity, &carga_id, &filename).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    println!("=== Carga Masiva Loader ===");

    if args.template.is_none() && !args.init_db && args.file.is_none() {
        anyhow::bail!(
            "Must specify at least one of:\n  \
             --init-db to create tables and sample data\n  \
             --template <path> [--with-errors] to write a sample file\n  \
             --file <path> [--entity productos] [--dry-run] to load a file"
        );
    }

    if let Some(path) = &args.template {
        write_template(path, args.with_errors).await?;
    }

    if args.init_db {
        init_db(&config).await?;
    }

    if let Some(path) = &args.file {
        load_file(&config, &args, path).await?;
    }

    Ok(())
}
