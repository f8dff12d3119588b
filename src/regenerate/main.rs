// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use roadref::catalog::{CodeValueLookup, HttpCatalog};
use roadref::config::RoadRefConfig;
use roadref::models::FeatureTypeId;
use roadref::openlr::LocationReferenceBuilder;
use roadref::regeneration::{JsonLinesSink, RegenerationReport, Regenerator};
use roadref::roadnet::RoadNetCache;
use roadref::store::Store;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Export every feature of each type
    Full,
    /// Export features with pending change markers only
    Delta,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the sled database.
    #[arg(long, env = "ROADREF_STORE")]
    store: PathBuf,

    /// Feature types to regenerate (comma-separated).
    #[arg(long, env = "ROADREF_FEATURE_TYPES", value_delimiter = ',', required = true)]
    feature_type: Vec<FeatureTypeId>,

    #[arg(long, value_enum, default_value_t = Mode::Delta)]
    mode: Mode,

    /// JSON-lines output file.
    #[arg(long, env = "ROADREF_OUTPUT")]
    output: PathBuf,

    /// JSON file overriding the default domain rules.
    #[arg(long, env = "ROADREF_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the attribute catalog. The baked-in table is used without it.
    #[arg(long, env = "ROADREF_CATALOG_URL")]
    catalog_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) if path.exists() => RoadRefConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        _ => RoadRefConfig::default(),
    };

    let store = Store::open(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;

    let cache = Arc::new(RoadNetCache::new(store.clone(), config.clone()));
    let init_cache = cache.clone();
    tokio::task::spawn_blocking(move || init_cache.initialize())
        .await?
        .context("building road network")?;

    let catalog = args.catalog_url.as_deref().map(HttpCatalog::new).transpose()?;
    let lookup = CodeValueLookup::new(catalog);

    let output = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let sink = Arc::new(JsonLinesSink::new(BufWriter::new(output)));
    let builder = Arc::new(LocationReferenceBuilder::with_defaults(cache));

    let cycle = match args.mode {
        Mode::Delta => Some(
            Regenerator::new(store.clone(), builder.clone(), config.clone(), Default::default())
                .begin_delta_cycle()?,
        ),
        Mode::Full => None,
    };

    let mut reports: Vec<RegenerationReport> = Vec::new();
    for &feature_type in &args.feature_type {
        let code_values = lookup.code_value_map(feature_type).await;
        let regenerator = Regenerator::new(store.clone(), builder.clone(), config.clone(), code_values);
        let sink = sink.clone();
        let mode = args.mode;

        let report = tokio::task::spawn_blocking(move || match mode {
            Mode::Full => regenerator.run_full(feature_type, sink.as_ref()),
            Mode::Delta => regenerator.run_delta(feature_type, sink.as_ref()),
        })
        .await?
        .with_context(|| format!("regenerating feature type {feature_type}"))?;

        println!("{}", serde_json::to_string(&report)?);
        reports.push(report);
    }

    if let Some(cycle) = cycle {
        let regenerator = Regenerator::new(store.clone(), builder, config, Default::default());
        if regenerator.complete_delta_cycle(&cycle, &reports)? {
            info!("Cleared dirty sequence markers");
        }
    }

    store.flush()?;
    Ok(())
}
