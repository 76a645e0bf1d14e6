//! cardscan - identify trading cards from camera frames or photos
//!
//! Command line front end for the recognition pipeline: look cards up by
//! name or id, scan a photo, test name extraction and manage the cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardscan::capture::{
    CapturedFrame, PixelRect, RasterSample, SharedFrameSource, StillFrameSource,
};
use cardscan::catalog::{DurableCache, LookupOrchestrator, ScryfallClient};
use cardscan::config::{self, AppConfig, CONFIG_FILE};
use cardscan::scanner::{CardPipeline, ScanEvent, ScanHandle, ScanSession};
use cardscan::storage::{self, SqliteCacheStore};
use cardscan::text::{extract_card_name, normalize_name};
use cardscan::vision::{
    EnhanceInput, EnhanceOptions, EnhancementStage, RecognitionInvoker, TesseractFactory,
};

/// cardscan - trading card recognition and catalog lookup
#[derive(Parser, Debug)]
#[command(name = "cardscan")]
#[command(about = "Identify trading cards by name and look them up on Scryfall")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look a card up by (possibly misspelled) name
    Lookup {
        /// Card name
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    /// Look a card up by catalog id
    Id { id: String },
    /// Recognize and look up the card in a photo
    Scan {
        image: PathBuf,
        /// The image is already cropped to the card
        #[arg(long)]
        card: bool,
        /// Recognize only the name line instead of the whole card
        #[arg(long)]
        name_only: bool,
    },
    /// Replay photos as a camera feed through a scan session
    Watch {
        #[arg(required = true, num_args = 1..)]
        frames: Vec<PathBuf>,
        /// How long each photo stays in front of the camera
        #[arg(long, default_value_t = 3000)]
        hold_ms: u64,
    },
    /// Extract the candidate name from recognizer text
    Extract {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Empty both lookup cache tiers
    ClearCache,
    /// Show the configuration
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::get_config_dir()?.join(CONFIG_FILE),
    };
    let config = config::load_or_default(&config_path);

    match args.command {
        Command::Lookup { name } => {
            let lookup = build_lookup(&config)?;
            print_json(&lookup.lookup(&name.join(" ")).await)?;
        }
        Command::Id { id } => {
            let lookup = build_lookup(&config)?;
            print_json(&lookup.lookup_by_id(&id).await)?;
        }
        Command::Scan {
            image,
            card,
            name_only,
        } => {
            let source = StillFrameSource::open(&image)
                .with_context(|| format!("Failed to open {}", image.display()))?;
            let pipeline = build_pipeline(&config, name_only)?;

            let (width, height) = source.image().dimensions();
            let whole = RasterSample::new(
                source.image().clone(),
                PixelRect::new(0, 0, width, height),
            );
            let input = if card {
                EnhanceInput::Card(&whole)
            } else {
                EnhanceInput::Frame(source.image())
            };
            let outcome = pipeline.process(input).await;
            pipeline.recognizer().terminate().await;
            print_json(&outcome)?;
        }
        Command::Watch { frames, hold_ms } => {
            watch(&config, &frames, Duration::from_millis(hold_ms)).await?;
        }
        Command::Extract { text } => {
            let raw = text.join(" ").replace("\\n", "\n");
            let first_line = raw
                .lines()
                .find(|line| !line.trim().is_empty())
                .unwrap_or_default();
            print_json(&ExtractReport {
                normalized: normalize_name(first_line, &config.text),
                name: extract_card_name(&raw, &config.text),
            })?;
        }
        Command::ClearCache => {
            let lookup = build_lookup(&config)?;
            lookup.clear_cache().await;
            println!("Cache cleared");
        }
        Command::Config { init } => {
            if init && !config_path.exists() {
                config::save_config(&AppConfig::default(), &config_path)?;
                info!("Wrote default configuration to {:?}", config_path);
            }
            println!("# {}", config_path.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ExtractReport {
    normalized: String,
    name: Option<String>,
}

/// Feed each photo to a running session for `hold`, reporting events
async fn watch(config: &AppConfig, frames: &[PathBuf], hold: Duration) -> Result<()> {
    let source = Arc::new(SharedFrameSource::new());
    let pipeline = Arc::new(build_pipeline(config, false)?);
    let (session, events) = ScanSession::new(
        config.capture.clone(),
        config.presence.clone(),
        config.tracker.clone(),
        source.clone(),
        pipeline.clone(),
    );
    let handle = session.spawn(events);

    for path in frames {
        let still = StillFrameSource::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        info!("Showing {}", path.display());
        source.push(CapturedFrame::new(still.image().clone()));

        let until = Instant::now() + hold;
        while Instant::now() < until {
            drain_events(&handle)?;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    while pipeline.is_processing() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    drain_events(&handle)?;

    handle.stop().await;
    pipeline.recognizer().terminate().await;
    Ok(())
}

fn drain_events(handle: &ScanHandle) -> Result<()> {
    while let Ok(event) = handle.events().try_recv() {
        match event {
            ScanEvent::Detected => info!("Card detected"),
            ScanEvent::Captured { region } => {
                info!("Captured {}x{} zone", region.width, region.height)
            }
            ScanEvent::CardLost => info!("Card lost before capture"),
            ScanEvent::Rearmed => info!("Ready for next card"),
            ScanEvent::Processed(outcome) => print_json(&outcome)?,
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Catalog client with the durable cache when enabled and available
fn build_lookup(config: &AppConfig) -> Result<LookupOrchestrator> {
    let client = ScryfallClient::new(&config.catalog)?;

    let durable: Option<Arc<dyn DurableCache>> = if config.catalog.durable_cache {
        storage::cache_db_path()
            .ok()
            .and_then(|path| SqliteCacheStore::open_or_warn(&path))
            .map(|store| Arc::new(store) as Arc<dyn DurableCache>)
    } else {
        None
    };

    Ok(LookupOrchestrator::new(
        Arc::new(client),
        durable,
        &config.catalog,
        config.text.clone(),
    ))
}

fn build_pipeline(config: &AppConfig, name_only: bool) -> Result<CardPipeline> {
    let lookup = build_lookup(config)?;
    let recognizer = RecognitionInvoker::new(Arc::new(TesseractFactory::new(
        config.recognition.clone(),
    )));
    let enhancer = EnhancementStage::new(config.enhancement.clone(), config.capture.zone);

    Ok(CardPipeline::new(
        enhancer,
        Arc::new(recognizer),
        Arc::new(lookup),
        config.text.clone(),
        config.recognition.min_confidence,
    )
    .with_options(EnhanceOptions {
        use_full_card: !name_only,
        ..EnhanceOptions::default()
    }))
}
