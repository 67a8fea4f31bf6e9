use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gallery_contracts::events::EventWriter;
use gallery_contracts::gallery::layout::{DEFAULT_DOCS_DIR, DEFAULT_IMAGE_FILE_NAME};
use gallery_contracts::gallery::GalleryLayout;
use gallery_engine::thumbnails::{DEFAULT_MAX_WIDTH, DEFAULT_QUALITY};
use gallery_engine::{
    default_provider_registry, error_chain_text, GeminiConfig, GenerateOutcome,
    ImageRequestHandler, ThumbnailEntry, ThumbnailError, ThumbnailGenerator, ThumbnailOutcome,
    ThumbnailSettings,
};

#[derive(Debug, Parser)]
#[command(name = "gallery-rs", version, about = "Generate images into a static gallery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one image from a prompt and add it to gallery.json.
    Generate(GenerateArgs),
    /// Refresh thumbnails for every image in the gallery.
    Thumbnails(ThumbnailArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = DEFAULT_IMAGE_FILE_NAME)]
    filename: String,
    #[arg(long, default_value = DEFAULT_DOCS_DIR)]
    docs: PathBuf,
    #[arg(long, default_value = "gemini")]
    provider: String,
    /// Overrides GEMINI_IMAGE_MODEL.
    #[arg(long)]
    model: Option<String>,
    /// Request timeout in seconds. No timeout when omitted.
    #[arg(long)]
    timeout: Option<f64>,
    /// Omit the Google Search grounding tool from the request.
    #[arg(long)]
    no_search: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ThumbnailArgs {
    #[arg(long, default_value = DEFAULT_DOCS_DIR)]
    docs: PathBuf,
    #[arg(long, default_value_t = DEFAULT_MAX_WIDTH)]
    max_width: u32,
    #[arg(long, default_value_t = DEFAULT_QUALITY)]
    quality: u8,
    /// Source extensions to include (repeatable).
    #[arg(long = "ext", default_values_t = vec!["png".to_string()])]
    extensions: Vec<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn main() {
    env_logger::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("gallery-rs error: {}", error_chain_text(&err, 2000));
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Thumbnails(args) => run_thumbnails(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut gemini = GeminiConfig::from_env();
    if let Some(model) = args.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        gemini.model = model.to_string();
    }
    gemini.google_search = !args.no_search;
    gemini.timeout = args
        .timeout
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64);

    log::debug!(
        "gemini model {} at {} (search: {}, timeout: {:?})",
        gemini.model,
        gemini.api_base,
        gemini.google_search,
        gemini.timeout
    );
    let providers = default_provider_registry(gemini)?;
    let provider = providers.get(&args.provider).with_context(|| {
        format!(
            "unknown provider '{}' (available: {})",
            args.provider,
            providers.names().join(", ")
        )
    })?;

    let mut handler = ImageRequestHandler::new(provider, GalleryLayout::new(&args.docs));
    if let Some(path) = args.events.as_ref() {
        handler = handler.with_events(EventWriter::with_new_session(path));
    }

    eprintln!("Generating image...");
    match handler.handle(&args.prompt, &args.filename)? {
        GenerateOutcome::Saved(saved) => {
            println!("Saved as {}", saved.path.display());
            println!("Image generated and saved to gallery!");
            Ok(0)
        }
        GenerateOutcome::NoImage { commentary } => {
            eprintln!("No image returned.");
            if !commentary.is_empty() {
                eprintln!("{commentary}");
            }
            Ok(1)
        }
    }
}

fn run_thumbnails(args: ThumbnailArgs) -> Result<i32> {
    let settings = ThumbnailSettings {
        max_width: args.max_width.max(1),
        quality: args.quality.clamp(1, 100),
        extensions: args.extensions,
    };
    let layout = GalleryLayout::new(&args.docs);
    let mut generator = ThumbnailGenerator::new(&layout, settings);
    if let Some(path) = args.events.as_ref() {
        generator = generator.with_events(EventWriter::with_new_session(path));
    }

    println!("🖼️  Optimizing images for gallery...\n");
    if generator.candidates()?.is_empty() {
        println!("No images found to optimize");
        return Ok(0);
    }

    let report = generator.run_with(|entry| println!("{}", format_entry(entry)))?;
    println!("\n✅ Processed {} images", report.processed());
    Ok(0)
}

fn format_entry(entry: &ThumbnailEntry) -> String {
    match &entry.result {
        Ok(ThumbnailOutcome::Skipped) => {
            format!("✓ Skipping {} (thumbnail up to date)", entry.file_name)
        }
        Ok(ThumbnailOutcome::Written(stats)) => format!(
            "✓ {}: {:.1}MB → {:.1}MB ({:.0}% smaller)",
            entry.file_name,
            stats.source_bytes as f64 / BYTES_PER_MB,
            stats.thumbnail_bytes as f64 / BYTES_PER_MB,
            stats.reduction_pct()
        ),
        Err(err) => format_failure(&entry.file_name, err),
    }
}

fn format_failure(file_name: &str, err: &ThumbnailError) -> String {
    format!("✗ Error processing {file_name}: {err}")
}
