//! pixreuse - Memory-budgeted image decoding with pixel buffer reuse.
//!
//! This binary decodes images through the pipeline and tiles huge images.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::ImageFormat;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixreuse::{
    config::{Cli, Command, DecodeArgs, EngineConfig, TilesArgs},
    ByteSource, DecodePipeline, DecodeRequest, FileSource, ImageCrateDecoder, PixelBufferPool,
    PlatformDecoder, TileDecodeCoordinator,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Decode(args) => run_decode(args).await,
        Command::Tiles(args) => run_tiles(args).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "pixreuse=debug" } else { "pixreuse=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Validate the engine settings and build a pipeline from them.
fn build_pipeline(engine: &EngineConfig, decoder: Arc<ImageCrateDecoder>) -> Option<DecodePipeline> {
    init_logging(engine.verbose);

    if let Err(e) = engine.validate() {
        error!("Configuration error: {}", e);
        return None;
    }

    Some(
        DecodePipeline::new(decoder, Arc::new(PixelBufferPool::with_budget(engine.pool_bytes)))
            .with_calculator(engine.calculator())
            .with_options(engine.pipeline_options()),
    )
}

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Decode Command
// =============================================================================

async fn run_decode(args: DecodeArgs) -> ExitCode {
    let Some(pipeline) = build_pipeline(&args.engine, Arc::new(ImageCrateDecoder::new())) else {
        return ExitCode::FAILURE;
    };

    let source = FileSource::new(&args.path);
    let request = DecodeRequest::new()
        .with_target(args.width, args.height)
        .with_thumbnail_mode(args.thumbnail)
        .with_low_quality(args.low_quality);

    let start = Instant::now();
    let bitmap = match pipeline.decode(&source, &request).await {
        Ok(result) => match result.into_bitmap() {
            Some(bitmap) => bitmap,
            None => {
                error!("Unexpected tiled result for {}", source.identifier());
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let elapsed = start.elapsed();

    if let Some(ref output) = args.output {
        let Some(image) = bitmap.buffer.to_image() else {
            error!("Decoded buffer cannot be converted to an image");
            return ExitCode::FAILURE;
        };
        if let Err(e) = image.save_with_format(output, ImageFormat::Png) {
            error!("Failed to write {}: {}", output.display(), e);
            return ExitCode::FAILURE;
        }
        info!("Wrote {}", output.display());
    }

    let stats = pipeline.pool().stats();
    if args.json {
        return print_json(&serde_json::json!({
            "source": source.identifier(),
            "attrs": bitmap.attrs,
            "buffer": pixreuse::pool::BufferInfo::from(&bitmap.buffer),
            "sample_factor": bitmap.sample_factor,
            "strategy": format!("{:?}", bitmap.strategy),
            "processed": bitmap.processed,
            "should_cache": bitmap.should_cache(),
            "elapsed_ms": elapsed.as_millis() as u64,
            "pool": { "hits": stats.hits, "misses": stats.misses },
        }));
    }

    println!("Source:      {}", source.identifier());
    println!(
        "Image:       {}x{} {} ({})",
        bitmap.attrs.width, bitmap.attrs.height, bitmap.attrs.mime_type, bitmap.attrs.orientation
    );
    println!(
        "Decoded:     {}x{} {} (sample factor {}, {:?})",
        bitmap.buffer.width(),
        bitmap.buffer.height(),
        bitmap.buffer.config(),
        bitmap.sample_factor,
        bitmap.strategy
    );
    println!("Processed:   {} (cache: {})", bitmap.processed, bitmap.should_cache());
    println!("Elapsed:     {} ms", elapsed.as_millis());

    ExitCode::SUCCESS
}

// =============================================================================
// Tiles Command
// =============================================================================

async fn run_tiles(args: TilesArgs) -> ExitCode {
    let decoder = Arc::new(ImageCrateDecoder::new());
    let Some(pipeline) = build_pipeline(&args.engine, Arc::clone(&decoder)) else {
        return ExitCode::FAILURE;
    };

    let source = FileSource::new(&args.path);
    let data = match source.open().await {
        Ok(data) => data,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let bounds = match decoder.read_bounds(&data) {
        Ok(bounds) => bounds,
        Err(e) => {
            error!("Cannot read bounds of {}: {}", source.identifier(), e);
            return ExitCode::FAILURE;
        }
    };
    if !decoder.supports_region(&bounds.mime_type) {
        error!("Region decoding is not supported for {}", bounds.mime_type);
        return ExitCode::FAILURE;
    }

    let coordinator = TileDecodeCoordinator::new(source.identifier(), data, bounds, pipeline);
    let start = Instant::now();
    coordinator.update_tiles(args.viewport, args.zoom);
    let summary = coordinator.decode_pending().await;
    let elapsed = start.elapsed();
    let tiles = coordinator.tiles();

    if args.json {
        return print_json(&serde_json::json!({
            "source": coordinator.source_id(),
            "bounds": coordinator.bounds(),
            "sample_factor": coordinator.sample_factor(),
            "tiles": tiles,
            "summary": summary,
            "elapsed_ms": elapsed.as_millis() as u64,
        }));
    }

    let bounds = coordinator.bounds();
    println!("Source:      {}", coordinator.source_id());
    println!("Image:       {}x{} {}", bounds.width, bounds.height, bounds.mime_type);
    println!("Sample:      {}", coordinator.sample_factor());
    println!("Tiles:       {}", tiles.len());
    for tile in &tiles {
        println!(
            "  #{:<3} {:<24} {:?}",
            tile.priority,
            tile.source_rect.to_string(),
            tile.state
        );
    }
    println!(
        "Summary:     {} decoded, {} failed, {} cancelled in {} ms",
        summary.decoded,
        summary.failed,
        summary.cancelled,
        elapsed.as_millis()
    );

    if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
