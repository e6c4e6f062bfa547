//! Configuration management for pixreuse.
//!
//! This module provides the command-line and environment configuration:
//! - Command-line arguments via clap
//! - Environment variables with `PIXREUSE_` prefix
//! - Defaults matching the library's own defaults
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use pixreuse::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Decode(args) => println!("decoding {}", args.path.display()),
//!     Command::Tiles(args) => println!("tiling {}", args.path.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `PIXREUSE_POOL_BYTES` - Buffer pool budget in bytes (default: 32MB)
//! - `PIXREUSE_DISABLE_REUSE` - Never write into pooled buffers (default: false)
//! - `PIXREUSE_MAX_PIXELS` - Pixel ceiling of a full decode (default: 8388608)
//! - `PIXREUSE_MAX_SIDE` - Side ceiling of a full decode (default: 4096)
//! - `PIXREUSE_TILE_SIZE` - Tile side in decoded pixels (default: 256)
//! - `PIXREUSE_TILE_MARGIN` - Retained margin around the viewport (default: 0.5)
//! - `PIXREUSE_TILE_WORKERS` - Concurrent tile decodes (default: 4)
//! - `PIXREUSE_CACHE_SAMPLE_THRESHOLD` - Sample factor worth caching (default: 8)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::decode::{
    PipelineOptions, SampleSizeCalculator, DEFAULT_CACHE_SAMPLE_THRESHOLD, DEFAULT_MAX_PIXELS,
    DEFAULT_MAX_SIDE,
};
use crate::huge::{Rect, TileOptions, DEFAULT_TILE_MARGIN, DEFAULT_TILE_SIZE, DEFAULT_TILE_WORKERS};
use crate::pool::DEFAULT_POOL_BUDGET;

/// Largest accepted tile side.
const MAX_TILE_SIZE: u32 = 8192;

/// Largest accepted number of tile workers.
const MAX_TILE_WORKERS: usize = 256;

// =============================================================================
// CLI Arguments
// =============================================================================

/// pixreuse - Memory-budgeted image decoding with pixel buffer reuse.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixreuse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode an image to a downsampled, upright bitmap.
    Decode(DecodeArgs),

    /// Decode the tiles of a huge image covering a viewport.
    Tiles(TilesArgs),
}

/// Arguments of `pixreuse decode`.
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Image file to decode.
    pub path: PathBuf,

    /// Target width (0 = unconstrained).
    #[arg(long, default_value_t = 0)]
    pub width: u32,

    /// Target height (0 = unconstrained).
    #[arg(long, default_value_t = 0)]
    pub height: u32,

    /// Crop to the target aspect ratio when it differs a lot from the image.
    #[arg(long, default_value_t = false)]
    pub thumbnail: bool,

    /// Decode JPEG images as RGB565.
    #[arg(long, default_value_t = false)]
    pub low_quality: bool,

    /// Write the decoded bitmap as PNG.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub engine: EngineConfig,
}

/// Arguments of `pixreuse tiles`.
#[derive(Args, Debug, Clone)]
pub struct TilesArgs {
    /// Image file to tile.
    pub path: PathBuf,

    /// Viewport in image pixels as left,top,right,bottom.
    #[arg(long)]
    pub viewport: Rect,

    /// Display zoom (1.0 = one image pixel per screen pixel).
    #[arg(long, default_value_t = 1.0)]
    pub zoom: f32,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub engine: EngineConfig,
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Settings shared by all commands.
#[derive(Args, Debug, Clone)]
pub struct EngineConfig {
    /// Buffer pool budget in bytes.
    #[arg(long, default_value_t = DEFAULT_POOL_BUDGET, env = "PIXREUSE_POOL_BYTES")]
    pub pool_bytes: usize,

    /// Never write into pooled buffers.
    #[arg(long, default_value_t = false, env = "PIXREUSE_DISABLE_REUSE")]
    pub disable_reuse: bool,

    /// Pixel ceiling of a full decode.
    #[arg(long, default_value_t = DEFAULT_MAX_PIXELS, env = "PIXREUSE_MAX_PIXELS")]
    pub max_pixels: u64,

    /// Side ceiling of a full decode.
    #[arg(long, default_value_t = DEFAULT_MAX_SIDE, env = "PIXREUSE_MAX_SIDE")]
    pub max_side: u32,

    /// Tile side in decoded pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PIXREUSE_TILE_SIZE")]
    pub tile_size: u32,

    /// Retained margin around the viewport, as a fraction of its size.
    #[arg(long, default_value_t = DEFAULT_TILE_MARGIN, env = "PIXREUSE_TILE_MARGIN")]
    pub tile_margin: f32,

    /// Maximum concurrent tile decodes.
    #[arg(long, default_value_t = DEFAULT_TILE_WORKERS, env = "PIXREUSE_TILE_WORKERS")]
    pub tile_workers: usize,

    /// Sample factor from which a processed result is flagged as worth caching.
    #[arg(
        long,
        default_value_t = DEFAULT_CACHE_SAMPLE_THRESHOLD,
        env = "PIXREUSE_CACHE_SAMPLE_THRESHOLD"
    )]
    pub cache_sample_threshold: u32,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_bytes: DEFAULT_POOL_BUDGET,
            disable_reuse: false,
            max_pixels: DEFAULT_MAX_PIXELS,
            max_side: DEFAULT_MAX_SIDE,
            tile_size: DEFAULT_TILE_SIZE,
            tile_margin: DEFAULT_TILE_MARGIN,
            tile_workers: DEFAULT_TILE_WORKERS,
            cache_sample_threshold: DEFAULT_CACHE_SAMPLE_THRESHOLD,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pixels == 0 {
            return Err("max_pixels must be greater than 0".to_string());
        }
        if self.max_side == 0 {
            return Err("max_side must be greater than 0".to_string());
        }
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(format!("tile_size must be between 1 and {}", MAX_TILE_SIZE));
        }
        if !self.tile_margin.is_finite() || self.tile_margin < 0.0 || self.tile_margin > 4.0 {
            return Err("tile_margin must be between 0.0 and 4.0".to_string());
        }
        if self.tile_workers == 0 || self.tile_workers > MAX_TILE_WORKERS {
            return Err(format!("tile_workers must be between 1 and {}", MAX_TILE_WORKERS));
        }
        if self.cache_sample_threshold == 0 {
            return Err("cache_sample_threshold must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Sample size calculator with the configured ceilings.
    pub fn calculator(&self) -> SampleSizeCalculator {
        SampleSizeCalculator::new(self.max_pixels, self.max_side)
    }

    /// Convert to the pipeline's options.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            reuse_disabled: self.disable_reuse,
            cache_sample_threshold: self.cache_sample_threshold,
            tiles: TileOptions {
                tile_size: self.tile_size,
                margin: self.tile_margin,
                workers: self.tile_workers,
                stable_sort_fallback: true,
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
