mod image_io;
mod scene;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use refrast_compare::{pixel_threshold_compare, CompareResult};
use refrast_core::logging::{LogCategory, LogConfig, LogLevel};
use refrast_core::texture::TextureLevel;

use crate::image_io::{load_png, save_png};
use crate::scene::SceneConfig;

#[derive(Parser)]
#[command(name = "refrast", version, about = "Software reference rasterizer")]
struct Args {
    /// Level for all pipeline log categories: off, error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "off")]
    log_level: String,

    /// Per-category override, e.g. `raster=debug` (repeatable)
    #[arg(long = "log-category", global = true, value_name = "CATEGORY=LEVEL")]
    log_categories: Vec<String>,

    /// Send pipeline logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Pipeline log messages allowed per category per second
    #[arg(long, global = true)]
    log_rate_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a JSON scene to a PNG
    Render {
        scene: PathBuf,

        #[arg(long, default_value = "out.png")]
        out: PathBuf,

        /// Compare the render against this PNG
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Write the comparison error mask here
        #[arg(long, requires = "reference")]
        mask: Option<PathBuf>,

        /// Allowed per-channel difference in 8-bit steps
        #[arg(long, default_value_t = 0)]
        threshold: u8,
    },

    /// Compare two PNG images
    Compare {
        reference: PathBuf,
        result: PathBuf,

        #[arg(long)]
        mask: Option<PathBuf>,

        #[arg(long, default_value_t = 0)]
        threshold: u8,
    },
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    let level =
        LogLevel::from_str(&args.log_level).ok_or_else(|| anyhow!("Unknown log level: {}", args.log_level))?;
    config.set_global_level(level);

    for arg in &args.log_categories {
        let (category, level) = parse_category_level(arg)?;
        config.set_level(category, level);
    }
    if let Some(limit) = args.log_rate_limit {
        config.set_rate_limit(limit);
    }
    if let Some(path) = &args.log_file {
        config.set_log_file(path.clone())?;
    }
    Ok(())
}

fn parse_category_level(arg: &str) -> Result<(LogCategory, LogLevel)> {
    let (category, level) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected CATEGORY=LEVEL, got {}", arg))?;
    let category = LogCategory::from_str(category).ok_or_else(|| anyhow!("Unknown log category: {}", category))?;
    let level = LogLevel::from_str(level).ok_or_else(|| anyhow!("Unknown log level: {}", level))?;
    Ok((category, level))
}

fn compare_images(
    reference: &TextureLevel,
    result: &TextureLevel,
    threshold: u8,
    mask: Option<&Path>,
) -> Result<CompareResult<u32>> {
    let outcome = pixel_threshold_compare(&reference.access(), &result.access(), [threshold; 4])?;
    if let Some(path) = mask {
        save_png(path, &outcome.error_mask.access())?;
    }
    if outcome.passed {
        log::info!("Images match, max difference {:?}", outcome.max_diff);
    } else {
        log::warn!(
            "{} pixels differ by more than {}, max difference {:?}",
            outcome.num_failed,
            threshold,
            outcome.max_diff
        );
    }
    Ok(outcome)
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    configure_logging(&args)?;

    match &args.command {
        Command::Render {
            scene,
            out,
            reference,
            mask,
            threshold,
        } => {
            let config = SceneConfig::load(scene)?;
            let color = config.render()?;
            save_png(out, &color.access())?;
            println!("Wrote {}x{} image to {}", config.width, config.height, out.display());

            if let Some(reference) = reference {
                let reference = load_png(reference)?;
                let rendered = load_png(out)?;
                let outcome = compare_images(&reference, &rendered, *threshold, mask.as_deref())?;
                if !outcome.passed {
                    bail!("Render does not match reference ({} pixels differ)", outcome.num_failed);
                }
            }
        }
        Command::Compare {
            reference,
            result,
            mask,
            threshold,
        } => {
            let outcome = compare_images(&load_png(reference)?, &load_png(result)?, *threshold, mask.as_deref())?;
            if !outcome.passed {
                bail!("Images differ: {} pixels over threshold", outcome.num_failed);
            }
            println!("Images match");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_level() {
        let (category, level) = parse_category_level("raster=debug").unwrap();
        assert_eq!(category, LogCategory::Raster);
        assert_eq!(level, LogLevel::Debug);
        assert!(parse_category_level("raster").is_err());
        assert!(parse_category_level("gpu=debug").is_err());
        assert!(parse_category_level("raster=loud").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "refrast",
            "--log-category",
            "fragment=trace",
            "compare",
            "a.png",
            "b.png",
            "--threshold",
            "2",
        ])
        .unwrap();
        assert_eq!(args.log_level, "off");
        assert_eq!(args.log_categories, vec!["fragment=trace".to_string()]);
        match args.command {
            Command::Compare { threshold, mask, .. } => {
                assert_eq!(threshold, 2);
                assert!(mask.is_none());
            }
            Command::Render { .. } => panic!("expected compare"),
        }
    }

    #[test]
    fn test_mask_requires_reference() {
        let parsed = Args::try_parse_from(["refrast", "render", "scene.json", "--mask", "m.png"]);
        assert!(parsed.is_err());
    }
}
