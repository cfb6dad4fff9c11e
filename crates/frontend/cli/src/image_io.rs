//! PNG load / save for RGBA8 texture levels.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};
use refrast_core::texture::{copy, ConstPixelBufferAccess, TextureFormat, TextureLevel};

/// Load a PNG as an RGBA8 level; palette, grey and 16-bit images are
/// expanded to 8-bit RGBA.
pub fn load_png(path: &Path) -> Result<TextureLevel> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut decoder = png::Decoder::new(file);
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("Failed to read PNG header of {}", path.display()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let bytes = &buf[..info.buffer_size()];

    let (width, height) = (info.width as usize, info.height as usize);
    let mut level = TextureLevel::new(TextureFormat::rgba8(), width, height, 1)?;
    let rgba: Vec<u8> = match info.color_type {
        png::ColorType::Rgba => bytes.to_vec(),
        png::ColorType::Rgb => bytes.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect(),
        png::ColorType::GrayscaleAlpha => bytes.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0], p[1]]).collect(),
        png::ColorType::Grayscale => bytes.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        other => bail!("Unsupported PNG color type {:?} in {}", other, path.display()),
    };
    if rgba.len() != level.data().len() {
        bail!(
            "PNG {} decoded to {} bytes, expected {}",
            path.display(),
            rgba.len(),
            level.data().len()
        );
    }
    level.data_mut().copy_from_slice(&rgba);
    log::debug!("Loaded {} ({}x{})", path.display(), width, height);
    Ok(level)
}

/// Save any single-layer level as an RGBA8 PNG, converting the format
/// first when needed.
pub fn save_png(path: &Path, source: &ConstPixelBufferAccess<'_>) -> Result<()> {
    let [width, height, _] = source.size();
    let mut rgba = TextureLevel::new(TextureFormat::rgba8(), width, height, 1)?;
    copy(&mut rgba.access_mut(), &source.subregion([0, 0, 0], [width, height, 1]))?;

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba.data())?;
    log::debug!("Wrote {} ({}x{})", path.display(), width, height);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_round_trip() {
        let mut level = TextureLevel::new(TextureFormat::rgba8(), 3, 2, 1).unwrap();
        level.access_mut().set_pixel_int([255, 10, 20, 255], 2, 1, 0);
        level.access_mut().set_pixel_int([0, 0, 0, 128], 0, 0, 0);

        let path = std::env::temp_dir().join("refrast_cli_png_round_trip.png");
        save_png(&path, &level.access()).unwrap();
        let loaded = load_png(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.size(), [3, 2, 1]);
        assert_eq!(loaded.data(), level.data());
    }

    #[test]
    fn test_missing_png_is_an_error() {
        assert!(load_png(Path::new("/nonexistent/refrast.png")).is_err());
    }
}
