// src/engine/icon.rs
//
// Multi-resolution icon build: one square PNG render per requested edge length,
// packed into an ICO container.

use crate::codecs::ico::{IcoContainer, IconFile, IconPayload};
use crate::engine::encoder::encode_png;
use crate::engine::pipeline::fast_resize;
use crate::engine::MAX_DIMENSION;
use crate::error::ToolboxError;
use crate::ops::IconOptions;
use image::{DynamicImage, GenericImageView};

type IconResult<T> = std::result::Result<T, ToolboxError>;

/// Reject an empty size list and edge lengths outside 1..=MAX_DIMENSION.
pub fn validate_sizes(sizes: &[u32]) -> IconResult<()> {
    if sizes.is_empty() {
        return Err(ToolboxError::no_icon_sizes());
    }
    if let Some(&bad) = sizes.iter().find(|&&s| s == 0 || s > MAX_DIMENSION) {
        return Err(ToolboxError::invalid_icon_size(bad, MAX_DIMENSION));
    }
    Ok(())
}

/// Build an ICO file from `source`, one entry per size in the order given.
///
/// Each entry stretches the source to an exact square (aspect ratio is not kept)
/// and stores it as PNG. Duplicate sizes produce duplicate entries. The first
/// failing size aborts the build.
pub fn build_icon(source: &DynamicImage, sizes: &[u32], options: IconOptions) -> IconResult<IconFile> {
    validate_sizes(sizes)?;
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(ToolboxError::corrupted_image());
    }

    // Icons carry alpha, so every payload is rendered from an RGBA source.
    let rgba = match source {
        DynamicImage::ImageRgba8(_) => None,
        other => Some(DynamicImage::ImageRgba8(other.to_rgba8())),
    };
    let rgba = rgba.as_ref().unwrap_or(source);

    let mut payloads = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let rendered = if (src_w, src_h) == (size, size) {
            rgba.clone()
        } else {
            fast_resize(rgba, size, size)?
        };
        let png = encode_png(&rendered, options.optimize)?;
        tracing::trace!(target: "imgtoolbox::icon", size, bytes = png.len(), "rendered icon entry");
        payloads.push(IconPayload::new(size, png));
    }

    let container = IcoContainer::new(payloads)?;
    let data = container.to_bytes()?;
    tracing::debug!(
        target: "imgtoolbox::icon",
        entries = container.len(),
        bytes = data.len(),
        "built icon"
    );
    Ok(IconFile::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::ico::{payload, read_directory, ICO_DIR_ENTRY_LEN, ICO_HEADER_LEN};
    use image::{Rgba, RgbImage, RgbaImage};

    fn source(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        }))
    }

    #[test]
    fn builds_two_entries_from_non_square_source() {
        let icon = build_icon(&source(100, 150), &[32, 64], IconOptions::default()).unwrap();
        let bytes = icon.as_ref();
        assert_eq!(&bytes[..6], &[0, 0, 1, 0, 2, 0]);

        let entries = read_directory(bytes).unwrap();
        assert_eq!(entries.len(), 2);
        let expected_len = ICO_HEADER_LEN
            + 2 * ICO_DIR_ENTRY_LEN
            + entries[0].size as usize
            + entries[1].size as usize;
        assert_eq!(icon.len(), expected_len);
        assert_eq!(entries[0].offset as usize, ICO_HEADER_LEN + 2 * ICO_DIR_ENTRY_LEN);
        assert_eq!(entries[1].offset, entries[0].offset + entries[0].size);

        for (entry, want) in entries.iter().zip([32u32, 64]) {
            assert_eq!(entry.pixel_width(), want);
            let decoded = image::load_from_memory(payload(bytes, entry).unwrap()).unwrap();
            assert_eq!(decoded.dimensions(), (want, want));
        }
    }

    #[test]
    fn duplicates_and_large_sizes_are_kept() {
        let icon = build_icon(&source(8, 8), &[16, 16, 256], IconOptions::default()).unwrap();
        let entries = read_directory(icon.as_ref()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].width, 16);
        assert_eq!(entries[1].width, 16);
        assert_eq!(entries[2].width, 0);
        assert_eq!(entries[2].height, 0);
        assert_eq!(entries[2].pixel_width(), 256);
    }

    #[test]
    fn payloads_keep_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let icon = build_icon(&img, &[4], IconOptions::default()).unwrap();
        let entries = read_directory(icon.as_ref()).unwrap();
        let decoded = image::load_from_memory(payload(icon.as_ref(), &entries[0]).unwrap()).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn empty_sizes_rejected() {
        let err = build_icon(&source(4, 4), &[], IconOptions::default()).unwrap_err();
        assert!(matches!(err, ToolboxError::NoIconSizes));
    }

    #[test]
    fn zero_and_oversized_rejected() {
        let err = build_icon(&source(4, 4), &[16, 0], IconOptions::default()).unwrap_err();
        assert!(matches!(err, ToolboxError::InvalidIconSize { size: 0, .. }));
        assert!(validate_sizes(&[MAX_DIMENSION + 1]).is_err());
        assert!(validate_sizes(&[MAX_DIMENSION]).is_ok());
    }

    #[test]
    fn optimized_build_is_valid() {
        let icon = build_icon(&source(40, 40), &[16, 32], IconOptions { optimize: true }).unwrap();
        let entries = read_directory(icon.as_ref()).unwrap();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert!(image::load_from_memory(payload(icon.as_ref(), entry).unwrap()).is_ok());
        }
    }
}
