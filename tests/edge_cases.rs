// tests/edge_cases.rs
//
// Edge case tests for imgtoolbox
// Tests boundary values, invalid inputs, and error handling

use image::{DynamicImage, GenericImageView, RgbImage};
use imgtoolbox::codecs::ico::{read_directory, IcoContainer, IconPayload};
use imgtoolbox::engine::{
    apply_ops, build_icon, calc_resize_dimensions, check_dimensions, encode_jpeg, encode_png,
    encode_webp, fast_resize, Color, MAX_DIMENSION,
};
use imgtoolbox::error::ToolboxError;
use imgtoolbox::ops::{IconOptions, Operation, ResizeFit};
use std::borrow::Cow;

// Helper function to create test images
fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

// Helper to create valid JPEG of specified size
fn create_valid_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_jpeg(&create_test_image(width, height), 80, Color::WHITE).unwrap()
}

mod minimal_image_tests {
    use super::*;

    #[test]
    fn test_1x1_resize() {
        let img = create_test_image(1, 1);
        let ops = vec![Operation::Resize {
            width: Some(100),
            height: Some(100),
            fit: ResizeFit::Fill,
        }];
        let resized = apply_ops(Cow::Owned(img), &ops).unwrap();
        assert_eq!(resized.dimensions(), (100, 100));
    }

    #[test]
    fn test_1x1_rotate() {
        let img = create_test_image(1, 1);
        let ops = vec![Operation::Rotate { degrees: 90 }];
        let rotated = apply_ops(Cow::Owned(img), &ops).unwrap();
        assert_eq!(rotated.dimensions(), (1, 1));
    }

    #[test]
    fn test_1x1_encode_all() {
        let img = create_test_image(1, 1);
        let jpeg = encode_jpeg(&img, 80, Color::WHITE).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        let png = encode_png(&img, false).unwrap();
        assert_eq!(
            &png[0..8],
            &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
        );
        let webp = encode_webp(&img, 80).unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
    }

    #[test]
    fn test_1x1_icon_upscales_to_each_size() {
        let icon = build_icon(&create_test_image(1, 1), &[1, 16], IconOptions::default()).unwrap();
        let entries = read_directory(icon.as_ref()).unwrap();
        assert_eq!(entries[0].width, 1);
        assert_eq!(entries[1].width, 16);
    }
}

mod icon_boundary_tests {
    use super::*;

    #[test]
    fn test_edge_byte_boundary() {
        let icon = build_icon(&create_test_image(4, 4), &[255, 256, 257], IconOptions::default())
            .unwrap();
        let entries = read_directory(icon.as_ref()).unwrap();
        let widths: Vec<u8> = entries.iter().map(|e| e.width).collect();
        assert_eq!(widths, vec![255, 0, 0]);
    }

    #[test]
    fn test_size_above_max_dimension() {
        let err = build_icon(
            &create_test_image(4, 4),
            &[MAX_DIMENSION + 1],
            IconOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ToolboxError::InvalidIconSize { .. }));
    }

    #[test]
    fn test_container_rejects_empty_payload() {
        let err = IcoContainer::new(vec![IconPayload::new(16, Vec::new())]).unwrap_err();
        assert!(matches!(err, ToolboxError::EncodeFailed { .. }));
    }

    #[test]
    fn test_container_rejects_no_payloads() {
        assert!(matches!(
            IcoContainer::new(Vec::new()),
            Err(ToolboxError::NoIconSizes)
        ));
    }
}

mod invalid_operation_tests {
    use super::*;

    #[test]
    fn test_crop_zero_size() {
        let ops = vec![Operation::Crop {
            x: 0,
            y: 0,
            width: 0,
            height: 5,
        }];
        let err = apply_ops(Cow::Owned(create_test_image(10, 10)), &ops).unwrap_err();
        assert!(matches!(err, ToolboxError::InvalidCropDimensions { .. }));
    }

    #[test]
    fn test_crop_overflowing_coordinates() {
        let ops = vec![Operation::Crop {
            x: u32::MAX,
            y: 0,
            width: 2,
            height: 2,
        }];
        let err = apply_ops(Cow::Owned(create_test_image(10, 10)), &ops).unwrap_err();
        assert!(matches!(err, ToolboxError::InvalidCropBounds { .. }));
    }

    #[test]
    fn test_rotate_45_rejected() {
        let ops = vec![Operation::Rotate { degrees: 45 }];
        let err = apply_ops(Cow::Owned(create_test_image(4, 4)), &ops).unwrap_err();
        assert!(matches!(err, ToolboxError::InvalidRotationAngle { degrees: 45 }));
    }

    #[test]
    fn test_resize_to_zero() {
        let ops = vec![Operation::Resize {
            width: Some(0),
            height: Some(0),
            fit: ResizeFit::Fill,
        }];
        let err = apply_ops(Cow::Owned(create_test_image(4, 4)), &ops).unwrap_err();
        assert!(matches!(err, ToolboxError::InvalidResizeDimensions { .. }));
    }

    #[test]
    fn test_extreme_aspect_ratio_resize_collapses() {
        // 1000x1 scaled to width 10 rounds the height to 0
        assert_eq!(calc_resize_dimensions(1000, 1, Some(10), None), (10, 0));
        let ops = vec![Operation::Resize {
            width: Some(10),
            height: None,
            fit: ResizeFit::Inside,
        }];
        assert!(apply_ops(Cow::Owned(create_test_image(1000, 1)), &ops).is_err());
    }

    #[test]
    fn test_empty_ops_borrow() {
        let img = create_test_image(3, 3);
        let out = apply_ops(Cow::Borrowed(&img), &[]).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
    }
}

mod large_image_tests {
    use super::*;

    #[test]
    fn test_dimension_limits() {
        assert!(check_dimensions(MAX_DIMENSION, 100).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 100),
            Err(ToolboxError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(15_000, 15_000),
            Err(ToolboxError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_fast_resize_large_downscale() {
        let img = create_test_image(2048, 1024);
        let out = fast_resize(&img, 64, 32).unwrap();
        assert_eq!(out.dimensions(), (64, 32));
    }

    #[test]
    fn test_fast_resize_zero_target() {
        let err = fast_resize(&create_test_image(4, 4), 0, 4).unwrap_err();
        assert_eq!(err.target_dims, (0, 4));
    }
}

mod corrupted_input_tests {
    use super::*;
    use imgtoolbox::ImageTool;

    #[test]
    fn test_truncated_jpeg() {
        let jpeg = create_valid_jpeg(64, 64);
        let truncated = jpeg[..jpeg.len() / 3].to_vec();
        let tool = ImageTool::from_bytes(truncated);
        // mozjpeg may pad a truncated scan; it must never panic either way
        let _ = tool.decode();
    }

    #[test]
    fn test_empty_input() {
        let tool = ImageTool::from_bytes(Vec::new());
        assert!(tool.decode().is_err());
        assert!(tool.dimensions().is_err());
    }

    #[test]
    fn test_png_signature_only() {
        let tool = ImageTool::from_bytes(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        assert!(tool.decode().is_err());
    }

    #[test]
    fn test_malformed_ico_directory() {
        let mut bytes = vec![0u8, 0, 1, 0, 1, 0];
        bytes.extend_from_slice(&[16, 16, 0, 0, 1, 0, 32, 0]);
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(&22u32.to_le_bytes());
        assert!(matches!(
            read_directory(&bytes),
            Err(ToolboxError::MalformedIco { .. })
        ));
    }
}
