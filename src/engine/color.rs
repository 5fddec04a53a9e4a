// src/engine/color.rs
//
// RGBA color type, hex parsing/formatting and pixel picking.

use crate::error::ToolboxError;
use image::{DynamicImage, GenericImageView, Rgba};

type ColorResult<T> = std::result::Result<T, ToolboxError>;

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`. The leading `#` is optional.
    pub fn parse_hex(input: &str) -> ColorResult<Self> {
        let invalid = || {
            ToolboxError::invalid_argument(
                "color",
                input.to_string(),
                "expected #RGB, #RRGGBB or #RRGGBBAA",
            )
        };
        let hex = input.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                // #abc == #aabbcc
                let nibble = |i: usize| byte(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Self::rgb(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
            8 => Ok(Self::rgba(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => Err(invalid()),
        }
    }

    /// `#rrggbb` for opaque colors, `#rrggbbaa` otherwise.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub fn to_css_rgba(&self) -> String {
        let alpha = self.a as f32 / 255.0;
        format!("rgba({}, {}, {}, {:.3})", self.r, self.g, self.b, alpha)
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl From<Rgba<u8>> for Color {
    fn from(p: Rgba<u8>) -> Self {
        Self::rgba(p[0], p[1], p[2], p[3])
    }
}

impl From<Color> for Rgba<u8> {
    fn from(c: Color) -> Self {
        c.to_rgba()
    }
}

/// Color of a single pixel.
pub fn pick_color(img: &DynamicImage, x: u32, y: u32) -> ColorResult<Color> {
    let (width, height) = img.dimensions();
    if x >= width || y >= height {
        return Err(ToolboxError::pixel_out_of_bounds(x, y, width, height));
    }
    Ok(img.get_pixel(x, y).into())
}

/// Mean RGBA over a rectangle, clipped to the image.
pub fn average_color(
    img: &DynamicImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> ColorResult<Color> {
    let (img_w, img_h) = img.dimensions();
    let x_end = x.saturating_add(width).min(img_w);
    let y_end = y.saturating_add(height).min(img_h);
    if x >= x_end || y >= y_end {
        return Err(ToolboxError::pixel_out_of_bounds(x, y, img_w, img_h));
    }

    let mut sums = [0u64; 4];
    for py in y..y_end {
        for px in x..x_end {
            let p = img.get_pixel(px, py);
            for (sum, channel) in sums.iter_mut().zip(p.0) {
                *sum += channel as u64;
            }
        }
    }
    let count = (x_end - x) as u64 * (y_end - y) as u64;
    let mean = |sum: u64| ((sum + count / 2) / count) as u8;
    Ok(Color::rgba(
        mean(sums[0]),
        mean(sums[1]),
        mean(sums[2]),
        mean(sums[3]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn parse_hex_variants() {
        assert_eq!(Color::parse_hex("#ff8000").unwrap(), Color::rgb(255, 128, 0));
        assert_eq!(Color::parse_hex("ff800080").unwrap(), Color::rgba(255, 128, 0, 128));
        assert_eq!(Color::parse_hex("#fa0").unwrap(), Color::rgb(255, 170, 0));
    }

    #[test]
    fn parse_hex_rejects_garbage() {
        for bad in ["", "#12", "#12345", "#gggggg", "#ÿÿÿ"] {
            assert!(
                matches!(
                    Color::parse_hex(bad),
                    Err(ToolboxError::InvalidArgument { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn hex_round_trip() {
        for c in [Color::WHITE, Color::rgba(1, 2, 3, 4), Color::rgb(0x12, 0xab, 0xef)] {
            assert_eq!(Color::parse_hex(&c.to_hex()).unwrap(), c);
        }
    }

    #[test]
    fn css_rgba_format() {
        assert_eq!(Color::rgb(10, 20, 30).to_css_rgba(), "rgba(10, 20, 30, 1.000)");
        assert_eq!(Color::TRANSPARENT.to_css_rgba(), "rgba(0, 0, 0, 0.000)");
    }

    #[test]
    fn pick_returns_exact_pixel() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(4, 4, |x, y| {
            Rgba([x as u8 * 10, y as u8 * 10, 7, 200])
        }));
        assert_eq!(pick_color(&img, 3, 2).unwrap(), Color::rgba(30, 20, 7, 200));
        assert!(matches!(
            pick_color(&img, 4, 0),
            Err(ToolboxError::PixelOutOfBounds { .. })
        ));
    }

    #[test]
    fn average_clips_to_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([100, 200, 50, 255])
            }
        }));
        assert_eq!(
            average_color(&img, 0, 0, 10, 10).unwrap(),
            Color::rgba(50, 100, 25, 255)
        );
        assert!(average_color(&img, 5, 0, 1, 1).is_err());
        assert!(average_color(&img, 0, 0, 0, 1).is_err());
    }
}
