// src/codecs/gif.rs
//
// Animated GIF encode/decode on top of the image crate.

use crate::engine::check_dimensions;
use crate::error::ToolboxError;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, Frame, ImageDecoder, RgbaImage};
use std::io::Cursor;

type GifResult<T> = std::result::Result<T, ToolboxError>;

/// Quantization speed passed to the encoder (1 = best, 30 = fastest).
const ENCODE_SPEED: i32 = 10;

/// Longest delay a frame header can hold (u16 centiseconds).
pub const MAX_FRAME_DELAY_MS: u32 = u16::MAX as u32 * 10;

/// GIF stores delays in centiseconds: round to the nearest 10 ms, halves up.
pub fn quantize_delay_ms(delay_ms: u32) -> u32 {
    (delay_ms.min(MAX_FRAME_DELAY_MS) + 5) / 10 * 10
}

/// One RGBA frame and how long it stays on screen.
#[derive(Clone, Debug)]
pub struct AnimationFrame {
    pub image: RgbaImage,
    pub delay_ms: u32,
}

/// Encode frames as an animated GIF. `loop_count: None` loops forever.
pub fn encode_animation(frames: &[AnimationFrame], loop_count: Option<u16>) -> GifResult<Vec<u8>> {
    if frames.is_empty() {
        return Err(ToolboxError::no_input_images("gif"));
    }
    let gif_err = |e: image::ImageError| ToolboxError::encode_failed("gif", e.to_string());

    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buf, ENCODE_SPEED);
        let repeat = match loop_count {
            None => Repeat::Infinite,
            Some(n) => Repeat::Finite(n),
        };
        encoder.set_repeat(repeat).map_err(gif_err)?;
        for frame in frames {
            let delay = Delay::from_numer_denom_ms(quantize_delay_ms(frame.delay_ms), 1);
            encoder
                .encode_frame(Frame::from_parts(frame.image.clone(), 0, 0, delay))
                .map_err(gif_err)?;
        }
    }

    if buf.is_empty() {
        return Err(ToolboxError::encode_failed("gif", "encoder produced no data"));
    }
    Ok(buf)
}

/// Decode every frame of a GIF, composited to full-canvas RGBA.
pub fn decode_animation(bytes: &[u8]) -> GifResult<Vec<AnimationFrame>> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| ToolboxError::decode_failed(format!("gif: {e}")))?;
    let (width, height) = decoder.dimensions();
    check_dimensions(width, height)?;

    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| ToolboxError::decode_failed(format!("gif frames: {e}")))?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay_ms = if denom == 0 { 0 } else { numer / denom };
            AnimationFrame {
                image: frame.into_buffer(),
                delay_ms,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn frames_and_delays_survive_encode_decode() {
        let frames = vec![
            AnimationFrame {
                image: solid(8, 6, [255, 0, 0, 255]),
                delay_ms: 100,
            },
            AnimationFrame {
                image: solid(8, 6, [0, 0, 255, 255]),
                delay_ms: 250,
            },
        ];
        let gif = encode_animation(&frames, None).unwrap();
        assert_eq!(&gif[0..3], b"GIF");

        let decoded = decode_animation(&gif).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].delay_ms, 100);
        assert_eq!(decoded[1].delay_ms, 250);
        assert_eq!(decoded[1].image.dimensions(), (8, 6));
        let px = decoded[0].image.get_pixel(0, 0);
        assert!(px[0] > 200 && px[2] < 50);
    }

    #[test]
    fn delays_round_to_centiseconds() {
        assert_eq!(quantize_delay_ms(0), 0);
        assert_eq!(quantize_delay_ms(4), 0);
        assert_eq!(quantize_delay_ms(15), 20);
        assert_eq!(quantize_delay_ms(124), 120);
        assert_eq!(quantize_delay_ms(u32::MAX), MAX_FRAME_DELAY_MS);

        let frames: Vec<AnimationFrame> = [15, 33]
            .into_iter()
            .map(|delay_ms| AnimationFrame {
                image: solid(2, 2, [0, 255, 0, 255]),
                delay_ms,
            })
            .collect();
        let decoded = decode_animation(&encode_animation(&frames, None).unwrap()).unwrap();
        let delays: Vec<u32> = decoded.iter().map(|f| f.delay_ms).collect();
        assert_eq!(delays, vec![20, 30]);
    }

    #[test]
    fn empty_frame_list_is_rejected() {
        assert!(matches!(
            encode_animation(&[], Some(1)),
            Err(ToolboxError::NoInputImages { .. })
        ));
    }

    #[test]
    fn non_gif_is_a_decode_error() {
        assert!(decode_animation(b"not a gif at all").is_err());
    }
}
