#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

//! Animated GIF encoding built on two cores: a self-organizing neural-net
//! color quantizer ([`NeuQuant`]) and an adaptive-dictionary bitstream
//! compressor ([`LzwEncoder`]).
//!
//! [`encode_animation`] samples the frame set, trains one shared 256-color
//! palette, maps every pixel to a palette index, and packs each frame
//! independently into a GIF89a container. Both cores are also exported on
//! their own for callers assembling a different container.

extern crate alloc;

pub mod container;
pub mod error;
pub mod lzw;
pub mod neuquant;
pub mod sink;

pub use error::EncodeError;
pub use lzw::LzwEncoder;
pub use neuquant::NeuQuant;
pub use sink::ByteSink;

use alloc::vec::Vec;

/// Configuration for animated GIF encoding.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Palette sampling factor (1..=30). Lower samples more pixels during
    /// palette training: higher quality, longer training.
    pub sample_factor: u32,
    /// Per-frame delays in milliseconds; length must match the frame count.
    /// When `None`, every frame displays for 50 ms.
    pub delays_ms: Option<Vec<u32>>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_factor: 15,
            delays_ms: None,
        }
    }
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_factor(mut self, factor: u32) -> Self {
        self.sample_factor = factor;
        self
    }

    pub fn delays_ms(mut self, delays: Vec<u32>) -> Self {
        self.delays_ms = Some(delays);
        self
    }
}

/// Encode RGBA frames into a complete animated GIF.
///
/// One palette is trained for the whole frame set (sampling every other
/// frame, every second pixel), then each frame is indexed against it and
/// compressed independently — compression state never carries across
/// frames.
pub fn encode_animation(
    frames: &[&[rgb::RGBA<u8>]],
    width: usize,
    height: usize,
    config: &EncoderConfig,
) -> Result<Vec<u8>, EncodeError> {
    validate_inputs(frames, width, height, config)?;

    let samples = sample_frames(frames);
    let quant = NeuQuant::train(&samples, config.sample_factor);

    let mut out = Vec::new();
    container::write_header(&mut out);
    container::write_logical_screen(&mut out, width as u16, height as u16);
    container::write_palette(&mut out, &quant.palette());
    container::write_loop_extension(&mut out);

    for (i, frame) in frames.iter().enumerate() {
        let delay_cs = match &config.delays_ms {
            Some(delays) => container::delay_to_cs(delays[i]),
            None => container::DEFAULT_DELAY_CS,
        };

        container::write_graphic_control(&mut out, delay_cs);
        container::write_image_descriptor(&mut out, width as u16, height as u16);

        let indices = index_frame(frame, &quant);
        LzwEncoder::new(8).encode(&indices, &mut out);
    }

    out.push(container::TRAILER);
    Ok(out)
}

/// Build the palette training set: every other frame, every second pixel,
/// flattened to R,G,B triples.
fn sample_frames(frames: &[&[rgb::RGBA<u8>]]) -> Vec<u8> {
    let mut samples = Vec::new();
    for frame in frames.iter().step_by(2) {
        for pixel in frame.iter().step_by(2) {
            samples.push(pixel.r);
            samples.push(pixel.g);
            samples.push(pixel.b);
        }
    }
    samples
}

/// Map one frame's pixels to palette indices. Fully transparent pixels look
/// up as black, matching the opaque canvas the container declares.
fn index_frame(frame: &[rgb::RGBA<u8>], quant: &NeuQuant) -> Vec<u8> {
    frame
        .iter()
        .map(|p| {
            if p.a == 0 {
                quant.lookup(0, 0, 0)
            } else {
                quant.lookup(p.r, p.g, p.b)
            }
        })
        .collect()
}

fn validate_inputs(
    frames: &[&[rgb::RGBA<u8>]],
    width: usize,
    height: usize,
    config: &EncoderConfig,
) -> Result<(), EncodeError> {
    if frames.is_empty() {
        return Err(EncodeError::NoFrames);
    }
    if width == 0 || height == 0 {
        return Err(EncodeError::ZeroDimension);
    }
    if width > u16::MAX as usize || height > u16::MAX as usize {
        return Err(EncodeError::DimensionOverflow { width, height });
    }
    for (i, frame) in frames.iter().enumerate() {
        if frame.len() != width * height {
            return Err(EncodeError::DimensionMismatch {
                frame: i,
                len: frame.len(),
                width,
                height,
            });
        }
    }
    if let Some(delays) = &config.delays_ms {
        if delays.len() != frames.len() {
            return Err(EncodeError::DelayCountMismatch {
                delays: delays.len(),
                frames: frames.len(),
            });
        }
    }
    if config.sample_factor < 1 || config.sample_factor > 30 {
        return Err(EncodeError::InvalidSampleFactor(config.sample_factor));
    }
    Ok(())
}
