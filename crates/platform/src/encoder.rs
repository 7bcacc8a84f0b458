//! Pixel-to-TMDS encoder abstraction.
//!
//! The encoder turns one line of 16-bit source pixels into the word layout
//! the output driver streams: [`TMDS_LANES`](crate::config::TMDS_LANES)
//! consecutive lane planes, each holding two 10-bit TMDS characters per
//! 32-bit word. Implementations are pure and allocation-free; they are
//! called from the encode worker, never from the tick interrupt.

/// Source pixel layouts accepted by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelFormat {
    /// 5-6-5 RGB.
    Rgb565,
    /// 5-5-5 RGB, top bit ignored.
    Rgb555,
    /// 4-4-4 RGB in the low 12 bits.
    Rgb444,
}

impl PixelFormat {
    /// Significant bits per pixel.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u8 {
        match self {
            Self::Rgb565 => 16,
            Self::Rgb555 => 15,
            Self::Rgb444 => 12,
        }
    }
}

/// Pixel encoder.
pub trait PixelEncoder {
    /// Encode every pixel of `src` into `dst`.
    ///
    /// `dst` must hold `src.len() / 2` words per lane.
    fn encode(&self, format: PixelFormat, dst: &mut [u32], src: &[u16]);

    /// Encode `dst_pixels` output pixels from `src` with the fixed 16:7
    /// horizontal upscale used to stretch narrow sources (RGB444 only).
    ///
    /// `dst` starts at the first destination word to write; `lane_stride`
    /// is the distance in words between lane planes of the full buffer.
    fn encode_scaled(&self, dst: &mut [u32], lane_stride: usize, src: &[u16], dst_pixels: usize);
}
