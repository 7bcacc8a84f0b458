//! Scan-line buffer geometry.
//!
//! ## Encoded buffer layout
//!
//! ```text
//! [ lane 0: h_active/2 words ][ lane 1: h_active/2 words ][ lane 2: h_active/2 words ]
//!   each word = two 10-bit TMDS characters (bits 0..10, 10..20)
//! ```
//!
//! One encoded buffer is shown on [`LINES_PER_BUFFER`] consecutive physical
//! lines (line doubling), so a 480-line mode consumes 240 buffers per frame.
//!
//! ## Memory budget (640x480, RP2040 264 KB SRAM)
//!
//! | Pool            | Per buffer | x5     |
//! |-----------------|-----------:|-------:|
//! | Line (RGB16)    | 1 280 B    | 6.4 KB |
//! | Encoded (TMDS)  | 3 840 B    | 19.2 KB|
//!
//! Both pools must sit in striped SRAM (not the scratch banks reserved for
//! core stacks) so the DMA reader never contends with the tick handler's
//! stack.

use crate::config::TMDS_LANES;
use crate::timing::TimingDescriptor;

/// Buffers in each pool.
pub const BUFFER_COUNT: usize = 5;

/// Physical lines shown per encoded buffer.
pub const LINES_PER_BUFFER: u32 = 2;

/// TMDS characters packed in one 32-bit word.
pub const CHARS_PER_WORD: usize = 2;

/// Two black pixels as a DC-balanced TMDS character pair: `0x100` in bits
/// 0..10 and `0x1ff` in bits 10..20. Encoded buffers are filled with it so a
/// never-written buffer shows black.
pub const BLANK_TMDS_WORD: u32 = 0x7fd00;

/// Pixels in one line buffer for `timing`.
#[must_use]
pub const fn line_buffer_pixels(timing: &TimingDescriptor) -> usize {
    timing.h_active_pixels as usize
}

/// Words per lane plane of an encoded buffer for `timing`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: constant non-zero divisor
pub const fn encoded_lane_words(timing: &TimingDescriptor) -> usize {
    timing.h_active_pixels as usize / CHARS_PER_WORD
}

/// Words in one encoded buffer for `timing`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: h_active/2 * 3 fits usize for every u32 width
pub const fn encoded_buffer_words(timing: &TimingDescriptor) -> usize {
    encoded_lane_words(timing) * TMDS_LANES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TIMING_640X480P60;

    #[test]
    fn vga_buffer_sizes() {
        assert_eq!(line_buffer_pixels(&TIMING_640X480P60), 640);
        assert_eq!(encoded_lane_words(&TIMING_640X480P60), 320);
        assert_eq!(encoded_buffer_words(&TIMING_640X480P60), 960);
    }

    #[test]
    fn pools_fit_rp2040_sram_with_margin() {
        let line = line_buffer_pixels(&TIMING_640X480P60) * 2;
        let encoded = encoded_buffer_words(&TIMING_640X480P60) * 4;
        let total = (line + encoded) * BUFFER_COUNT;
        // Leave at least 200 KB for code-in-RAM, stacks and framebuffers.
        assert!(total + 200 * 1024 <= 264 * 1024, "pools use {total} bytes");
    }
}
