//! Data island packets.
//!
//! A [`DataPacket`] is the semantic content of one data-island slot in the
//! horizontal blanking interval. The byte layout (header, BCH parity, TERC4
//! symbols) belongs to the [`OutputDriver`](crate::output::OutputDriver),
//! which serialises whatever it is handed.
//!
//! The constructors on `DataPacket` are the packet builder used by the
//! realtime core: info frames and clock regeneration are built once at
//! configuration time and cloned per tick, sample packets are built per tick
//! from the audio ring.

use crate::audio_types::{AudioSample, ClockRegen, SampleRateHz};

/// Audio samples carried by one sample packet (four sub-packets).
pub const MAX_SAMPLES_PER_PACKET: usize = 4;

/// IEC 60958 block length; the running frame count wraps here.
pub const AUDIO_FRAMES_PER_BLOCK: u8 = 192;

// ── AVI info frame parameters ────────────────────────────────────────────────

/// Overscan / underscan hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanInfo {
    /// No data.
    NoData,
    /// Composed for an overscanned display.
    Overscan,
    /// Composed for an underscanned display.
    #[default]
    Underscan,
}

/// Pixel encoding on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelEncoding {
    /// RGB 4:4:4.
    #[default]
    Rgb,
    /// YCbCr 4:2:2.
    YCbCr422,
    /// YCbCr 4:4:4.
    YCbCr444,
}

/// Colorimetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Colorimetry {
    /// No data.
    NoData,
    /// SMPTE 170M / ITU-R BT.601.
    #[default]
    Itu601,
    /// ITU-R BT.709.
    Itu709,
}

/// Coded frame aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PictureAspectRatio {
    /// No data.
    NoData,
    /// 4:3.
    #[default]
    Ratio4x3,
    /// 16:9.
    Ratio16x9,
}

/// Active format aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveFormatAspectRatio {
    /// Same as the picture aspect ratio.
    #[default]
    SameAsPicture,
    /// 4:3 centred.
    Ratio4x3,
    /// 16:9 centred.
    Ratio16x9,
}

/// RGB quantization range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RgbQuantizationRange {
    /// Sink default for the video format.
    Default,
    /// 16–235.
    Limited,
    /// 0–255.
    #[default]
    Full,
}

/// CEA-861 video identification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VideoCode {
    /// No CEA code (IT format such as 800x480).
    Unspecified,
    /// VIC 1: 640x480p 59.94/60 Hz.
    #[default]
    Vic640x480p60,
}

/// AVI info frame contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AviInfoFrame {
    /// Scan information.
    pub scan: ScanInfo,
    /// Link pixel encoding.
    pub pixel_encoding: PixelEncoding,
    /// Colorimetry.
    pub colorimetry: Colorimetry,
    /// Picture aspect ratio.
    pub picture_aspect: PictureAspectRatio,
    /// Active format aspect ratio.
    pub active_format_aspect: ActiveFormatAspectRatio,
    /// RGB quantization range.
    pub quantization: RgbQuantizationRange,
    /// Video identification code.
    pub video_code: VideoCode,
}

// ── Packets ──────────────────────────────────────────────────────────────────

/// Up to four stereo samples plus the IEC 60958 frame position of the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioSamplePacket {
    samples: [AudioSample; MAX_SAMPLES_PER_PACKET],
    len: u8,
    frame_count: u8,
}

impl AudioSamplePacket {
    /// Samples carried, in order.
    #[must_use]
    #[allow(clippy::indexing_slicing)] // Safety: len <= MAX_SAMPLES_PER_PACKET by construction
    pub fn samples(&self) -> &[AudioSample] {
        &self.samples[..usize::from(self.len)]
    }

    /// Frame position (0..192) of the first sample; frame 0 carries the
    /// block-start flag.
    #[must_use]
    pub fn frame_count(&self) -> u8 {
        self.frame_count
    }
}

/// One data-island packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataPacket {
    /// Null packet; the island is transmitted but carries nothing.
    #[default]
    Null,
    /// AVI info frame.
    AviInfoFrame(AviInfoFrame),
    /// Audio info frame (two-channel LPCM).
    AudioInfoFrame {
        /// Announced sample rate.
        sample_rate: SampleRateHz,
    },
    /// Audio clock regeneration packet.
    ClockRegeneration(ClockRegen),
    /// Audio sample packet.
    AudioSamples(AudioSamplePacket),
}

impl DataPacket {
    /// The null packet.
    #[must_use]
    pub const fn null() -> Self {
        Self::Null
    }

    /// AVI info frame packet.
    #[must_use]
    pub const fn avi_info_frame(avi: AviInfoFrame) -> Self {
        Self::AviInfoFrame(avi)
    }

    /// Audio info frame packet for two-channel LPCM at `sample_rate`.
    #[must_use]
    pub const fn audio_info_frame(sample_rate: SampleRateHz) -> Self {
        Self::AudioInfoFrame { sample_rate }
    }

    /// Audio clock regeneration packet.
    #[must_use]
    pub const fn clock_regeneration(regen: ClockRegen) -> Self {
        Self::ClockRegeneration(regen)
    }

    /// Audio sample packet holding the first (at most four) entries of
    /// `samples`, starting at IEC 60958 frame `frame_count`.
    ///
    /// Returns the packet and the frame count for the next packet.
    #[must_use]
    pub fn audio_samples(samples: &[AudioSample], frame_count: u8) -> (Self, u8) {
        let mut packet = AudioSamplePacket {
            samples: [AudioSample::SILENCE; MAX_SAMPLES_PER_PACKET],
            len: 0,
            frame_count: frame_count % AUDIO_FRAMES_PER_BLOCK,
        };
        for (slot, sample) in packet.samples.iter_mut().zip(samples) {
            *slot = *sample;
            packet.len = packet.len.saturating_add(1);
        }
        // Safety: both operands < 192 + 4, no overflow in u8 before the modulo.
        #[allow(clippy::arithmetic_side_effects)]
        let next = (packet.frame_count + packet.len) % AUDIO_FRAMES_PER_BLOCK;
        (Self::AudioSamples(packet), next)
    }

    /// `true` for [`DataPacket::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}
