//! Audio domain newtypes for the HDMI audio path.
//!
//! These zero-cost wrappers catch configuration mistakes at setup time:
//! - `SampleRateHz`: validates the 32–192 kHz range carried by HDMI LPCM
//! - `ClockRegen`: validates the 20-bit CTS/N pair of the clock
//!   regeneration packet
//! - `AudioSample`: one stereo frame of signed 16-bit PCM

use thiserror_no_std::Error;

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("value {value} outside {min}..={max}")]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

// ── AudioSample ──────────────────────────────────────────────────────────────

/// One stereo PCM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct AudioSample {
    /// Left channel.
    pub left: i16,
    /// Right channel.
    pub right: i16,
}

impl AudioSample {
    /// Digital silence.
    pub const SILENCE: Self = Self { left: 0, right: 0 };

    /// Build a frame from its two channels.
    #[must_use]
    pub const fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }
}

// ── SampleRateHz ─────────────────────────────────────────────────────────────

/// Sample rate in Hz, validated to the LPCM rates an HDMI sink accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct SampleRateHz(u32);

impl SampleRateHz {
    /// Lowest HDMI LPCM rate.
    pub const MIN_HZ: u32 = 32_000;

    /// Highest two-channel HDMI LPCM rate.
    pub const MAX_HZ: u32 = 192_000;

    /// Create a `SampleRateHz`, returning an error if out of 32–192 kHz.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `hz < 32000` or `hz > 192000`.
    pub fn new(hz: u32) -> Result<Self, OutOfRangeError> {
        if !(Self::MIN_HZ..=Self::MAX_HZ).contains(&hz) {
            Err(OutOfRangeError {
                value: hz,
                min: Self::MIN_HZ,
                max: Self::MAX_HZ,
            })
        } else {
            Ok(Self(hz))
        }
    }

    /// Return the sample rate in Hz.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

// ── ClockRegen ───────────────────────────────────────────────────────────────

/// Audio clock regeneration parameters (`CTS`, `N`).
///
/// The sink rebuilds the audio clock as `128 * fs = pixel_clock * N / CTS`.
/// Both fields are 20 bits wide on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockRegen {
    cts: u32,
    n: u32,
}

impl ClockRegen {
    /// Largest value a 20-bit CTS/N field can hold.
    pub const MAX_FIELD: u32 = (1 << 20) - 1;

    /// Validate an explicit `CTS`/`N` pair.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if either value is zero or wider than 20 bits.
    pub fn new(cts: u32, n: u32) -> Result<Self, OutOfRangeError> {
        for value in [cts, n] {
            if value == 0 || value > Self::MAX_FIELD {
                return Err(OutOfRangeError {
                    value,
                    min: 1,
                    max: Self::MAX_FIELD,
                });
            }
        }
        Ok(Self { cts, n })
    }

    /// Derive the customary `N` for `rate` and the matching `CTS` for
    /// `pixel_clock_hz`.
    ///
    /// `N` follows the usual 32 kHz / 44.1 kHz / 48 kHz families
    /// (4096 / 6272 / 6144, scaled by the rate multiple). `CTS` is
    /// `pixel_clock * N / (128 * fs)`, truncated.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if the derived `CTS` does not fit 20 bits.
    pub fn recommended(rate: SampleRateHz, pixel_clock_hz: u32) -> Result<Self, OutOfRangeError> {
        let fs = rate.get();
        let n = Self::recommended_n(fs);
        let cts = u64::from(pixel_clock_hz)
            .saturating_mul(u64::from(n))
            .checked_div(u64::from(fs).saturating_mul(128))
            .unwrap_or(0);
        Self::new(u32::try_from(cts).unwrap_or(u32::MAX), n)
    }

    fn recommended_n(fs: u32) -> u32 {
        match fs {
            32_000 => 4096,
            44_100 => 6272,
            88_200 => 12_544,
            176_400 => 25_088,
            48_000 => 6144,
            96_000 => 12_288,
            192_000 => 24_576,
            // 128 * fs / 1000 is the textbook starting point for other rates.
            other => other.saturating_mul(128) / 1000,
        }
    }

    /// Cycle time stamp.
    #[must_use]
    pub fn cts(self) -> u32 {
        self.cts
    }

    /// Audio clock divider.
    #[must_use]
    pub fn n(self) -> u32 {
        self.n
    }
}
