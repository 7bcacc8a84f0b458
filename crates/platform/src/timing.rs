//! Video mode timing descriptors.
//!
//! A [`TimingDescriptor`] is the immutable per-mode record that drives both
//! the vertical line state machine and the horizontal layout of every
//! transmitted scan line.
//!
//! ```text
//!  |<- front porch ->|<- sync ->|<- back porch ->|<------- active ------->|
//! ```
//!
//! The same four phases exist vertically, counted in lines instead of pixels.
//!
//! # Clocking
//!
//! TMDS transmits one 10-bit character per pixel per lane, so the pixel clock
//! is the serial bit clock divided by ten:
//!
//! | Mode        | Bit clock   | Pixel clock | Line rate  |
//! |-------------|-------------|-------------|------------|
//! | 640x480p60  | 252.0 MHz   | 25.2 MHz    | 31.50 kHz  |
//! | 800x480p60  | 295.2 MHz   | 29.52 MHz   | 29.88 kHz  |
//! | 800x600p60  | 400.0 MHz   | 40.0 MHz    | 37.88 kHz  |

use crate::config::ConfigError;

/// TMDS bits transmitted per pixel on each lane.
pub const TMDS_BITS_PER_PIXEL: u32 = 10;

/// Pixel clock in Hz per kHz of bit clock.
#[allow(clippy::arithmetic_side_effects)] // Safety: constant non-zero divisor
const KHZ_TO_PIXEL_HZ: u32 = 1000 / TMDS_BITS_PER_PIXEL;

/// Vertical phase of the display raster.
///
/// Phases cycle in declaration order and wrap from `Active` back to
/// `FrontPorch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinePhase {
    /// Blank lines between the end of the active region and vertical sync.
    #[default]
    FrontPorch,
    /// Vertical sync pulse.
    Sync,
    /// Blank lines between vertical sync and the first active line.
    BackPorch,
    /// Lines carrying pixel data.
    Active,
}

impl LinePhase {
    /// The phase that follows `self` in the raster cycle.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::FrontPorch => Self::Sync,
            Self::Sync => Self::BackPorch,
            Self::BackPorch => Self::Active,
            Self::Active => Self::FrontPorch,
        }
    }
}

/// Horizontal and vertical timing of one video mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingDescriptor {
    /// `true` when the horizontal sync pulse is active-high.
    pub h_sync_polarity: bool,
    /// Horizontal front porch, in pixels.
    pub h_front_porch: u32,
    /// Horizontal sync width, in pixels.
    pub h_sync_width: u32,
    /// Horizontal back porch, in pixels.
    pub h_back_porch: u32,
    /// Visible pixels per line.
    pub h_active_pixels: u32,

    /// `true` when the vertical sync pulse is active-high.
    pub v_sync_polarity: bool,
    /// Vertical front porch, in lines.
    pub v_front_porch: u32,
    /// Vertical sync width, in lines.
    pub v_sync_width: u32,
    /// Vertical back porch, in lines.
    pub v_back_porch: u32,
    /// Visible lines per frame.
    pub v_active_lines: u32,

    /// TMDS serial bit clock in kHz.
    pub bit_clock_khz: u32,
}

impl TimingDescriptor {
    /// Total pixel periods per line, blanking included.
    ///
    /// Saturates for descriptors that fail [`validate`](Self::validate).
    #[must_use]
    pub const fn pixels_per_line(&self) -> u32 {
        self.h_front_porch
            .saturating_add(self.h_sync_width)
            .saturating_add(self.h_back_porch)
            .saturating_add(self.h_active_pixels)
    }

    /// Total lines per frame, blanking included.
    ///
    /// Saturates for descriptors that fail [`validate`](Self::validate).
    #[must_use]
    pub const fn lines_per_frame(&self) -> u32 {
        self.v_front_porch
            .saturating_add(self.v_sync_width)
            .saturating_add(self.v_back_porch)
            .saturating_add(self.v_active_lines)
    }

    /// Total pixel periods per frame, blanking included.
    ///
    /// Saturates for descriptors that fail [`validate`](Self::validate).
    #[must_use]
    pub const fn pixels_per_frame(&self) -> u32 {
        self.pixels_per_line().saturating_mul(self.lines_per_frame())
    }

    /// Pixel clock in Hz (bit clock / 10).
    ///
    /// Saturates for descriptors that fail [`validate`](Self::validate).
    #[must_use]
    pub const fn pixel_clock_hz(&self) -> u32 {
        self.bit_clock_khz.saturating_mul(KHZ_TO_PIXEL_HZ)
    }

    /// Number of lines spent in `phase`.
    #[must_use]
    pub const fn phase_length(&self, phase: LinePhase) -> u32 {
        match phase {
            LinePhase::FrontPorch => self.v_front_porch,
            LinePhase::Sync => self.v_sync_width,
            LinePhase::BackPorch => self.v_back_porch,
            LinePhase::Active => self.v_active_lines,
        }
    }

    /// Check the descriptor can drive the line state machine and the
    /// two-pixels-per-word transmission layout.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroLengthPhase`] if any vertical phase is empty
    ///   (the state machine would never leave it).
    /// - [`ConfigError::ZeroLengthHorizontal`] if any horizontal period is empty.
    /// - [`ConfigError::OddActiveWidth`] if the active width is not a
    ///   multiple of two pixels.
    /// - [`ConfigError::ZeroBitClock`] if the bit clock is zero.
    /// - [`ConfigError::TimingOverflow`] if the per-frame pixel count or the
    ///   pixel clock in Hz does not fit 32 bits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for phase in [
            LinePhase::FrontPorch,
            LinePhase::Sync,
            LinePhase::BackPorch,
            LinePhase::Active,
        ] {
            if self.phase_length(phase) == 0 {
                return Err(ConfigError::ZeroLengthPhase(phase));
            }
        }
        if self.h_front_porch == 0
            || self.h_sync_width == 0
            || self.h_back_porch == 0
            || self.h_active_pixels == 0
        {
            return Err(ConfigError::ZeroLengthHorizontal);
        }
        if self.h_active_pixels % 2 != 0 {
            return Err(ConfigError::OddActiveWidth(self.h_active_pixels));
        }
        if self.bit_clock_khz == 0 {
            return Err(ConfigError::ZeroBitClock);
        }
        if self.checked_pixels_per_frame().is_none()
            || self.bit_clock_khz.checked_mul(KHZ_TO_PIXEL_HZ).is_none()
        {
            return Err(ConfigError::TimingOverflow);
        }
        Ok(())
    }

    fn checked_pixels_per_frame(&self) -> Option<u32> {
        let line = self
            .h_front_porch
            .checked_add(self.h_sync_width)?
            .checked_add(self.h_back_porch)?
            .checked_add(self.h_active_pixels)?;
        let frame = self
            .v_front_porch
            .checked_add(self.v_sync_width)?
            .checked_add(self.v_back_porch)?
            .checked_add(self.v_active_lines)?;
        line.checked_mul(frame)
    }
}

/// 640x480 @ 60 Hz (CEA VIC 1), run at the comfortable 252 MHz system clock.
pub const TIMING_640X480P60: TimingDescriptor = TimingDescriptor {
    h_sync_polarity: false,
    h_front_porch: 16,
    h_sync_width: 96,
    h_back_porch: 48,
    h_active_pixels: 640,

    v_sync_polarity: false,
    v_front_porch: 10,
    v_sync_width: 2,
    v_back_porch: 33,
    v_active_lines: 480,

    bit_clock_khz: 252_000,
};

/// 800x480 @ 60 Hz, common on small HDMI panels.
pub const TIMING_800X480P60: TimingDescriptor = TimingDescriptor {
    h_sync_polarity: false,
    h_front_porch: 24,
    h_sync_width: 72,
    h_back_porch: 96,
    h_active_pixels: 800,

    v_sync_polarity: false,
    v_front_porch: 3,
    v_sync_width: 10,
    v_back_porch: 7,
    v_active_lines: 480,

    bit_clock_khz: 295_200,
};

/// 800x600 @ 60 Hz (VESA DMT), 400 MHz bit clock.
pub const TIMING_800X600P60: TimingDescriptor = TimingDescriptor {
    h_sync_polarity: true,
    h_front_porch: 40,
    h_sync_width: 128,
    h_back_porch: 88,
    h_active_pixels: 800,

    v_sync_polarity: true,
    v_front_porch: 1,
    v_sync_width: 4,
    v_back_porch: 23,
    v_active_lines: 600,

    bit_clock_khz: 400_000,
};

/// Catalog of supported video modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VideoMode {
    /// 640x480 @ 60 Hz.
    Vga640x480p60,
    /// 800x480 @ 60 Hz.
    Wvga800x480p60,
    /// 800x600 @ 60 Hz.
    Svga800x600p60,
}

impl VideoMode {
    /// Timing descriptor for this mode.
    #[must_use]
    pub const fn timing(self) -> &'static TimingDescriptor {
        match self {
            Self::Vga640x480p60 => &TIMING_640X480P60,
            Self::Wvga800x480p60 => &TIMING_800X480P60,
            Self::Svga800x600p60 => &TIMING_800X600P60,
        }
    }
}
