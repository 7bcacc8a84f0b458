//! Output configuration: pin assignment and blanking margins.
//!
//! Every check here runs once at construction time. A configuration that
//! fails validation is a setup error; the realtime path never re-checks it.
//!
//! # Pin layout
//!
//! Each TMDS lane is a differential pair on two adjacent GPIOs (`pin`,
//! `pin + 1`). The pixel clock pair is generated by a PWM slice, whose two
//! outputs always sit on an even/odd GPIO pair, so the clock pin must be even.
//!
//! | Signal   | Pins                  |
//! |----------|-----------------------|
//! | TMDS D0  | `tmds_pins[0]`, `+1`  |
//! | TMDS D1  | `tmds_pins[1]`, `+1`  |
//! | TMDS D2  | `tmds_pins[2]`, `+1`  |
//! | TMDS CLK | `clock_pin`, `+1`     |

use thiserror_no_std::Error;

use crate::packet::AviInfoFrame;
use crate::timing::LinePhase;

/// Number of TMDS data lanes.
pub const TMDS_LANES: usize = 3;

/// Highest GPIO number usable for a differential pair's first pin.
pub const MAX_PAIR_BASE_PIN: u8 = 28;

/// Setup-time configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A vertical phase has zero lines.
    #[error("vertical phase {0:?} has zero lines")]
    ZeroLengthPhase(LinePhase),
    /// A horizontal period has zero pixels.
    #[error("horizontal timing contains a zero-length period")]
    ZeroLengthHorizontal,
    /// Active width must be a whole number of two-pixel words.
    #[error("active width {0} is not a multiple of two pixels")]
    OddActiveWidth(u32),
    /// Bit clock must be non-zero.
    #[error("bit clock is zero")]
    ZeroBitClock,
    /// Frame size or pixel clock does not fit 32 bits.
    #[error("timing totals overflow 32 bits")]
    TimingOverflow,
    /// PWM clock output requires an even base pin.
    #[error("clock pin {0} is odd; the PWM pair needs an even base pin")]
    MisalignedClockPin(u8),
    /// A differential pair would run past the last GPIO.
    #[error("pin {0} cannot start a differential pair")]
    PinOutOfRange(u8),
    /// Two differential pairs share a GPIO.
    #[error("differential pairs at pins {0} and {1} overlap")]
    OverlappingPins(u8, u8),
    /// Blank margins cover the whole active region.
    #[error("blank margins ({top} + {bottom}) cover all {active} active lines")]
    MarginsCoverActive {
        /// Top margin in lines.
        top: u32,
        /// Bottom margin in lines.
        bottom: u32,
        /// Active lines in the mode.
        active: u32,
    },
}

/// Lane/pin assignment and sink-facing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DviConfig {
    /// Base GPIO of each TMDS data lane pair.
    pub tmds_pins: [u8; TMDS_LANES],
    /// Base GPIO of the TMDS clock pair (must be even).
    pub clock_pin: u8,
    /// Swap P/N on every pair (board routing).
    pub invert: bool,
    /// AVI info frame announced to the sink when data islands are enabled.
    pub avi: AviInfoFrame,
}

impl DviConfig {
    /// Check the pin assignment.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MisalignedClockPin`] for an odd clock pin.
    /// - [`ConfigError::PinOutOfRange`] if a pair runs past the last GPIO.
    /// - [`ConfigError::OverlappingPins`] if two pairs share a GPIO.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_pin % 2 != 0 {
            return Err(ConfigError::MisalignedClockPin(self.clock_pin));
        }
        let pairs = [
            self.tmds_pins[0],
            self.tmds_pins[1],
            self.tmds_pins[2],
            self.clock_pin,
        ];
        for (i, &a) in pairs.iter().enumerate() {
            if a > MAX_PAIR_BASE_PIN {
                return Err(ConfigError::PinOutOfRange(a));
            }
            for &b in pairs.iter().skip(i.saturating_add(1)) {
                if a.abs_diff(b) < 2 {
                    return Err(ConfigError::OverlappingPins(a, b));
                }
            }
        }
        Ok(())
    }
}

impl Default for DviConfig {
    /// Pico DVI Sock layout: D0=12, D1=18, D2=16, CLK=14.
    fn default() -> Self {
        Self {
            tmds_pins: [12, 18, 16],
            clock_pin: 14,
            invert: false,
            avi: AviInfoFrame::default(),
        }
    }
}

/// Lines at the top and bottom of the active region that are always blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlankSettings {
    /// Blank lines at the top of the active region.
    pub top: u32,
    /// Blank lines at the bottom of the active region.
    pub bottom: u32,
}

impl BlankSettings {
    /// `true` when active line `line` falls inside a blank margin.
    #[must_use]
    pub fn is_blank(&self, line: u32, active_lines: u32) -> bool {
        line < self.top || line >= active_lines.saturating_sub(self.bottom)
    }

    /// Check the margins leave at least one visible line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MarginsCoverActive`] otherwise.
    pub fn validate(&self, active_lines: u32) -> Result<(), ConfigError> {
        if self.top.saturating_add(self.bottom) >= active_lines {
            return Err(ConfigError::MarginsCoverActive {
                top: self.top,
                bottom: self.bottom,
                active: active_lines,
            });
        }
        Ok(())
    }
}
