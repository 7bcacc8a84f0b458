//! Platform layer for the RP2040 DVI/HDMI output core
//!
//! This crate holds everything the realtime core needs to know about the
//! outside world without touching a register: video timing, pin and margin
//! configuration, audio parameter newtypes, data-island packet contents and
//! the two collaborator traits the core drives.
//!
//! # Architecture Layers
//!
//! ```text
//! Application (line producer, audio producer)
//!         ↓
//! Realtime core (dvi crate: tick handler, pipeline, scheduler)
//!         ↓
//! Platform (this crate - timing, config, collaborator traits)
//!         ↓
//! Hardware (PIO serialisers, DMA chains, PWM clock)
//! ```
//!
//! # Collaborators
//!
//! - [`OutputDriver`] - per-line DMA programming and serialiser control
//! - [`PixelEncoder`] - pixel to TMDS conversion
//!
//! # Features
//!
//! - `std`: Enable standard library support (for testing)
//! - `mocks`: Recording [`OutputDriver`] / [`PixelEncoder`] mocks
//! - `defmt`: Enable defmt::Format derives
//!
//! # Example
//!
//! ```
//! use platform::{VideoMode, encoded_buffer_words};
//!
//! let timing = VideoMode::Vga640x480p60.timing();
//! assert_eq!(timing.lines_per_frame(), 525);
//! assert_eq!(encoded_buffer_words(timing), 960);
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)] // register and signal names in doc comments
#![allow(clippy::must_use_candidate)] // plain accessors — callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod audio_types;
pub mod config;
pub mod encoder;
pub mod layout;
#[cfg(feature = "mocks")]
pub mod mocks;
pub mod output;
pub mod packet;
pub mod timing;

pub use audio_types::{AudioSample, ClockRegen, OutOfRangeError, SampleRateHz};
pub use config::{BlankSettings, ConfigError, DviConfig, TMDS_LANES};
pub use encoder::{PixelEncoder, PixelFormat};
pub use layout::{
    encoded_buffer_words, encoded_lane_words, line_buffer_pixels, BLANK_TMDS_WORD, BUFFER_COUNT,
    LINES_PER_BUFFER,
};
pub use output::OutputDriver;
pub use packet::{AudioSamplePacket, AviInfoFrame, DataPacket, AUDIO_FRAMES_PER_BLOCK};
pub use timing::{LinePhase, TimingDescriptor, VideoMode};
