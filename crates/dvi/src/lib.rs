//! Realtime scan-line core for DVI/HDMI output on the RP2040.
//!
//! A non-realtime producer supplies scan lines; this crate encodes them,
//! schedules them onto the right physical lines from the per-line interrupt,
//! interleaves HDMI data-island packets (audio samples, info frames, clock
//! regeneration) into the blanking intervals and shows blank lines instead
//! of stalling whenever data is late.
//!
//! # Contexts
//!
//! ```text
//! producer task ──► DviPipeline ◄── encode worker task
//!                        │
//! audio task ──► SampleProducer ─► ring
//!                        │
//!            scan-line interrupt: Dvi::on_tick ──► OutputDriver
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dvi::{Dvi, DviPipeline};
//! use platform::{DviConfig, OutputDriver, PixelEncoder, PixelFormat, VideoMode};
//!
//! static PIPELINE: DviPipeline = DviPipeline::new();
//!
//! async fn producer() {
//!     for line in 0..240u16 {
//!         let pixels = PIPELINE.acquire_line_buffer().await;
//!         pixels.fill(0x001f);
//!         PIPELINE.submit_line_buffer(line, pixels).await;
//!     }
//! }
//!
//! async fn encode_worker<E: PixelEncoder>(encoder: &E) {
//!     PIPELINE.run_encode_loop(encoder, PixelFormat::Rgb565).await;
//! }
//!
//! fn bring_up<D: OutputDriver>(
//!     driver: D,
//!     lines: [&'static mut [u16]; 5],
//!     encoded: [&'static mut [u32]; 5],
//! ) -> Result<(), dvi::DviError> {
//!     let timing = *VideoMode::Vga640x480p60.timing();
//!     PIPELINE.provision(lines, encoded, &timing)?;
//!     let mut dvi = Dvi::new(&PIPELINE, driver, DviConfig::default(), timing)?;
//!     let tick = dvi.register_tick_source()?;
//!     dvi.start();
//!     // From the scan-line interrupt:
//!     dvi.on_tick(&tick);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `defmt`: log through defmt and derive `defmt::Format` (firmware)
//! - `tracing`: log through tracing (host / emulator)
//! - `std`: standard library support (testing)

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod data_island;
pub mod engine;
pub mod error;
pub mod line_state;
pub mod pipeline;
pub mod queue;
pub mod ring_buffer;

pub use data_island::{AudioCadence, AudioScheduler, UNDERRUN_COOLDOWN_TICKS};
pub use engine::{Dvi, TickRegistration};
pub use error::DviError;
pub use line_state::ScanState;
pub use pipeline::{DviPipeline, PoolStats, ScaledSpan};
pub use queue::BufferQueue;
pub use ring_buffer::{SampleConsumer, SampleProducer, SampleRing};
