//! Data island scheduling: which packet rides in each line's blanking.
//!
//! Runs once per tick, after the video update, while data islands are
//! enabled. Exactly one packet is produced per tick; the first matching rule
//! wins:
//!
//! | # | Condition                         | Packet                                   |
//! |---|-----------------------------------|------------------------------------------|
//! | 1 | no sample rate configured         | null                                     |
//! | 2 | underrun cooldown running         | null (cooldown decremented)              |
//! | 3 | front porch, line 0               | AVI (odd frame) / audio (even) info frame|
//! | 4 | front porch, line 1               | clock regeneration                       |
//! | 5 | otherwise                         | up to 4 samples paced by the accumulator |
//!
//! # Cadence
//!
//! Audio is paced off the pixel clock, not an audio clock. Per line the
//! accumulator gains `fs * pixels_per_line / pixel_clock` samples in Q16;
//! whole samples are drained from it as they are emitted. At 48 kHz on
//! 640x480 that is ~1.52 samples per line and 800 per frame.

use platform::packet::MAX_SAMPLES_PER_PACKET;
use platform::{
    AudioSample, AviInfoFrame, ClockRegen, DataPacket, LinePhase, SampleRateHz, TimingDescriptor,
};

use crate::ring_buffer::SampleConsumer;

/// Ticks to stay silent after finding the audio ring empty (about two frames
/// at 640x480), giving the producer time to refill.
pub const UNDERRUN_COOLDOWN_TICKS: u32 = 1024;

/// Q16 fractional bits of the sample accumulator.
const ACC_FRAC_BITS: u32 = 16;

/// Sample pacing derived from the sample rate and video timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioCadence {
    /// Whole samples per video frame, truncated.
    pub samples_per_frame: u32,
    /// Samples per scan line in Q16 fixed point, truncated.
    pub samples_per_line_q16: u32,
}

impl AudioCadence {
    /// Cadence for `rate` on `timing`.
    ///
    /// `timing` must have passed [`TimingDescriptor::validate`]; a zero pixel
    /// clock yields a zero cadence.
    pub fn derive(rate: SampleRateHz, timing: &TimingDescriptor) -> Self {
        let fs = u64::from(rate.get());
        let pclk = u64::from(timing.pixel_clock_hz());
        let per_frame = fs
            .saturating_mul(u64::from(timing.pixels_per_frame()))
            .checked_div(pclk)
            .unwrap_or(0);
        let per_line_q16 = fs
            .saturating_mul(u64::from(timing.pixels_per_line()))
            .saturating_mul(1 << ACC_FRAC_BITS)
            .checked_div(pclk)
            .unwrap_or(0);
        Self {
            samples_per_frame: u32::try_from(per_frame).unwrap_or(u32::MAX),
            samples_per_line_q16: u32::try_from(per_line_q16).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AudioSettings {
    rate: SampleRateHz,
    regen: ClockRegen,
    cadence: AudioCadence,
}

/// Per-tick packet selector.
#[derive(Debug, Clone)]
pub struct AudioScheduler {
    avi: AviInfoFrame,
    audio: Option<AudioSettings>,
    /// Q16 samples owed to the sink.
    accumulator: u32,
    cooldown: u32,
    remaining_in_frame: u32,
    /// IEC 60958 frame position of the next sample.
    frame_count: u8,
}

impl AudioScheduler {
    /// Scheduler with no audio configured; it emits only null packets until
    /// [`configure`](Self::configure) is called.
    pub const fn new(avi: AviInfoFrame) -> Self {
        Self {
            avi,
            audio: None,
            accumulator: 0,
            cooldown: 0,
            remaining_in_frame: 0,
            frame_count: 0,
        }
    }

    /// Set the sample rate and clock regeneration values and derive the
    /// cadence for `timing`. Returns the derived cadence.
    pub fn configure(
        &mut self,
        rate: SampleRateHz,
        regen: ClockRegen,
        timing: &TimingDescriptor,
    ) -> AudioCadence {
        let cadence = AudioCadence::derive(rate, timing);
        self.audio = Some(AudioSettings {
            rate,
            regen,
            cadence,
        });
        self.accumulator = 0;
        self.cooldown = 0;
        self.remaining_in_frame = cadence.samples_per_frame;
        cadence
    }

    /// Derived cadence, once configured.
    pub fn cadence(&self) -> Option<AudioCadence> {
        self.audio.map(|a| a.cadence)
    }

    /// Ticks of underrun cooldown left.
    pub fn cooldown(&self) -> u32 {
        self.cooldown
    }

    /// Samples still expected before the next info frame.
    pub fn samples_remaining_in_frame(&self) -> u32 {
        self.remaining_in_frame
    }

    /// Pick the packet for the line at (`phase`, `counter`).
    ///
    /// `audio` is the sample ring's consumer, absent until an audio buffer
    /// has been allocated; an absent ring behaves like an empty one.
    #[allow(clippy::arithmetic_side_effects)] // Safety: shifts by the constant ACC_FRAC_BITS < 32
    pub fn next_packet(
        &mut self,
        phase: LinePhase,
        counter: u32,
        frame_counter: u32,
        audio: Option<&mut SampleConsumer<'_>>,
    ) -> DataPacket {
        let Some(settings) = self.audio else {
            return DataPacket::null();
        };

        if self.cooldown > 0 {
            self.cooldown = self.cooldown.saturating_sub(1);
            return DataPacket::null();
        }

        if phase == LinePhase::FrontPorch {
            match counter {
                0 => {
                    self.remaining_in_frame = settings.cadence.samples_per_frame;
                    return if frame_counter & 1 == 1 {
                        DataPacket::avi_info_frame(self.avi)
                    } else {
                        DataPacket::audio_info_frame(settings.rate)
                    };
                }
                1 => return DataPacket::clock_regeneration(settings.regen),
                _ => {}
            }
        }

        self.accumulator = self
            .accumulator
            .saturating_add(settings.cadence.samples_per_line_q16);
        let readable = audio.as_ref().map_or(0, |ring| ring.readable());
        let owed = usize::try_from(self.accumulator >> ACC_FRAC_BITS).unwrap_or(usize::MAX);
        let n = owed.min(MAX_SAMPLES_PER_PACKET).min(readable);

        match audio {
            Some(ring) if n > 0 => {
                let mut samples = [AudioSample::SILENCE; MAX_SAMPLES_PER_PACKET];
                let taken = samples.get_mut(..n).map_or(0, |out| ring.peek_into(out));
                ring.advance(taken);
                let taken_u32 = u32::try_from(taken).unwrap_or(0);
                self.accumulator = self
                    .accumulator
                    .saturating_sub(taken_u32 << ACC_FRAC_BITS);
                self.remaining_in_frame = self.remaining_in_frame.saturating_sub(taken_u32);
                let (packet, next) = DataPacket::audio_samples(
                    samples.get(..taken).unwrap_or(&[]),
                    self.frame_count,
                );
                self.frame_count = next;
                packet
            }
            _ => {
                if readable == 0 {
                    self.cooldown = UNDERRUN_COOLDOWN_TICKS;
                    #[cfg(feature = "defmt")]
                    defmt::trace!("audio underrun, cooling down {} ticks", UNDERRUN_COOLDOWN_TICKS);
                    #[cfg(feature = "tracing")]
                    tracing::trace!("audio underrun, cooling down {} ticks", UNDERRUN_COOLDOWN_TICKS);
                }
                DataPacket::null()
            }
        }
    }
}
