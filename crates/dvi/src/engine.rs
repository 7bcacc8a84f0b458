//! The DVI output engine: lifecycle and the per-line tick handler.
//!
//! `Dvi` owns the output driver and the tick-side state: scan position, the
//! encoded buffer currently on screen, the two release-delay slots and the
//! data island scheduler. Producers and the encode worker never touch it;
//! they talk to the shared [`DviPipeline`] instead.
//!
//! # Tick handler
//!
//! [`Dvi::on_tick`] runs once per scan line from the scan-line interrupt:
//!
//! 1. acknowledge the interrupt; ignore the tick if stopped
//! 2. advance the scan position
//! 3. wait for the driver to start the last block of the previous line
//! 4. rotate the release slots: slot 1 goes back to the free pool, slot 0
//!    moves to slot 1
//! 5. on an active line, pick the encoded buffer (or blank)
//! 6. program the driver, then the data island packet
//! 7. count a frame on entry to vertical sync
//!
//! Nothing in the handler waits on a lower-priority context. A missing
//! buffer shows as a blank line.
//!
//! # Release delay
//!
//! The driver may still be reading a buffer after `update` returns. A buffer
//! leaving the screen goes to slot 0, spends the following tick in slot 1,
//! and reaches the free pool only on the tick after that, once the driver
//! has confirmed it moved on twice.
//!
//! # Lifecycle
//!
//! | Call                      | Effect                                          |
//! |---------------------------|-------------------------------------------------|
//! | `register_tick_source`    | enable tick delivery, hand out the token        |
//! | `start`                   | recycle held buffers, reset scan, prime FIFOs   |
//! | `stop`                    | stop DMA and serialisers; buffers stay put      |
//! | `unregister_tick_source`  | disable ticks, then drain the release slots     |

use platform::{
    AudioSample, BlankSettings, ClockRegen, DviConfig, LinePhase, OutputDriver, SampleRateHz,
    TimingDescriptor, BUFFER_COUNT, LINES_PER_BUFFER,
};

use crate::data_island::{AudioCadence, AudioScheduler};
use crate::error::DviError;
use crate::line_state::ScanState;
use crate::pipeline::{DviPipeline, PoolStats};
use crate::ring_buffer::{SampleConsumer, SampleProducer};

/// Proof that an engine's tick handler is attached to a tick source.
///
/// Exactly one exists per engine while registered. Whoever owns it is the
/// realtime context allowed to drive [`Dvi::on_tick`]. A registration only
/// works with the engine that issued it.
#[derive(Debug)]
#[must_use = "dropping the registration leaves ticks enabled with no way to unregister"]
pub struct TickRegistration {
    /// Address of the issuing engine's pipeline; one engine per pipeline.
    owner: usize,
}

/// Realtime DVI/HDMI output engine.
pub struct Dvi<'p, D: OutputDriver, const N: usize = BUFFER_COUNT> {
    pipeline: &'p DviPipeline<N>,
    driver: D,
    config: DviConfig,
    timing: TimingDescriptor,
    blank: BlankSettings,
    scan: ScanState,
    scan_line: bool,
    started: bool,
    registered: bool,
    data_island: bool,
    /// Encoded buffer on screen for the current line pair.
    held: Option<&'static mut [u32]>,
    /// Buffers waiting out the release delay; index 0 is the newest.
    release: [Option<&'static mut [u32]>; 2],
    scheduler: AudioScheduler,
    audio: Option<SampleConsumer<'p>>,
}

impl<'p, D: OutputDriver, const N: usize> Dvi<'p, D, N> {
    /// Build an engine over a provisioned `pipeline`.
    ///
    /// # Errors
    ///
    /// - [`DviError::Config`] if `config` or `timing` fails validation.
    /// - [`DviError::NotProvisioned`] / [`DviError::BufferSizeMismatch`] if
    ///   the pipeline was not provisioned for `timing`.
    /// - [`DviError::PipelineInUse`] if another engine owns `pipeline`.
    pub fn new(
        pipeline: &'p DviPipeline<N>,
        driver: D,
        config: DviConfig,
        timing: TimingDescriptor,
    ) -> Result<Self, DviError> {
        timing.validate()?;
        config.validate()?;
        pipeline.check_geometry(&timing)?;
        pipeline.attach_engine()?;

        #[cfg(feature = "defmt")]
        defmt::info!(
            "dvi: {}x{} active, {} lines/frame, pixel clock {} Hz",
            timing.h_active_pixels,
            timing.v_active_lines,
            timing.lines_per_frame(),
            timing.pixel_clock_hz()
        );
        #[cfg(feature = "tracing")]
        tracing::info!(
            "dvi: {}x{} active, {} lines/frame, pixel clock {} Hz",
            timing.h_active_pixels,
            timing.v_active_lines,
            timing.lines_per_frame(),
            timing.pixel_clock_hz()
        );

        Ok(Self {
            pipeline,
            driver,
            config,
            timing,
            blank: BlankSettings::default(),
            scan: ScanState::new(),
            scan_line: false,
            started: false,
            registered: false,
            data_island: false,
            held: None,
            release: [None, None],
            scheduler: AudioScheduler::new(config.avi),
            audio: None,
        })
    }

    // ── Tick source ─────────────────────────────────────────────────────────

    /// Attach the tick handler and enable tick delivery.
    ///
    /// # Errors
    ///
    /// [`DviError::AlreadyRegistered`] while a registration is outstanding.
    pub fn register_tick_source(&mut self) -> Result<TickRegistration, DviError> {
        if self.registered {
            return Err(DviError::AlreadyRegistered);
        }
        self.registered = true;
        self.driver.set_tick_interrupt_enabled(true);
        #[cfg(feature = "defmt")]
        defmt::info!("dvi: tick source registered");
        #[cfg(feature = "tracing")]
        tracing::info!("dvi: tick source registered");
        Ok(TickRegistration {
            owner: self.identity(),
        })
    }

    /// Detach the tick handler.
    ///
    /// Tick delivery is disabled before the release slots are drained to the
    /// free pool, so no tick can still be using a buffer being freed.
    ///
    /// # Errors
    ///
    /// Hands `registration` back untouched if another engine issued it.
    pub fn unregister_tick_source(
        &mut self,
        registration: TickRegistration,
    ) -> Result<(), TickRegistration> {
        if !self.owns(&registration) {
            return Err(registration);
        }
        self.driver.set_tick_interrupt_enabled(false);
        self.registered = false;
        for slot in &mut self.release {
            if let Some(words) = slot.take() {
                self.pipeline.release_encoded(words);
            }
        }
        #[cfg(feature = "defmt")]
        defmt::info!("dvi: tick source unregistered");
        #[cfg(feature = "tracing")]
        tracing::info!("dvi: tick source unregistered");
        Ok(())
    }

    fn drain_to_pool(&mut self) {
        let held = self.held.take();
        for words in self.release.iter_mut().map(Option::take).chain([held]).flatten() {
            self.pipeline.release_encoded(words);
        }
    }

    fn identity(&self) -> usize {
        (self.pipeline as *const DviPipeline<N>) as usize
    }

    fn owns(&self, registration: &TickRegistration) -> bool {
        self.registered && registration.owner == self.identity()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Start transmitting.
    ///
    /// Rewinds the scan position to the start of the front porch, starts the
    /// DMA chains and spins until every serialiser FIFO is full before the
    /// serialisers are enabled, so the first symbols out are valid ones.
    /// Buffers the engine still holds from before a stop go back to the free
    /// pool. The frame counter keeps counting across restarts.
    pub fn start(&mut self) {
        if !self.started {
            // Nothing reads the buffers while stopped; a pair cut short by
            // `stop` must not resume at the top of the next frame.
            self.drain_to_pool();
        }
        self.scan.reset();
        self.driver.clear_fifos();
        self.driver.start();
        self.started = true;
        while !self.driver.tx_fifos_full() {
            core::hint::spin_loop();
        }
        self.driver.set_serialiser_enabled(true);
        #[cfg(feature = "defmt")]
        defmt::info!("dvi: started");
        #[cfg(feature = "tracing")]
        tracing::info!("dvi: started");
    }

    /// Stop transmitting. Buffer pools are left as they are.
    pub fn stop(&mut self) {
        self.driver.stop();
        self.driver.set_serialiser_enabled(false);
        self.started = false;
        #[cfg(feature = "defmt")]
        defmt::info!("dvi: stopped");
        #[cfg(feature = "tracing")]
        tracing::info!("dvi: stopped");
    }

    /// `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_started(&self) -> bool {
        self.started
    }

    // ── Tick handler ────────────────────────────────────────────────────────

    /// Handle one scan-line interrupt.
    ///
    /// A registration issued by another engine acknowledges the interrupt
    /// and does nothing else.
    pub fn on_tick(&mut self, registration: &TickRegistration) {
        self.driver.acknowledge_interrupt();
        if !self.started || !self.owns(registration) {
            return;
        }

        let prev_phase = self.scan.phase();
        self.scan.advance(&self.timing);
        self.driver
            .wait_for_last_block_transfer_to_start(&self.timing);

        if let Some(words) = self.release[1].take() {
            self.pipeline.release_encoded(words);
        }
        self.release[1] = self.release[0].take();

        let phase = self.scan.phase();
        let line = self.scan.counter();
        let (force_blank, line_pair_done) = if phase == LinePhase::Active {
            self.select_active_line(line)
        } else {
            // A pair cut short by an odd active line count ends here.
            self.release[0] = self.held.take();
            (false, false)
        };

        self.driver.update(
            phase,
            self.held.as_deref(),
            &self.timing,
            &self.blank,
            force_blank,
        );
        if line_pair_done {
            self.release[0] = self.held.take();
        }

        if self.data_island {
            let packet = self.scheduler.next_packet(
                phase,
                line,
                self.pipeline.frame_counter(),
                self.audio.as_mut(),
            );
            self.driver
                .update_next_data_packet(phase, &packet, &self.timing);
        }

        if prev_phase != phase && phase == LinePhase::Sync {
            self.pipeline.advance_frame();
        }
    }

    /// Pick the encoded buffer for active line `line`.
    ///
    /// Returns `(force_blank, line_pair_done)`; the held buffer must move to
    /// the release slots after the update when `line_pair_done` is set. The
    /// pair ends on its last line even when that line is in a margin.
    #[allow(clippy::arithmetic_side_effects)] // Safety: LINES_PER_BUFFER is a non-zero constant
    fn select_active_line(&mut self, line: u32) -> (bool, bool) {
        let line_pair_done = line % LINES_PER_BUFFER == LINES_PER_BUFFER - 1;
        if self.blank.is_blank(line, self.timing.v_active_lines) {
            return (true, line_pair_done);
        }
        if self.held.is_none() {
            self.held = self.pipeline.take_encoded_for_line(line);
        }
        let force_blank = self.scan_line && line & 1 == 1;
        (force_blank, line_pair_done)
    }

    // ── Configuration ───────────────────────────────────────────────────────

    /// Frames started since power-up.
    pub fn frame_counter(&self) -> u32 {
        self.pipeline.frame_counter()
    }

    /// Current blank margins.
    pub fn blank_settings(&self) -> &BlankSettings {
        &self.blank
    }

    /// Replace the blank margins. Takes effect from the next tick.
    ///
    /// # Errors
    ///
    /// [`DviError::Config`] if the margins would cover every active line.
    pub fn set_blank_settings(&mut self, blank: BlankSettings) -> Result<(), DviError> {
        blank.validate(self.timing.v_active_lines)?;
        self.blank = blank;
        #[cfg(feature = "defmt")]
        defmt::info!("dvi: blank margins top {} bottom {}", blank.top, blank.bottom);
        #[cfg(feature = "tracing")]
        tracing::info!("dvi: blank margins top {} bottom {}", blank.top, blank.bottom);
        Ok(())
    }

    /// Force every odd active line blank (scan-line effect).
    pub fn set_scan_line(&mut self, enable: bool) {
        self.scan_line = enable;
    }

    /// Configure the audio sample rate and clock regeneration values and
    /// switch the blanking interval to carry data islands.
    ///
    /// Returns the derived sample cadence.
    pub fn set_audio_freq(&mut self, rate: SampleRateHz, regen: ClockRegen) -> AudioCadence {
        let cadence = self.scheduler.configure(rate, regen, &self.timing);
        #[cfg(feature = "defmt")]
        defmt::info!(
            "dvi: audio {} Hz, CTS {}, N {}, {} samples/frame, {}/65536 samples/line",
            rate.get(),
            regen.cts(),
            regen.n(),
            cadence.samples_per_frame,
            cadence.samples_per_line_q16
        );
        #[cfg(feature = "tracing")]
        tracing::info!(
            "dvi: audio {} Hz, CTS {}, N {}, {} samples/frame, {}/65536 samples/line",
            rate.get(),
            regen.cts(),
            regen.n(),
            cadence.samples_per_frame,
            cadence.samples_per_line_q16
        );
        self.enable_data_island();
        cadence
    }

    fn enable_data_island(&mut self) {
        self.data_island = true;
        self.driver.enable_data_island();
    }

    /// Attach `storage` as the audio sample ring.
    ///
    /// Returns the one producer handle; the engine keeps the consumer.
    ///
    /// # Errors
    ///
    /// [`DviError::EmptyAudioBuffer`] for empty storage,
    /// [`DviError::AudioBufferAlreadyAllocated`] on a second call.
    pub fn allocate_audio_buffer(
        &mut self,
        storage: &'static mut [AudioSample],
    ) -> Result<SampleProducer<'p>, DviError> {
        #[cfg(any(feature = "defmt", feature = "tracing"))]
        let capacity = storage.len();
        let (producer, consumer) = self.pipeline.audio().split(storage)?;
        self.audio = Some(consumer);
        #[cfg(feature = "defmt")]
        defmt::info!("dvi: audio ring of {} samples", capacity);
        #[cfg(feature = "tracing")]
        tracing::info!("dvi: audio ring of {} samples", capacity);
        Ok(producer)
    }

    // ── Introspection ───────────────────────────────────────────────────────

    /// Snapshot of the encoded buffer pool, including the buffer on screen
    /// and those in the release slots.
    pub fn encoded_pool_stats(&self) -> PoolStats {
        let pending = self.release.iter().filter(|slot| slot.is_some()).count();
        PoolStats {
            held: usize::from(self.held.is_some()),
            pending_release: pending,
            ..self.pipeline.encoded_queue_stats()
        }
    }

    /// Current scan phase and line within it.
    pub fn scan_position(&self) -> (LinePhase, u32) {
        (self.scan.phase(), self.scan.counter())
    }

    /// Samples still expected before the next audio info frame.
    pub fn audio_samples_remaining_in_frame(&self) -> u32 {
        self.scheduler.samples_remaining_in_frame()
    }

    /// Pin and sink configuration.
    pub fn config(&self) -> &DviConfig {
        &self.config
    }

    /// Timing in use.
    pub fn timing(&self) -> &TimingDescriptor {
        &self.timing
    }

    /// The output driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The output driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: OutputDriver, const N: usize> Drop for Dvi<'_, D, N> {
    fn drop(&mut self) {
        self.pipeline.detach_engine();
    }
}
