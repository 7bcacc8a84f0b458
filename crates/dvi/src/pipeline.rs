//! Line and encoded buffer pools shared between producer tasks and the tick.
//!
//! ## Buffer flow
//!
//! ```text
//!  producer                encode worker                     tick interrupt
//!  ────────                ─────────────                     ──────────────
//!  acquire_line_buffer ◄── free_lines ◄──────────┐
//!        │                                       │ recycle
//!  submit_line_buffer ──► ready_lines ──► encode ┘
//!                                          │  ▲
//!                          free_encoded ───┘  │ publish
//!                              ▲              ▼
//!                              │         ready_encoded ──► held ──► release
//!                              └──────────────────────────────────── slots
//! ```
//!
//! Every buffer handed out is `&'static mut`, so a buffer has exactly one
//! owner at any time: a queue, the producer, the encoder, or the engine.
//! The pipeline counts buffers on loan to producers and the encoder; the
//! engine accounts for the buffers it holds or is about to release. Together
//! they always add up to the pool size.
//!
//! Tags are source line numbers. One encoded buffer covers
//! [`LINES_PER_BUFFER`] physical lines, so the buffer tagged `n` is shown
//! from active line `2 * n`.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::{
    encoded_buffer_words, encoded_lane_words, line_buffer_pixels, PixelEncoder, PixelFormat,
    TimingDescriptor, BLANK_TMDS_WORD, BUFFER_COUNT, LINES_PER_BUFFER,
};

use crate::error::DviError;
use crate::queue::BufferQueue;
use crate::ring_buffer::SampleRing;

/// A filled line buffer waiting to be encoded.
struct TaggedLine {
    line: u16,
    pixels: &'static mut [u16],
}

/// An encoded buffer waiting for its line.
struct TaggedEncoded {
    line: u16,
    words: &'static mut [u32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    line_pixels: usize,
    lane_words: usize,
    encoded_words: usize,
}

impl Geometry {
    const fn of(timing: &TimingDescriptor) -> Self {
        Self {
            line_pixels: line_buffer_pixels(timing),
            lane_words: encoded_lane_words(timing),
            encoded_words: encoded_buffer_words(timing),
        }
    }
}

/// Count of buffers out of any queue, held by producer tasks or the encoder.
struct LoanCount(Mutex<CriticalSectionRawMutex, Cell<usize>>);

impl LoanCount {
    const fn new() -> Self {
        Self(Mutex::new(Cell::new(0)))
    }

    fn lend(&self) {
        self.0.lock(|n| n.set(n.get().saturating_add(1)));
    }

    fn settle(&self) {
        self.0.lock(|n| n.set(n.get().saturating_sub(1)));
    }

    fn get(&self) -> usize {
        self.0.lock(Cell::get)
    }
}

/// Where every buffer of one pool is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolStats {
    /// In the free queue.
    pub free: usize,
    /// In the ready queue.
    pub ready: usize,
    /// On loan to a producer task or the encoder.
    pub on_loan: usize,
    /// Held by the tick for the current line pair.
    pub held: usize,
    /// In the release delay slots.
    pub pending_release: usize,
}

impl PoolStats {
    /// Buffers accounted for; equals the pool size whenever no transfer is
    /// mid-flight.
    pub fn total(&self) -> usize {
        self.free
            .saturating_add(self.ready)
            .saturating_add(self.on_loan)
            .saturating_add(self.held)
            .saturating_add(self.pending_release)
    }
}

/// Pixel span for the 16:7 scaled encoders.
///
/// Offsets are rounded down to an even pixel since encoded words carry two
/// pixels each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScaledSpan {
    /// First source pixel to read.
    pub src_pixel_offset: usize,
    /// First output pixel to write.
    pub dst_pixel_offset: usize,
    /// Output pixels to produce.
    pub dst_pixels: usize,
}

impl ScaledSpan {
    /// Align the offsets and check the span fits a `src_len`-pixel source
    /// and a `line_pixels`-pixel output line.
    fn checked(self, src_len: usize, line_pixels: usize) -> Result<Self, DviError> {
        let span = Self {
            src_pixel_offset: self.src_pixel_offset & !1,
            dst_pixel_offset: self.dst_pixel_offset & !1,
            dst_pixels: self.dst_pixels,
        };
        let dst_end = span.dst_pixel_offset.checked_add(span.dst_pixels);
        if span.src_pixel_offset >= src_len || dst_end.map_or(true, |end| end > line_pixels) {
            return Err(DviError::ScaledSpanOutOfBounds);
        }
        Ok(span)
    }

    /// First encoded word written.
    #[allow(clippy::arithmetic_side_effects)] // Safety: constant non-zero divisor
    fn dst_word(&self) -> usize {
        self.dst_pixel_offset / 2
    }
}

/// Buffer pools of `N` line buffers and `N` encoded buffers, plus the audio
/// sample ring and the frame counter.
///
/// Lives in a `static`; producer tasks, the encode worker and the engine all
/// share it by reference.
pub struct DviPipeline<const N: usize = BUFFER_COUNT> {
    free_lines: BufferQueue<&'static mut [u16], N>,
    ready_lines: BufferQueue<TaggedLine, N>,
    free_encoded: BufferQueue<&'static mut [u32], N>,
    ready_encoded: BufferQueue<TaggedEncoded, N>,
    lines_on_loan: LoanCount,
    encoded_on_loan: LoanCount,
    geometry: Mutex<CriticalSectionRawMutex, Cell<Option<Geometry>>>,
    engine_attached: Mutex<CriticalSectionRawMutex, Cell<bool>>,
    frame_counter: AtomicU32,
    audio: SampleRing,
}

impl<const N: usize> DviPipeline<N> {
    /// Empty pipeline, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            free_lines: BufferQueue::new(),
            ready_lines: BufferQueue::new(),
            free_encoded: BufferQueue::new(),
            ready_encoded: BufferQueue::new(),
            lines_on_loan: LoanCount::new(),
            encoded_on_loan: LoanCount::new(),
            geometry: Mutex::new(Cell::new(None)),
            engine_attached: Mutex::new(Cell::new(false)),
            frame_counter: AtomicU32::new(0),
            audio: SampleRing::new(),
        }
    }

    /// Hand the pools their buffers, sized for `timing`.
    ///
    /// Each line buffer must hold `h_active` pixels and each encoded buffer
    /// `h_active / 2 * 3` words. Encoded buffers are filled with the blank
    /// symbol so one shown before it was ever encoded is black.
    ///
    /// # Errors
    ///
    /// - [`DviError::Config`] if `timing` is invalid.
    /// - [`DviError::BufferSizeMismatch`] if a buffer has the wrong length.
    /// - [`DviError::AlreadyProvisioned`] on a second call.
    pub fn provision(
        &self,
        lines: [&'static mut [u16]; N],
        encoded: [&'static mut [u32]; N],
        timing: &TimingDescriptor,
    ) -> Result<(), DviError> {
        timing.validate()?;
        let geometry = Geometry::of(timing);
        for buf in &lines {
            check_len(geometry.line_pixels, buf.len())?;
        }
        for buf in &encoded {
            check_len(geometry.encoded_words, buf.len())?;
        }
        if self.geometry.lock(|g| g.replace(Some(geometry))).is_some() {
            return Err(DviError::AlreadyProvisioned);
        }

        for buf in lines {
            // Fresh queue of capacity N: cannot be full.
            let _ = self.free_lines.try_enqueue(buf);
        }
        for buf in encoded {
            buf.fill(BLANK_TMDS_WORD);
            let _ = self.free_encoded.try_enqueue(buf);
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "pipeline: {} x {} px line buffers, {} x {} word encoded buffers",
            N,
            geometry.line_pixels,
            N,
            geometry.encoded_words
        );
        #[cfg(feature = "tracing")]
        tracing::info!(
            "pipeline: {} x {} px line buffers, {} x {} word encoded buffers",
            N,
            geometry.line_pixels,
            N,
            geometry.encoded_words
        );
        Ok(())
    }

    fn geometry(&self) -> Result<Geometry, DviError> {
        self.geometry.lock(Cell::get).ok_or(DviError::NotProvisioned)
    }

    /// Check the pools were provisioned for `timing`.
    pub(crate) fn check_geometry(&self, timing: &TimingDescriptor) -> Result<(), DviError> {
        let expected = Geometry::of(timing);
        let actual = self.geometry()?;
        check_len(expected.line_pixels, actual.line_pixels)?;
        check_len(expected.encoded_words, actual.encoded_words)
    }

    // ── Producer API ────────────────────────────────────────────────────────

    /// Take a free line buffer, waiting until one is available.
    pub async fn acquire_line_buffer(&self) -> &'static mut [u16] {
        self.free_lines
            .dequeue_and(|| self.lines_on_loan.lend())
            .await
    }

    /// Queue a filled line buffer for encoding as source line `line`.
    ///
    /// `pixels` must be a buffer obtained from
    /// [`acquire_line_buffer`](Self::acquire_line_buffer).
    pub async fn submit_line_buffer(&self, line: u16, pixels: &'static mut [u16]) {
        self.ready_lines
            .enqueue_and(TaggedLine { line, pixels }, || self.lines_on_loan.settle())
            .await;
    }

    /// Wait until at least one submitted line is waiting to be encoded.
    pub async fn wait_for_ready_line(&self) {
        self.ready_lines.wait_until_content_available().await;
    }

    /// Frames started since power-up.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter.load(Ordering::Acquire)
    }

    // ── Encode worker API ───────────────────────────────────────────────────

    /// Encode the next submitted line into a free encoded buffer and publish
    /// it. Returns the line's tag.
    pub async fn consume_from_queue<E>(&self, encoder: &E, format: PixelFormat) -> u16
    where
        E: PixelEncoder + ?Sized,
    {
        let words = self.take_free_encoded().await;
        let TaggedLine { line, pixels } = self.take_ready_line().await;
        encoder.encode(format, words, pixels);
        self.finish(line, words, Some(pixels)).await;
        line
    }

    /// Encode caller-owned `pixels` as source line `line` and publish it.
    ///
    /// # Errors
    ///
    /// [`DviError::BufferSizeMismatch`] unless `pixels` holds exactly one
    /// line, [`DviError::NotProvisioned`] before
    /// [`provision`](Self::provision). Nothing is dequeued on error.
    pub async fn encode_explicit<E>(
        &self,
        encoder: &E,
        format: PixelFormat,
        line: u16,
        pixels: &[u16],
    ) -> Result<(), DviError>
    where
        E: PixelEncoder + ?Sized,
    {
        check_len(self.geometry()?.line_pixels, pixels.len())?;
        let words = self.take_free_encoded().await;
        encoder.encode(format, words, pixels);
        self.finish(line, words, None).await;
        Ok(())
    }

    /// Encode `span` of the next submitted line with the 16:7 upscale and
    /// publish it. Returns the line's tag.
    ///
    /// # Errors
    ///
    /// [`DviError::ScaledSpanOutOfBounds`] if the span does not fit the line,
    /// [`DviError::NotProvisioned`] before [`provision`](Self::provision).
    /// Nothing is dequeued on error.
    pub async fn consume_scaled_from_queue<E>(
        &self,
        encoder: &E,
        span: ScaledSpan,
    ) -> Result<u16, DviError>
    where
        E: PixelEncoder + ?Sized,
    {
        let geometry = self.geometry()?;
        let span = span.checked(geometry.line_pixels, geometry.line_pixels)?;
        let words = self.take_free_encoded().await;
        let TaggedLine { line, pixels } = self.take_ready_line().await;
        encode_span(encoder, words, pixels, span, geometry.lane_words);
        self.finish(line, words, Some(pixels)).await;
        Ok(line)
    }

    /// Encode `span` of caller-owned `pixels` with the 16:7 upscale as source
    /// line `line` and publish it.
    ///
    /// # Errors
    ///
    /// As for [`consume_scaled_from_queue`](Self::consume_scaled_from_queue).
    pub async fn encode_scaled_explicit<E>(
        &self,
        encoder: &E,
        line: u16,
        pixels: &[u16],
        span: ScaledSpan,
    ) -> Result<(), DviError>
    where
        E: PixelEncoder + ?Sized,
    {
        let geometry = self.geometry()?;
        let span = span.checked(pixels.len(), geometry.line_pixels)?;
        let words = self.take_free_encoded().await;
        encode_span(encoder, words, pixels, span, geometry.lane_words);
        self.finish(line, words, None).await;
        Ok(())
    }

    /// Encode submitted lines forever. Spawn as the encode worker task.
    pub async fn run_encode_loop<E>(&self, encoder: &E, format: PixelFormat)
    where
        E: PixelEncoder + ?Sized,
    {
        loop {
            self.consume_from_queue(encoder, format).await;
        }
    }

    async fn take_free_encoded(&self) -> &'static mut [u32] {
        self.free_encoded
            .dequeue_and(|| self.encoded_on_loan.lend())
            .await
    }

    async fn take_ready_line(&self) -> TaggedLine {
        self.ready_lines
            .dequeue_and(|| self.lines_on_loan.lend())
            .await
    }

    /// Publish an encoded buffer and recycle its source line buffer, if it
    /// came from the pool.
    ///
    /// Each buffer leaves the loan count in the same critical section that
    /// queues it, so a snapshot never counts it twice.
    async fn finish(&self, line: u16, words: &'static mut [u32], source: Option<&'static mut [u16]>) {
        self.ready_encoded
            .enqueue_and(TaggedEncoded { line, words }, || self.encoded_on_loan.settle())
            .await;
        if let Some(pixels) = source {
            self.free_lines
                .enqueue_and(pixels, || self.lines_on_loan.settle())
                .await;
        }
    }

    // ── Tick side ───────────────────────────────────────────────────────────

    /// Dequeue the ready encoded buffer if its tag is due on active line
    /// `counter`. Never waits.
    pub(crate) fn take_encoded_for_line(&self, counter: u32) -> Option<&'static mut [u32]> {
        self.ready_encoded
            .dequeue_if(|head| u32::from(head.line).saturating_mul(LINES_PER_BUFFER) == counter)
            .map(|tagged| tagged.words)
    }

    /// Return an encoded buffer to the free pool. Never waits.
    pub(crate) fn release_encoded(&self, words: &'static mut [u32]) {
        if self.free_encoded.try_enqueue(words).is_err() {
            // Only possible with a buffer that never came from this pool.
            #[cfg(feature = "defmt")]
            defmt::error!("encoded free pool overflow, buffer dropped");
            #[cfg(feature = "tracing")]
            tracing::error!("encoded free pool overflow, buffer dropped");
        }
    }

    /// Claim the tick side for one engine.
    pub(crate) fn attach_engine(&self) -> Result<(), DviError> {
        if self.engine_attached.lock(|attached| attached.replace(true)) {
            return Err(DviError::PipelineInUse);
        }
        Ok(())
    }

    pub(crate) fn detach_engine(&self) {
        self.engine_attached.lock(|attached| attached.set(false));
    }

    /// One frame has started.
    pub(crate) fn advance_frame(&self) {
        // Single writer (the tick), so load + store cannot lose an update.
        let frames = self.frame_counter.load(Ordering::Relaxed);
        self.frame_counter.store(frames.wrapping_add(1), Ordering::Release);
    }

    pub(crate) fn audio(&self) -> &SampleRing {
        &self.audio
    }

    // ── Statistics ──────────────────────────────────────────────────────────

    /// Snapshot of the line buffer pool.
    pub fn line_pool_stats(&self) -> PoolStats {
        critical_section::with(|_| PoolStats {
            free: self.free_lines.len(),
            ready: self.ready_lines.len(),
            on_loan: self.lines_on_loan.get(),
            held: 0,
            pending_release: 0,
        })
    }

    /// Snapshot of the encoded pool as seen from the queues; the engine adds
    /// its held and pending buffers.
    pub(crate) fn encoded_queue_stats(&self) -> PoolStats {
        critical_section::with(|_| PoolStats {
            free: self.free_encoded.len(),
            ready: self.ready_encoded.len(),
            on_loan: self.encoded_on_loan.get(),
            held: 0,
            pending_release: 0,
        })
    }

    /// Pool size.
    pub const fn buffer_count(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for DviPipeline<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_len(expected: usize, actual: usize) -> Result<(), DviError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DviError::BufferSizeMismatch { expected, actual })
    }
}

fn encode_span<E>(encoder: &E, words: &mut [u32], pixels: &[u16], span: ScaledSpan, lane_words: usize)
where
    E: PixelEncoder + ?Sized,
{
    if let (Some(dst), Some(src)) = (
        words.get_mut(span.dst_word()..),
        pixels.get(span.src_pixel_offset..),
    ) {
        encoder.encode_scaled(dst, lane_words, src, span.dst_pixels);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use platform::mocks::CopyEncoder;
    use platform::timing::TIMING_640X480P60;

    fn leak_lines<const N: usize>(len: usize) -> [&'static mut [u16]; N] {
        core::array::from_fn(|_| Box::leak(vec![0u16; len].into_boxed_slice()))
    }

    fn leak_encoded<const N: usize>(len: usize) -> [&'static mut [u32]; N] {
        core::array::from_fn(|_| Box::leak(vec![0u32; len].into_boxed_slice()))
    }

    fn provisioned() -> &'static DviPipeline<3> {
        let p: &'static DviPipeline<3> = Box::leak(Box::new(DviPipeline::new()));
        p.provision(leak_lines(640), leak_encoded(960), &TIMING_640X480P60)
            .unwrap();
        p
    }

    #[test]
    fn provision_rejects_wrong_sizes() {
        let p: DviPipeline<2> = DviPipeline::new();
        assert_eq!(
            p.provision(leak_lines(320), leak_encoded(960), &TIMING_640X480P60),
            Err(DviError::BufferSizeMismatch {
                expected: 640,
                actual: 320
            })
        );
        // Rejected provisioning does not count.
        assert!(p
            .provision(leak_lines(640), leak_encoded(960), &TIMING_640X480P60)
            .is_ok());
        assert_eq!(
            p.provision(leak_lines(640), leak_encoded(960), &TIMING_640X480P60),
            Err(DviError::AlreadyProvisioned)
        );
    }

    #[test]
    fn provision_blanks_encoded_buffers() {
        let p = provisioned();
        let words = p.free_encoded.try_dequeue().unwrap();
        assert!(words.iter().all(|&w| w == BLANK_TMDS_WORD));
    }

    #[tokio::test]
    async fn queued_encode_publishes_tag_and_recycles_line() {
        let p = provisioned();
        let enc = CopyEncoder::new();
        let pixels = p.acquire_line_buffer().await;
        pixels.fill(0x1234);
        assert_eq!(p.line_pool_stats().on_loan, 1);
        p.submit_line_buffer(7, pixels).await;

        assert_eq!(p.consume_from_queue(&enc, PixelFormat::Rgb565).await, 7);
        assert_eq!(
            p.line_pool_stats(),
            PoolStats {
                free: 3,
                ..PoolStats::default()
            }
        );
        assert!(p.take_encoded_for_line(13).is_none());
        let words = p.take_encoded_for_line(14).unwrap();
        assert_eq!(words[0], 0x1234);
    }

    #[tokio::test]
    async fn explicit_encode_leaves_line_pool_alone() {
        let p = provisioned();
        let enc = CopyEncoder::new();
        p.encode_explicit(&enc, PixelFormat::Rgb444, 2, &[5u16; 640])
            .await
            .unwrap();
        assert_eq!(p.line_pool_stats().free, 3);
        assert_eq!(p.encoded_queue_stats().ready, 1);
        assert_eq!(enc.formats(), vec![PixelFormat::Rgb444]);
    }

    #[tokio::test]
    async fn scaled_span_rounds_offsets_down_to_even() {
        let p = provisioned();
        let enc = CopyEncoder::new();
        let span = ScaledSpan {
            src_pixel_offset: 3,
            dst_pixel_offset: 5,
            dst_pixels: 100,
        };
        p.encode_scaled_explicit(&enc, 0, &[1u16; 320], span)
            .await
            .unwrap();
        let words = p.take_encoded_for_line(0).unwrap();
        // dst offset 5 -> 4 -> word 2
        assert_eq!(enc.destinations()[0], words.as_ptr() as usize + 2 * 4);
        assert_eq!(words[1], BLANK_TMDS_WORD);
        assert_eq!(words[2], 1);
    }

    #[tokio::test]
    async fn scaled_span_past_line_end_rejected_without_dequeue() {
        let p = provisioned();
        let enc = CopyEncoder::new();
        let span = ScaledSpan {
            src_pixel_offset: 0,
            dst_pixel_offset: 600,
            dst_pixels: 100,
        };
        assert_eq!(
            p.consume_scaled_from_queue(&enc, span).await,
            Err(DviError::ScaledSpanOutOfBounds)
        );
        assert_eq!(p.encoded_queue_stats().free, 3);
    }

    #[tokio::test]
    async fn scaled_encode_before_provision_fails() {
        let p: DviPipeline<2> = DviPipeline::new();
        let span = ScaledSpan {
            src_pixel_offset: 0,
            dst_pixel_offset: 0,
            dst_pixels: 10,
        };
        assert_eq!(
            p.encode_scaled_explicit(&CopyEncoder::new(), 0, &[0; 16], span)
                .await,
            Err(DviError::NotProvisioned)
        );
    }

    #[tokio::test]
    async fn explicit_encode_rejects_short_line_without_dequeue() {
        let p = provisioned();
        let enc = CopyEncoder::new();
        assert_eq!(
            p.encode_explicit(&enc, PixelFormat::Rgb565, 0, &[0u16; 320])
                .await,
            Err(DviError::BufferSizeMismatch {
                expected: 640,
                actual: 320
            })
        );
        assert_eq!(p.encoded_queue_stats().free, 3);
        assert!(enc.destinations().is_empty());
    }

    #[tokio::test]
    async fn pool_totals_hold_at_every_await() {
        let p = provisioned();
        let enc = CopyEncoder::new();
        let ((), ()) = tokio::join!(
            async {
                for tag in 0..3u16 {
                    let pixels = p.acquire_line_buffer().await;
                    p.submit_line_buffer(tag, pixels).await;
                    tokio::task::yield_now().await;
                }
            },
            async {
                for _ in 0..3 {
                    p.consume_from_queue(&enc, PixelFormat::Rgb565).await;
                    assert_eq!(p.line_pool_stats().total(), 3);
                    assert_eq!(p.encoded_queue_stats().total(), 3);
                }
            }
        );
        let encoded = p.encoded_queue_stats();
        assert_eq!((encoded.ready, encoded.total()), (3, 3));
    }

    #[test]
    fn second_engine_is_refused() {
        let p: DviPipeline<1> = DviPipeline::new();
        assert_eq!(p.attach_engine(), Ok(()));
        assert_eq!(p.attach_engine(), Err(DviError::PipelineInUse));
        p.detach_engine();
        assert_eq!(p.attach_engine(), Ok(()));
    }

    #[test]
    fn frame_counter_advances() {
        let p: DviPipeline<1> = DviPipeline::new();
        p.advance_frame();
        p.advance_frame();
        assert_eq!(p.frame_counter(), 2);
    }
}
