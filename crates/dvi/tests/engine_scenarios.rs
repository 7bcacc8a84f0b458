//! Engine integration tests: drive the tick handler against the recording
//! output driver and check what reaches the screen.
//!
//! Each test provisions a fresh pipeline from leaked buffers, builds an
//! engine over a `RecordingDriver`, and feeds encoded lines with
//! `CopyEncoder`, which copies each source pixel into one output word. A
//! line tagged `t` is filled with the marker `t + 1`, so the first word the
//! driver sees identifies the buffer on screen.
//!
//! Run with: cargo test -p dvi --test engine_scenarios

// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

use std::collections::HashMap;

use dvi::{Dvi, DviError, DviPipeline, TickRegistration};
use embassy_futures::block_on;
use platform::mocks::{CopyEncoder, RecordingDriver};
use platform::timing::TIMING_640X480P60;
use platform::{BlankSettings, DviConfig, LinePhase, PixelFormat, BUFFER_COUNT};

const LINES_PER_FRAME: usize = 525;
/// Ticks from a fresh start (front porch, line 0) to active line 0.
const FIRST_ACTIVE_TICK: usize = 45;
const SOURCE_LINES: u16 = 240;

fn pipeline() -> &'static DviPipeline {
    let p: &'static DviPipeline = Box::leak(Box::new(DviPipeline::new()));
    let lines = core::array::from_fn(|_| Box::leak(vec![0u16; 640].into_boxed_slice()));
    let encoded = core::array::from_fn(|_| Box::leak(vec![0u32; 960].into_boxed_slice()));
    p.provision(lines, encoded, &TIMING_640X480P60)
        .expect("provisioning 640x480 pools should succeed");
    p
}

fn engine(p: &'static DviPipeline) -> Dvi<'static, RecordingDriver> {
    Dvi::new(p, RecordingDriver::new(), DviConfig::default(), TIMING_640X480P60)
        .expect("default config should be accepted")
}

fn started(p: &'static DviPipeline) -> (Dvi<'static, RecordingDriver>, TickRegistration) {
    let mut dvi = engine(p);
    let reg = dvi.register_tick_source().unwrap();
    dvi.start();
    (dvi, reg)
}

/// Encoder-side producer that publishes lines 0..240 in order, wrapping each
/// frame, whenever a free encoded buffer exists. Tags whose first line falls
/// in `margins` are skipped, since the engine never takes them.
struct Producer {
    encoder: CopyEncoder,
    next_tag: u16,
    pixels: Vec<u16>,
    margins: BlankSettings,
}

impl Producer {
    fn new() -> Self {
        Self::with_margins(BlankSettings::default())
    }

    fn with_margins(margins: BlankSettings) -> Self {
        Self {
            encoder: CopyEncoder::new(),
            next_tag: 0,
            pixels: vec![0; 640],
            margins,
        }
    }

    /// Publish at most `max` lines without blocking; returns how many.
    fn top_up(&mut self, dvi: &Dvi<'static, RecordingDriver>, p: &DviPipeline, max: usize) -> usize {
        let mut published = 0;
        while published < max && dvi.encoded_pool_stats().free > 0 {
            let tag = self.next_tag;
            self.next_tag = (tag + 1) % SOURCE_LINES;
            if self.margins.is_blank(u32::from(tag) * 2, 480) {
                continue;
            }
            self.pixels.fill(tag + 1);
            block_on(p.encode_explicit(&self.encoder, PixelFormat::Rgb565, tag, &self.pixels))
                .expect("full-width line");
            published += 1;
        }
        published
    }
}

/// Active line number for the tick at `index` (0-based from start).
fn active_line(index: usize) -> Option<u32> {
    let pos = (index + 1) % LINES_PER_FRAME;
    (pos >= FIRST_ACTIVE_TICK).then(|| (pos - FIRST_ACTIVE_TICK) as u32)
}

#[test]
fn test_no_producer_shows_blank_and_never_blocks() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    for _ in 0..LINES_PER_FRAME * 2 {
        dvi.on_tick(&reg);
    }
    let updates = &dvi.driver().updates;
    assert_eq!(updates.len(), LINES_PER_FRAME * 2);
    let active: Vec<_> = updates
        .iter()
        .filter(|u| u.phase == LinePhase::Active)
        .collect();
    assert_eq!(active.len(), 480 * 2);
    assert!(active.iter().all(|u| u.is_blank()), "active line not blank");
    assert_eq!(dvi.encoded_pool_stats().free, BUFFER_COUNT);
}

#[test]
fn test_tick_positions_match_timing() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    for i in 0..LINES_PER_FRAME {
        dvi.on_tick(&reg);
        let (phase, counter) = dvi.scan_position();
        match active_line(i) {
            Some(line) => {
                assert_eq!(phase, LinePhase::Active);
                assert_eq!(counter, line);
            }
            None => assert_ne!(phase, LinePhase::Active),
        }
    }
}

#[test]
fn test_buffers_shown_on_their_tagged_lines() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let mut producer = Producer::new();
    for _ in 0..LINES_PER_FRAME * 3 {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }

    let mut last_marker = 0;
    for (i, update) in dvi.driver().updates.iter().enumerate() {
        let Some(line) = active_line(i) else {
            assert!(update.addr.is_none(), "tick {i} outside active region");
            continue;
        };
        if line == 0 {
            last_marker = 0;
        }
        let marker = update.first_word.expect("fed producer leaves no gaps");
        assert_eq!(marker, line / 2 + 1, "tick {i} line {line}");
        assert!(marker >= last_marker, "marker went backwards at line {line}");
        last_marker = marker;
    }
}

#[test]
fn test_early_buffer_waits_for_its_line() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let enc = CopyEncoder::new();
    block_on(p.encode_explicit(&enc, PixelFormat::Rgb565, 10, &[11u16; 640])).unwrap();

    for i in 0..LINES_PER_FRAME {
        dvi.on_tick(&reg);
        let update = dvi.driver().updates[i];
        match active_line(i) {
            Some(20 | 21) => assert_eq!(update.first_word, Some(11), "tick {i}"),
            _ => assert!(update.is_blank(), "tick {i}"),
        }
    }
}

#[test]
fn test_late_buffer_waits_for_next_frame() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    // Run past active line 4 before publishing tag 2.
    for _ in 0..FIRST_ACTIVE_TICK + 6 {
        dvi.on_tick(&reg);
    }
    let enc = CopyEncoder::new();
    block_on(p.encode_explicit(&enc, PixelFormat::Rgb565, 2, &[3u16; 640])).unwrap();
    for _ in 0..LINES_PER_FRAME {
        dvi.on_tick(&reg);
    }
    let shown: Vec<_> = dvi
        .driver()
        .updates
        .iter()
        .enumerate()
        .filter(|(_, u)| !u.is_blank() && u.phase == LinePhase::Active)
        .map(|(i, _)| active_line(i))
        .collect();
    assert_eq!(shown, vec![Some(4), Some(5)]);
}

#[test]
fn test_release_delay_and_conservation() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let mut producer = Producer::new();
    let mut last_use: HashMap<usize, usize> = HashMap::new();
    let mut seen_destinations = 0;

    for tick in 0..LINES_PER_FRAME * 3 {
        producer.top_up(&dvi, p, usize::MAX);
        for &addr in &producer.encoder.destinations()[seen_destinations..] {
            if let Some(&used) = last_use.get(&addr) {
                assert!(
                    tick >= used + 3,
                    "buffer {addr:#x} reused before tick {tick} though shown at tick {used}"
                );
            }
        }
        seen_destinations = producer.encoder.destinations().len();

        dvi.on_tick(&reg);
        if let Some(addr) = dvi.driver().updates[tick].addr {
            last_use.insert(addr, tick);
        }

        let stats = dvi.encoded_pool_stats();
        assert_eq!(stats.total(), BUFFER_COUNT, "tick {tick}: {stats:?}");
        assert!(stats.held <= 1);
        assert!(stats.pending_release <= 2);
    }
}

#[test]
fn test_unregister_drains_release_slots() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let mut producer = Producer::new();
    for _ in 0..=FIRST_ACTIVE_TICK {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    // Active line 1 just finished the first pair.
    assert_eq!(dvi.scan_position(), (LinePhase::Active, 1));
    let before = dvi.encoded_pool_stats();
    assert_eq!(before.pending_release, 1);

    dvi.stop();
    dvi.unregister_tick_source(reg).unwrap();
    let after = dvi.encoded_pool_stats();
    assert_eq!(after.pending_release, 0);
    assert_eq!(after.free, before.free + 1);
    assert_eq!(after.total(), BUFFER_COUNT);
    assert!(!dvi.driver().tick_enabled);
}

#[test]
fn test_frame_counter_increments_on_sync_entry() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let start = dvi.frame_counter();
    for _ in 0..3 {
        for _ in 0..LINES_PER_FRAME {
            let before = dvi.frame_counter();
            dvi.on_tick(&reg);
            let entered_sync = dvi.scan_position() == (LinePhase::Sync, 0);
            assert_eq!(dvi.frame_counter() - before, u32::from(entered_sync));
        }
    }
    assert_eq!(dvi.frame_counter() - start, 3);
    assert_eq!(p.frame_counter(), dvi.frame_counter());
}

#[test]
fn test_frame_counter_survives_restart() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    for _ in 0..LINES_PER_FRAME {
        dvi.on_tick(&reg);
    }
    dvi.stop();
    dvi.start();
    assert_eq!(dvi.frame_counter(), 1);
    assert_eq!(dvi.scan_position(), (LinePhase::FrontPorch, 0));
}

#[test]
fn test_blank_margins_force_blank() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let margins = BlankSettings { top: 8, bottom: 8 };
    dvi.set_blank_settings(margins).unwrap();
    let mut producer = Producer::with_margins(margins);
    for _ in 0..LINES_PER_FRAME {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    for (i, update) in dvi.driver().updates.iter().enumerate() {
        if let Some(line) = active_line(i) {
            let in_margin = !(8..472).contains(&line);
            assert_eq!(update.force_blank, in_margin, "line {line}");
        }
    }
}

#[test]
fn test_odd_margins_end_pairs_and_keep_order() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let margins = BlankSettings { top: 3, bottom: 1 };
    dvi.set_blank_settings(margins).unwrap();
    let mut producer = Producer::with_margins(margins);
    for _ in 0..LINES_PER_FRAME * 3 {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
        assert_eq!(dvi.encoded_pool_stats().total(), BUFFER_COUNT);
    }
    for (i, update) in dvi.driver().updates.iter().enumerate() {
        let Some(line) = active_line(i) else {
            assert!(update.addr.is_none(), "tick {i} holds a buffer outside active");
            continue;
        };
        match line {
            0..=2 | 479 => assert!(update.force_blank, "line {line} inside margin"),
            // Second half of a pair whose first line is in the margin.
            3 => assert!(update.is_blank(), "line 3 has no buffer"),
            _ => assert_eq!(update.first_word, Some(line / 2 + 1), "tick {i} line {line}"),
        }
    }
}

#[test]
fn test_margin_change_mid_pair_releases_held_buffer() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let mut producer = Producer::new();
    let line_100 = FIRST_ACTIVE_TICK + 100;
    for _ in 0..line_100 {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    assert_eq!(dvi.scan_position(), (LinePhase::Active, 100));
    assert_eq!(dvi.encoded_pool_stats().held, 1);

    // Line 101 falls in the new bottom margin.
    dvi.set_blank_settings(BlankSettings { top: 0, bottom: 379 })
        .unwrap();
    producer.top_up(&dvi, p, usize::MAX);
    dvi.on_tick(&reg);
    let stats = dvi.encoded_pool_stats();
    assert_eq!((stats.held, stats.pending_release), (0, 1));
    assert!(dvi.driver().updates[line_100].force_blank);

    dvi.set_blank_settings(BlankSettings::default()).unwrap();
    for _ in 0..LINES_PER_FRAME * 2 {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    for (i, update) in dvi.driver().updates.iter().enumerate() {
        if let (Some(line), false) = (active_line(i), i == line_100) {
            assert_eq!(update.first_word, Some(line / 2 + 1), "tick {i} line {line}");
        }
    }
}

#[test]
fn test_margins_covering_active_region_rejected() {
    let p = pipeline();
    let mut dvi = engine(p);
    let err = dvi
        .set_blank_settings(BlankSettings {
            top: 240,
            bottom: 240,
        })
        .err();
    assert!(matches!(err, Some(DviError::Config(_))));
    assert_eq!(*dvi.blank_settings(), BlankSettings::default());
}

#[test]
fn test_restart_mid_pair_does_not_resume_stale_buffer() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let mut producer = Producer::new();
    for _ in 0..FIRST_ACTIVE_TICK {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    assert_eq!(dvi.scan_position(), (LinePhase::Active, 0));
    assert_eq!(dvi.encoded_pool_stats().held, 1);

    dvi.stop();
    dvi.start();
    let stats = dvi.encoded_pool_stats();
    assert_eq!((stats.held, stats.pending_release), (0, 0));
    assert_eq!(stats.total(), BUFFER_COUNT);

    let restart = dvi.driver().updates.len();
    for _ in 0..LINES_PER_FRAME {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    for (i, update) in dvi.driver().updates[restart..].iter().enumerate() {
        if let (Some(line), Some(marker)) = (active_line(i), update.first_word) {
            assert_eq!(marker, line / 2 + 1, "line {line} after restart");
        }
    }
}

#[test]
fn test_registration_only_drives_its_own_engine() {
    let (pa, pb) = (pipeline(), pipeline());
    let (mut a, reg_a) = started(pa);
    let (mut b, reg_b) = started(pb);

    b.on_tick(&reg_a);
    assert_eq!(b.driver().acks, 1);
    assert!(b.driver().updates.is_empty());

    let reg_a = b.unregister_tick_source(reg_a).unwrap_err();
    assert!(b.driver().tick_enabled);
    a.unregister_tick_source(reg_a).unwrap();
    b.unregister_tick_source(reg_b).unwrap();
    assert!(!a.driver().tick_enabled && !b.driver().tick_enabled);
}

#[test]
fn test_one_engine_per_pipeline() {
    let p = pipeline();
    let first = engine(p);
    let second = Dvi::new(p, RecordingDriver::new(), DviConfig::default(), TIMING_640X480P60);
    assert_eq!(second.err(), Some(DviError::PipelineInUse));
    drop(first);
    assert!(Dvi::new(p, RecordingDriver::new(), DviConfig::default(), TIMING_640X480P60).is_ok());
}

#[test]
fn test_scan_line_mode_blanks_odd_lines() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    dvi.set_scan_line(true);
    let mut producer = Producer::new();
    for _ in 0..LINES_PER_FRAME {
        producer.top_up(&dvi, p, usize::MAX);
        dvi.on_tick(&reg);
    }
    for (i, update) in dvi.driver().updates.iter().enumerate() {
        if let Some(line) = active_line(i) {
            assert_eq!(update.force_blank, line % 2 == 1, "line {line}");
            if line % 2 == 0 {
                assert_eq!(update.first_word, Some(line / 2 + 1));
            }
        }
    }
}

#[test]
fn test_ticks_while_stopped_are_acknowledged_and_ignored() {
    let p = pipeline();
    let mut dvi = engine(p);
    let reg = dvi.register_tick_source().unwrap();
    for _ in 0..10 {
        dvi.on_tick(&reg);
    }
    assert_eq!(dvi.driver().acks, 10);
    assert!(dvi.driver().updates.is_empty());
    assert_eq!(dvi.scan_position(), (LinePhase::FrontPorch, 0));
}

#[test]
fn test_start_waits_for_full_fifos() {
    let p = pipeline();
    let mut dvi = Dvi::new(
        p,
        RecordingDriver::with_fill_polls(3),
        DviConfig::default(),
        TIMING_640X480P60,
    )
    .unwrap();
    dvi.start();
    let driver = dvi.driver();
    assert_eq!(driver.fifo_clears, 1);
    assert_eq!(driver.fifo_polls(), 4);
    assert!(driver.started);
    assert!(driver.serialiser_enabled);

    dvi.stop();
    assert!(!dvi.driver().started);
    assert!(!dvi.driver().serialiser_enabled);
    assert!(!dvi.is_started());
}

#[test]
fn test_second_registration_rejected() {
    let p = pipeline();
    let mut dvi = engine(p);
    let reg = dvi.register_tick_source().unwrap();
    assert!(dvi.driver().tick_enabled);
    assert_eq!(
        dvi.register_tick_source().err(),
        Some(DviError::AlreadyRegistered)
    );
    dvi.unregister_tick_source(reg).unwrap();
    let again = dvi.register_tick_source();
    assert!(again.is_ok());
}

#[test]
fn test_engine_rejects_unprovisioned_pipeline() {
    let p: &'static DviPipeline = Box::leak(Box::new(DviPipeline::new()));
    let err = Dvi::new(p, RecordingDriver::new(), DviConfig::default(), TIMING_640X480P60).err();
    assert_eq!(err, Some(DviError::NotProvisioned));
}

#[test]
fn test_engine_rejects_bad_pins() {
    let p = pipeline();
    let cfg = DviConfig {
        clock_pin: 13,
        ..DviConfig::default()
    };
    assert!(matches!(
        Dvi::new(p, RecordingDriver::new(), cfg, TIMING_640X480P60),
        Err(DviError::Config(_))
    ));
}

#[tokio::test]
async fn test_line_producer_round_trip() {
    let p = pipeline();
    let (mut dvi, reg) = started(p);
    let enc = CopyEncoder::new();

    for tag in 0..3u16 {
        let pixels = p.acquire_line_buffer().await;
        pixels.fill(tag + 100);
        p.submit_line_buffer(tag, pixels).await;
    }
    p.wait_for_ready_line().await;
    for _ in 0..3 {
        p.consume_from_queue(&enc, PixelFormat::Rgb555).await;
    }
    assert_eq!(p.line_pool_stats().free, BUFFER_COUNT);

    for _ in 0..FIRST_ACTIVE_TICK + 6 {
        dvi.on_tick(&reg);
    }
    let shown: Vec<_> = dvi
        .driver()
        .updates
        .iter()
        .filter_map(|u| u.first_word)
        .collect();
    assert_eq!(shown, vec![100, 100, 101, 101, 102, 102]);
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

    /// Whatever the producer's pacing, a buffer is only ever shown on the two
    /// lines its tag names, and no buffer is lost.
    #[test]
    fn prop_irregular_producer_never_misorders(pacing in proptest::collection::vec(0usize..3, 64)) {
        let p = pipeline();
        let (mut dvi, reg) = started(p);
        let mut producer = Producer::new();
        for tick in 0..LINES_PER_FRAME * 2 {
            producer.top_up(&dvi, p, pacing[tick % pacing.len()]);
            dvi.on_tick(&reg);
            let update = dvi.driver().updates[tick];
            if let (Some(line), Some(marker)) = (active_line(tick), update.first_word) {
                proptest::prop_assert_eq!(marker, line / 2 + 1);
            }
            proptest::prop_assert_eq!(dvi.encoded_pool_stats().total(), BUFFER_COUNT);
        }
    }
}
