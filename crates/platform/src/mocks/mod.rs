//! Mock implementations for testing
//!
//! Recording stand-ins for the [`OutputDriver`] and [`PixelEncoder`]
//! collaborators, for use in unit and integration tests of the realtime core.

#![cfg(any(test, feature = "std"))]

use core::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::*;

/// One recorded [`OutputDriver::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRecord {
    /// Phase passed by the core.
    pub phase: LinePhase,
    /// First word of the line buffer, if one was passed.
    pub first_word: Option<u32>,
    /// Address of the line buffer, if one was passed.
    pub addr: Option<usize>,
    /// Whether the core forced a blank line.
    pub force_blank: bool,
}

impl UpdateRecord {
    /// `true` when the hardware would transmit the blank line.
    pub fn is_blank(&self) -> bool {
        self.force_blank || self.addr.is_none()
    }
}

/// Output driver that records every call.
pub struct RecordingDriver {
    /// Every `update` call, in order.
    pub updates: Vec<UpdateRecord>,
    /// Every data-island packet, in order.
    pub packets: Vec<DataPacket>,
    /// DMA chains running.
    pub started: bool,
    /// Serialisers and clock gated on.
    pub serialiser_enabled: bool,
    /// Scan-line interrupt delivery enabled.
    pub tick_enabled: bool,
    /// Data-island layout enabled.
    pub data_island: bool,
    /// Interrupts acknowledged.
    pub acks: usize,
    /// FIFO clears requested.
    pub fifo_clears: usize,
    /// Calls to `wait_for_last_block_transfer_to_start`.
    pub block_waits: usize,
    fill_polls: usize,
    polls: Cell<usize>,
}

impl RecordingDriver {
    /// A driver whose FIFOs report full on the first poll.
    pub fn new() -> Self {
        Self::with_fill_polls(0)
    }

    /// A driver whose FIFOs report full only after `polls` unsuccessful polls.
    pub fn with_fill_polls(polls: usize) -> Self {
        Self {
            updates: Vec::new(),
            packets: Vec::new(),
            started: false,
            serialiser_enabled: false,
            tick_enabled: false,
            data_island: false,
            acks: 0,
            fifo_clears: 0,
            block_waits: 0,
            fill_polls: polls,
            polls: Cell::new(0),
        }
    }

    /// Number of FIFO polls made so far.
    pub fn fifo_polls(&self) -> usize {
        self.polls.get()
    }

    /// Forget recorded updates and packets.
    pub fn clear_history(&mut self) {
        self.updates.clear();
        self.packets.clear();
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDriver for RecordingDriver {
    fn update(
        &mut self,
        phase: LinePhase,
        line: Option<&[u32]>,
        _timing: &TimingDescriptor,
        _blank: &BlankSettings,
        force_blank: bool,
    ) {
        self.updates.push(UpdateRecord {
            phase,
            first_word: line.and_then(|words| words.first().copied()),
            addr: line.map(|words| words.as_ptr() as usize),
            force_blank,
        });
    }

    #[allow(clippy::arithmetic_side_effects)] // Mock counter; overflow not a concern in tests
    fn wait_for_last_block_transfer_to_start(&mut self, _timing: &TimingDescriptor) {
        self.block_waits += 1;
    }

    fn update_next_data_packet(
        &mut self,
        _phase: LinePhase,
        packet: &DataPacket,
        _timing: &TimingDescriptor,
    ) {
        self.packets.push(*packet);
    }

    fn enable_data_island(&mut self) {
        self.data_island = true;
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn stop(&mut self) {
        self.started = false;
    }

    #[allow(clippy::arithmetic_side_effects)] // Mock counter; overflow not a concern in tests
    fn clear_fifos(&mut self) {
        self.fifo_clears += 1;
        self.polls.set(0);
    }

    #[allow(clippy::arithmetic_side_effects)] // Mock counter; overflow not a concern in tests
    fn tx_fifos_full(&self) -> bool {
        let polls = self.polls.get();
        self.polls.set(polls + 1);
        polls >= self.fill_polls
    }

    fn set_serialiser_enabled(&mut self, enabled: bool) {
        self.serialiser_enabled = enabled;
    }

    fn set_tick_interrupt_enabled(&mut self, enabled: bool) {
        self.tick_enabled = enabled;
    }

    #[allow(clippy::arithmetic_side_effects)] // Mock counter; overflow not a concern in tests
    fn acknowledge_interrupt(&mut self) {
        self.acks += 1;
    }
}

/// Encoder that copies each source pixel into one destination word.
///
/// Lets tests tag a line by filling its pixels with a marker value and read
/// the marker back from [`UpdateRecord::first_word`].
#[derive(Default)]
pub struct CopyEncoder {
    destinations: RefCell<Vec<usize>>,
    formats: RefCell<Vec<PixelFormat>>,
}

impl CopyEncoder {
    /// New encoder with empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the destination buffer of every encode call, in order.
    pub fn destinations(&self) -> Vec<usize> {
        self.destinations.borrow().clone()
    }

    /// Format of every unscaled encode call, in order.
    pub fn formats(&self) -> Vec<PixelFormat> {
        self.formats.borrow().clone()
    }
}

impl PixelEncoder for CopyEncoder {
    fn encode(&self, format: PixelFormat, dst: &mut [u32], src: &[u16]) {
        self.destinations.borrow_mut().push(dst.as_ptr() as usize);
        self.formats.borrow_mut().push(format);
        for (word, &pixel) in dst.iter_mut().zip(src) {
            *word = u32::from(pixel);
        }
    }

    #[allow(clippy::arithmetic_side_effects)] // Test-only nearest-neighbour index
    fn encode_scaled(&self, dst: &mut [u32], _lane_stride: usize, src: &[u16], dst_pixels: usize) {
        self.destinations.borrow_mut().push(dst.as_ptr() as usize);
        for (i, word) in dst.iter_mut().take(dst_pixels).enumerate() {
            *word = src.get(i * 7 / 16).copied().map_or(0, u32::from);
        }
    }
}
