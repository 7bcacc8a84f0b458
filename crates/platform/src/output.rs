//! Output driver abstraction.
//!
//! The output driver owns the serialiser state machines, the DMA channels
//! that feed them and the PWM slice generating the TMDS clock. The realtime
//! core never touches a register: it issues the semantic calls below once
//! per scan line from the tick interrupt.
//!
//! # Contract
//!
//! Every per-tick method runs inside the scan-line interrupt and must return
//! within the line budget without blocking on anything a lower-priority
//! context could hold. None of them can fail: a driver that cannot honour a
//! request transmits a blank line instead.

use crate::config::BlankSettings;
use crate::packet::DataPacket;
use crate::timing::{LinePhase, TimingDescriptor};

/// Scan-line output driver.
pub trait OutputDriver {
    /// Program the transfer for the next line.
    ///
    /// `line` holds the encoded TMDS words for an active line, or `None`
    /// when no buffer is available. `None` or `force_blank` both produce the
    /// fixed blank-line transmission. The driver may keep reading `line`
    /// after returning; the caller guarantees the words stay untouched until
    /// the following call to
    /// [`wait_for_last_block_transfer_to_start`](Self::wait_for_last_block_transfer_to_start)
    /// has returned twice.
    fn update(
        &mut self,
        phase: LinePhase,
        line: Option<&[u32]>,
        timing: &TimingDescriptor,
        blank: &BlankSettings,
        force_blank: bool,
    );

    /// Spin until the hardware has begun transferring the final block of the
    /// line programmed by the previous [`update`](Self::update).
    fn wait_for_last_block_transfer_to_start(&mut self, timing: &TimingDescriptor);

    /// Program the data-island packet for the upcoming blanking window.
    fn update_next_data_packet(
        &mut self,
        phase: LinePhase,
        packet: &DataPacket,
        timing: &TimingDescriptor,
    );

    /// Switch the blanking-interval layout to carry data islands.
    fn enable_data_island(&mut self);

    /// Start the DMA chains feeding the serialisers.
    fn start(&mut self);

    /// Stop the DMA chains.
    fn stop(&mut self);

    /// Drop anything queued in the serialiser FIFOs.
    fn clear_fifos(&mut self);

    /// `true` once every lane's transmit FIFO is full.
    fn tx_fifos_full(&self) -> bool;

    /// Gate the serialisers and the TMDS clock.
    fn set_serialiser_enabled(&mut self, enabled: bool);

    /// Enable or disable delivery of the scan-line interrupt.
    fn set_tick_interrupt_enabled(&mut self, enabled: bool);

    /// Acknowledge the pending scan-line interrupt.
    fn acknowledge_interrupt(&mut self);
}
