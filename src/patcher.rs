//! In-flight rewrite of the power-steering sensor message.
//!
//! The steering unit drops its assist torque and nags the driver when it
//! sees sustained steering commands without matching column torque. For
//! a short slice of every 3.45 s cycle the forwarded copy of the sensor
//! message gets a synthetic column-torque ramp and a fixed output
//! torque, with the checksum recomputed so the rewritten frame stays
//! valid on the destination bus.

use crate::checksum::{byte_sum, crc8_0x1d, probe_checksum_kind, ChecksumKind};
use crate::frame::CanFrame;
use crate::hyundai::messages::Mdps12;

/// Forwarded-frame count of one full rewrite cycle.
const ANTI_NAG_CYCLE: u32 = 345;

/// Rewriting starts once the in-cycle count passes this.
const NAG_WINDOW_START: u32 = 330;

/// Synthetic torque step applied on each rewritten frame after the first.
const TORQUE_RAMP_STEP: u16 = 34;

/// Initial offset below the observed column torque.
const TORQUE_RAMP_OFFSET: u16 = 164;

/// Fixed output-torque value written while the rewrite window is open.
const OUTPUT_TORQUE_OVERRIDE: u16 = 2058;

const CHECKSUM_BYTE: usize = 3;

/// Stateful rewriter for the steering sensor message.
#[derive(Debug)]
pub struct AntiNag {
    kind: ChecksumKind,
    cycle_cnt: u32,
    last_column_torque: u16,
}

impl Default for AntiNag {
    fn default() -> Self {
        Self::new()
    }
}

impl AntiNag {
    pub fn new() -> Self {
        Self {
            kind: ChecksumKind::Unknown,
            cycle_cnt: 0,
            last_column_torque: 0,
        }
    }

    /// Learn the checksum variant from an inbound sensor frame. Only the
    /// first frame decides; later frames are ignored.
    pub fn probe(&mut self, frame: &CanFrame) {
        if self.kind == ChecksumKind::Unknown {
            self.kind = probe_checksum_kind(frame);
        }
    }

    pub fn checksum_kind(&self) -> ChecksumKind {
        self.kind
    }

    /// Rewrite one forwarded sensor frame in place. Must be called for
    /// every forwarded copy so the cycle counter tracks the stream.
    pub fn patch(&mut self, frame: &mut CanFrame) {
        if self.cycle_cnt > NAG_WINDOW_START {
            let torque = if self.cycle_cnt == NAG_WINDOW_START + 1 {
                // enter the ramp just below the real column torque
                let observed = Mdps12(frame.payload_u64()).column_torque();
                observed.wrapping_sub(TORQUE_RAMP_OFFSET) & 0x7FF
            } else {
                (self.last_column_torque + TORQUE_RAMP_STEP) & 0x7FF
            };
            self.last_column_torque = torque;

            let mut msg = Mdps12(frame.payload_u64());
            msg.set_column_torque(torque);
            msg.set_output_torque(OUTPUT_TORQUE_OVERRIDE);
            frame.set_payload_u64(msg.0);

            // an unprobed stream gets the CRC variant, matching the EPS
            // firmware revisions that reject plain sums outright
            let ck = match self.kind {
                ChecksumKind::Sum => byte_sum(frame.data(), CHECKSUM_BYTE),
                ChecksumKind::Crc | ChecksumKind::Unknown => {
                    crc8_0x1d(frame.data(), CHECKSUM_BYTE)
                }
            };
            frame.set_byte(CHECKSUM_BYTE, ck);
        }
        self.cycle_cnt = (self.cycle_cnt + 1) % ANTI_NAG_CYCLE;
    }
}
