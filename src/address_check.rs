//! Inbound address validation.
//!
//! A safety module installs a static table of the periodic messages it
//! relies on; every inbound frame matching the table is checked for
//! checksum validity, rolling-counter continuity and freshness. The
//! validator never latches a failure: a corrupt frame marks the stream
//! invalid for that cycle and resynchronizes on the next good frame.

use embedded_time::duration::Microseconds;
use heapless::Vec;

use crate::checksum::FrameCodec;
use crate::frame::CanFrame;
use crate::ts_elapsed;

/// Maximum number of address-check entries a module may install.
pub const MAX_ADDR_CHECKS: usize = 8;

/// A stream is lagging once this many expected frames have been missed.
pub const MAX_MISSED_FRAMES: u32 = 10;

/// Expected layout of one periodic message.
#[derive(Clone, Copy, Debug)]
pub struct MsgConfig {
    pub addr: u16,
    pub bus: u8,
    pub len: u8,
    pub check_checksum: bool,
    /// Maximum rolling-counter value; 0 disables the counter check.
    pub max_counter: u8,
    pub expected_timestep: Microseconds<u32>,
}

/// One logical signal the module depends on. Some signals arrive as one
/// of several alternate messages (e.g. engine data on either of two
/// addresses), so an entry lists every acceptable layout.
#[derive(Clone, Copy, Debug)]
pub struct AddrCheck {
    pub msgs: &'static [MsgConfig],
}

/// Rolling per-entry validation state.
#[derive(Clone, Copy, Debug)]
struct AddrCheckState {
    seen: bool,
    last_counter: u8,
    last_ts: u32,
    valid_checksum: bool,
    valid_counter: bool,
    lagging: bool,
}

impl Default for AddrCheckState {
    fn default() -> Self {
        Self {
            seen: false,
            last_counter: 0,
            last_ts: 0,
            valid_checksum: true,
            valid_counter: true,
            lagging: false,
        }
    }
}

/// Address validator: static expectation table plus rolling state.
#[derive(Debug)]
pub struct RxChecks {
    config: &'static [AddrCheck],
    state: Vec<AddrCheckState, MAX_ADDR_CHECKS>,
}

impl RxChecks {
    pub fn new(config: &'static [AddrCheck]) -> Self {
        debug_assert!(config.len() <= MAX_ADDR_CHECKS);
        let mut state = Vec::new();
        for _ in config {
            state.push(AddrCheckState::default()).ok();
        }
        Self { config, state }
    }

    /// Drop all rolling state, as on module re-init.
    pub fn reset(&mut self) {
        for s in self.state.iter_mut() {
            *s = AddrCheckState::default();
        }
    }

    pub fn config(&self) -> &'static [AddrCheck] {
        self.config
    }

    fn lookup(&self, frame: &CanFrame) -> Option<(usize, MsgConfig)> {
        for (i, entry) in self.config.iter().enumerate() {
            for msg in entry.msgs {
                if msg.addr == frame.addr
                    && msg.bus == frame.bus
                    && usize::from(msg.len) == frame.len()
                {
                    return Some((i, *msg));
                }
            }
        }
        None
    }

    /// Process one inbound frame and return the aggregate validity of all
    /// configured streams. State updates on every matching frame, valid
    /// or not, so a single corrupt frame cannot wedge the sequence.
    pub fn validate<C: FrameCodec>(
        &mut self,
        frame: &CanFrame,
        now: Microseconds<u32>,
        codec: &C,
    ) -> bool {
        if let Some((index, cfg)) = self.lookup(frame) {
            let st = &mut self.state[index];

            if st.seen {
                st.lagging =
                    ts_elapsed(now.0, st.last_ts) > cfg.expected_timestep.0 * MAX_MISSED_FRAMES;
            }
            st.last_ts = now.0;

            st.valid_checksum =
                !cfg.check_checksum || codec.checksum(frame) == codec.compute_checksum(frame);

            if cfg.max_counter > 0 {
                let counter = codec.counter(frame);
                let expected =
                    ((u16::from(st.last_counter) + 1) % (u16::from(cfg.max_counter) + 1)) as u8;
                // The first frame after a reset only sets the baseline.
                st.valid_counter = !st.seen || counter == expected;
                // Resynchronize to the observed raw value either way.
                st.last_counter = counter;
            }

            st.seen = true;
        }
        self.all_valid()
    }

    /// Aggregate validity, recomputed from per-entry state on demand.
    pub fn all_valid(&self) -> bool {
        self.state
            .iter()
            .all(|s| !s.lagging && s.valid_checksum && s.valid_counter)
    }
}
