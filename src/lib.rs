//! Vehicle-safety CAN gateway core.
//!
//! This crate implements the safety layer that sits between a
//! driving-assistance computer and a vehicle's CAN buses:
//!
//! - every inbound frame is validated against expected layouts
//!   (checksums, rolling counters, timing) by [`RxChecks`],
//! - every outbound frame the assistance stack wants to send is checked
//!   against per-vehicle allow-lists and torque/acceleration limits,
//! - every frame seen on any bus is routed (or dropped) by the
//!   forwarding [`Gateway`], including an in-flight rewrite of the
//!   power-steering sensor message that keeps its checksum valid.
//!
//! All state is owned by a [`SafetyMode`] value; there are no globals.
//! Processing is strictly sequential and allocation-free, so the crate
//! is `no_std` by default.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod address_check;
pub mod checksum;
pub mod defaults;
pub mod frame;
pub mod gateway;
pub mod hyundai;
pub mod limits;
mod modes;
pub mod patcher;
pub mod state;

pub use address_check::{AddrCheck, MsgConfig, RxChecks};
pub use frame::{CanFrame, CanMsg};
pub use gateway::{FwdBus, Gateway, GatewayEvent};
pub use modes::{SafetyHooks, SafetyMode, SafetyModeId};
pub use state::SafetyState;

/// Monotonic microsecond timestamp supplied by the caller with every hook
/// invocation. The counter is free-running and allowed to wrap.
pub type Timestamp = embedded_time::duration::Microseconds<u32>;

/// Elapsed microseconds between two wrapping timer readings.
pub(crate) fn ts_elapsed(now: u32, last: u32) -> u32 {
    now.wrapping_sub(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_handles_timer_wraparound() {
        assert_eq!(ts_elapsed(100, 50), 50);
        assert_eq!(ts_elapsed(50, u32::MAX - 49), 100);
    }
}
