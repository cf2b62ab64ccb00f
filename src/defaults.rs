//! Default safety modes.
//!
//! `NoOutputMode` is the boot and fallback mode: nothing the stack asks
//! to transmit goes out, but forwarding between the buses keeps running
//! so the stock systems stay functional. `AllOutputMode` removes every
//! restriction and exists for bench work only.

use crate::frame::CanFrame;
use crate::gateway::{FwdBus, Gateway, GatewayEvent, Topology};
use crate::modes::SafetyHooks;
use crate::patcher::AntiNag;
use crate::Timestamp;

/// Silent mode: observe, forward, transmit nothing.
pub struct NoOutputMode {
    gateway: Gateway,
    anti_nag: AntiNag,
}

impl NoOutputMode {
    pub fn new(topo: &'static Topology, has_obd: bool) -> Self {
        Self {
            gateway: Gateway::new(topo, has_obd),
            anti_nag: AntiNag::new(),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn pop_event(&mut self) -> Option<GatewayEvent> {
        self.gateway.pop_event()
    }
}

impl SafetyHooks for NoOutputMode {
    fn rx(&mut self, frame: &CanFrame, _now: Timestamp) -> bool {
        self.gateway.observe_rx(frame);
        if frame.addr == self.gateway.topology().eps_sensor {
            self.anti_nag.probe(frame);
        }
        true
    }

    fn tx(&mut self, _frame: &CanFrame, _now: Timestamp) -> bool {
        false
    }

    fn tx_lin(&mut self, _lin_num: u8, _data: &[u8]) -> bool {
        false
    }

    fn fwd(&mut self, frame: &mut CanFrame, now: Timestamp) -> FwdBus {
        let dest = self.gateway.decide(frame, now);
        if frame.addr == self.gateway.topology().eps_sensor && dest != FwdBus::None {
            self.anti_nag.patch(frame);
        }
        dest
    }
}

/// Unrestricted mode for bench work. With `passthrough` set, frames are
/// bridged straight between the vehicle and camera buses with no
/// topology logic at all.
pub struct AllOutputMode {
    passthrough: bool,
}

impl AllOutputMode {
    pub fn new(passthrough: bool) -> Self {
        Self { passthrough }
    }
}

impl SafetyHooks for AllOutputMode {
    fn rx(&mut self, _frame: &CanFrame, _now: Timestamp) -> bool {
        true
    }

    fn tx(&mut self, _frame: &CanFrame, _now: Timestamp) -> bool {
        true
    }

    fn tx_lin(&mut self, _lin_num: u8, _data: &[u8]) -> bool {
        true
    }

    fn fwd(&mut self, frame: &mut CanFrame, _now: Timestamp) -> FwdBus {
        if self.passthrough {
            match frame.bus {
                0 => FwdBus::Bus2,
                2 => FwdBus::Bus0,
                _ => FwdBus::None,
            }
        } else {
            FwdBus::None
        }
    }
}
