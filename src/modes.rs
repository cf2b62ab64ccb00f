//! Safety-mode selection and hook dispatch.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;

use crate::defaults::{AllOutputMode, NoOutputMode};
use crate::frame::CanFrame;
use crate::gateway::FwdBus;
use crate::hyundai::{HyundaiParam, HyundaiSafety, TOPOLOGY};
use crate::Timestamp;

/// The four hooks every safety mode implements. The caller invokes `rx`
/// for each inbound frame, `tx`/`tx_lin` before any outbound transfer,
/// and `fwd` to route frames between buses; `fwd` may rewrite the frame
/// in place.
pub trait SafetyHooks {
    /// Validate one inbound frame and update vehicle state. Returns
    /// whether the frame passed the configured stream checks.
    fn rx(&mut self, frame: &CanFrame, now: Timestamp) -> bool;

    /// Whether the stack may transmit this frame.
    fn tx(&mut self, frame: &CanFrame, now: Timestamp) -> bool;

    /// Whether the stack may transmit this LIN payload.
    fn tx_lin(&mut self, lin_num: u8, data: &[u8]) -> bool;

    /// Forwarding destination for a frame seen on `frame.bus`.
    fn fwd(&mut self, frame: &mut CanFrame, now: Timestamp) -> FwdBus;
}

/// Wire identifiers of the selectable safety modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum SafetyModeId {
    NoOutput = 0,
    AllOutput = 1,
    Hyundai = 2,
    HyundaiLegacy = 3,
}

/// `AllOutput` param bit enabling plain bus 0/2 bridging.
const ALL_OUTPUT_PASSTHROUGH: u16 = 1;

/// One installed safety mode, owning all of its state.
pub enum SafetyMode {
    NoOutput(NoOutputMode),
    AllOutput(AllOutputMode),
    Hyundai(HyundaiSafety),
}

impl SafetyMode {
    /// Build a mode from its wire identifier and parameter word.
    pub fn new(id: SafetyModeId, param: u16, has_obd: bool) -> Self {
        match id {
            SafetyModeId::NoOutput => {
                SafetyMode::NoOutput(NoOutputMode::new(&TOPOLOGY, has_obd))
            }
            SafetyModeId::AllOutput => SafetyMode::AllOutput(AllOutputMode::new(
                param & ALL_OUTPUT_PASSTHROUGH != 0,
            )),
            SafetyModeId::Hyundai => SafetyMode::Hyundai(HyundaiSafety::new(
                HyundaiParam::from_bits_truncate(param),
                has_obd,
            )),
            SafetyModeId::HyundaiLegacy => SafetyMode::Hyundai(HyundaiSafety::new_legacy(
                HyundaiParam::from_bits_truncate(param),
                has_obd,
            )),
        }
    }

    /// Decode a wire identifier; unknown values select no mode.
    pub fn from_wire(id: u16, param: u16, has_obd: bool) -> Option<Self> {
        SafetyModeId::from_u16(id).map(|id| Self::new(id, param, has_obd))
    }

    pub fn id(&self) -> SafetyModeId {
        match self {
            SafetyMode::NoOutput(_) => SafetyModeId::NoOutput,
            SafetyMode::AllOutput(_) => SafetyModeId::AllOutput,
            SafetyMode::Hyundai(h) if h.is_legacy() => SafetyModeId::HyundaiLegacy,
            SafetyMode::Hyundai(_) => SafetyModeId::Hyundai,
        }
    }
}

impl SafetyHooks for SafetyMode {
    fn rx(&mut self, frame: &CanFrame, now: Timestamp) -> bool {
        match self {
            SafetyMode::NoOutput(m) => m.rx(frame, now),
            SafetyMode::AllOutput(m) => m.rx(frame, now),
            SafetyMode::Hyundai(m) => m.rx(frame, now),
        }
    }

    fn tx(&mut self, frame: &CanFrame, now: Timestamp) -> bool {
        match self {
            SafetyMode::NoOutput(m) => m.tx(frame, now),
            SafetyMode::AllOutput(m) => m.tx(frame, now),
            SafetyMode::Hyundai(m) => m.tx(frame, now),
        }
    }

    fn tx_lin(&mut self, lin_num: u8, data: &[u8]) -> bool {
        match self {
            SafetyMode::NoOutput(m) => m.tx_lin(lin_num, data),
            SafetyMode::AllOutput(m) => m.tx_lin(lin_num, data),
            SafetyMode::Hyundai(m) => m.tx_lin(lin_num, data),
        }
    }

    fn fwd(&mut self, frame: &mut CanFrame, now: Timestamp) -> FwdBus {
        match self {
            SafetyMode::NoOutput(m) => m.fwd(frame, now),
            SafetyMode::AllOutput(m) => m.fwd(frame, now),
            SafetyMode::Hyundai(m) => m.fwd(frame, now),
        }
    }
}
