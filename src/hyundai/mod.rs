//! Hyundai/Kia/Genesis safety module.
//!
//! Covers the LKAS-camera platforms: the assistance stack sits between
//! the camera (bus 2) and the car (bus 0), with an optional bus-1 drop
//! for vehicles whose steering unit or radar lives behind an extra
//! harness or the OBD connector. Four configurations share the code:
//! standard camera-steering, legacy (no checksums on the chassis
//! messages), camera-integrated radar, and stack-driven longitudinal.

pub mod messages;

use bitflags::bitflags;
use embedded_time::duration::Microseconds;

use crate::address_check::{AddrCheck, MsgConfig, RxChecks};
use crate::checksum::FrameCodec;
use crate::frame::{msg_allowed, CanFrame, CanMsg};
use crate::gateway::{FwdBus, Gateway, GatewayEvent, StackMsg, Topology};
use crate::limits::{
    longitudinal_accel_check, LongitudinalLimits, SteeringLimits, TorqueLimiter,
};
use crate::modes::SafetyHooks;
use crate::patcher::AntiNag;
use crate::state::SafetyState;
use crate::Timestamp;

use messages::*;

bitflags! {
    /// Per-install configuration flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HyundaiParam: u16 {
        /// Electric powertrain, gas signal on `E_EMS11`.
        const EV_GAS = 1;
        /// Hybrid powertrain, gas signal on `E_EMS11`.
        const HYBRID_GAS = 2;
        /// The stack controls acceleration and braking.
        const LONGITUDINAL = 4;
        /// Radar is integrated into the camera; cruise state on bus 2.
        const CAMERA_SCC = 8;
        /// Lower torque ceiling with tighter ramp rates.
        const ALT_LIMITS = 16;
    }
}

pub const HYUNDAI_STEERING_LIMITS: SteeringLimits = SteeringLimits {
    max_steer: 409,
    max_rate_up: 10,
    max_rate_down: 10,
    max_rt_delta: 112,
    max_rt_interval: Microseconds(250_000),
    driver_torque_allowance: 50,
    driver_torque_factor: 2,
    min_valid_request_frames: 89,
    max_invalid_request_frames: 2,
    min_valid_request_rt_interval: Microseconds(810_000),
    has_steer_req_tolerance: true,
};

pub const HYUNDAI_STEERING_LIMITS_ALT: SteeringLimits = SteeringLimits {
    max_steer: 270,
    max_rate_up: 2,
    max_rate_down: 3,
    ..HYUNDAI_STEERING_LIMITS
};

pub const HYUNDAI_LONG_LIMITS: LongitudinalLimits = LongitudinalLimits {
    max_accel: 200,
    min_accel: -350,
};

/// Bus address map shared by every mode on this platform.
pub const TOPOLOGY: Topology = Topology {
    steer_cmd: LKAS11,
    steer_aux: LFAHDA_MFC,
    eps_sensor: MDPS12,
    alt_eps: MDPS11,
    ems_relay: EMS11,
    cluster_relay: CLU11,
    scc_msgs: &[SCC14, SCC11, SCC12, SCC13],
    fca_msgs: &[FCA11, FCA12],
    lcan_msgs: LCAN_MSGS,
};

const TX_MSGS: &[CanMsg] = &[
    CanMsg { addr: MDPS12, bus: 2, len: 8 },
    CanMsg { addr: EMS11, bus: 1, len: 8 },
    CanMsg { addr: LKAS11, bus: 0, len: 8 },
    CanMsg { addr: LKAS11, bus: 1, len: 8 },
    CanMsg { addr: SCC11, bus: 0, len: 8 },
    CanMsg { addr: SCC12, bus: 0, len: 8 },
    CanMsg { addr: SCC13, bus: 0, len: 8 },
    CanMsg { addr: SCC14, bus: 0, len: 8 },
    CanMsg { addr: FCA11, bus: 0, len: 8 },
    CanMsg { addr: FCA12, bus: 0, len: 8 },
    CanMsg { addr: LFAHDA_MFC, bus: 0, len: 4 },
    CanMsg { addr: FRT_RADAR11, bus: 0, len: 8 },
    CanMsg { addr: CLU11, bus: 0, len: 4 },
    CanMsg { addr: CLU11, bus: 1, len: 4 },
    CanMsg { addr: CLU11, bus: 2, len: 4 },
];

const LONG_TX_MSGS: &[CanMsg] = &[
    CanMsg { addr: MDPS12, bus: 2, len: 8 },
    CanMsg { addr: LKAS11, bus: 0, len: 8 },
    CanMsg { addr: CLU11, bus: 0, len: 4 },
    CanMsg { addr: CLU11, bus: 2, len: 4 },
    CanMsg { addr: LFAHDA_MFC, bus: 0, len: 4 },
    CanMsg { addr: SCC11, bus: 0, len: 8 },
    CanMsg { addr: SCC12, bus: 0, len: 8 },
    CanMsg { addr: SCC13, bus: 0, len: 8 },
    CanMsg { addr: SCC14, bus: 0, len: 8 },
    CanMsg { addr: FRT_RADAR11, bus: 0, len: 2 },
    CanMsg { addr: FCA11, bus: 0, len: 8 },
    CanMsg { addr: FCA12, bus: 0, len: 8 },
    CanMsg { addr: RADAR_UDS, bus: 0, len: 8 },
];

const CAMERA_SCC_TX_MSGS: &[CanMsg] = &[
    CanMsg { addr: MDPS12, bus: 2, len: 8 },
    CanMsg { addr: LKAS11, bus: 0, len: 8 },
    CanMsg { addr: SCC11, bus: 0, len: 8 },
    CanMsg { addr: SCC12, bus: 0, len: 8 },
    CanMsg { addr: SCC13, bus: 0, len: 8 },
    CanMsg { addr: SCC14, bus: 0, len: 8 },
    CanMsg { addr: FCA11, bus: 0, len: 8 },
    CanMsg { addr: FCA12, bus: 0, len: 8 },
    CanMsg { addr: LFAHDA_MFC, bus: 0, len: 4 },
    CanMsg { addr: FRT_RADAR11, bus: 0, len: 8 },
    CanMsg { addr: CLU11, bus: 0, len: 4 },
    CanMsg { addr: CLU11, bus: 2, len: 4 },
];

const GAS_MSGS: &[MsgConfig] = &[
    MsgConfig {
        addr: EMS16,
        bus: 0,
        len: 8,
        check_checksum: true,
        max_counter: 3,
        expected_timestep: Microseconds(10_000),
    },
    MsgConfig {
        addr: E_EMS11,
        bus: 0,
        len: 8,
        check_checksum: false,
        max_counter: 0,
        expected_timestep: Microseconds(10_000),
    },
];

const WHEEL_SPEED_MSG: MsgConfig = MsgConfig {
    addr: WHL_SPD11,
    bus: 0,
    len: 8,
    check_checksum: true,
    max_counter: 15,
    expected_timestep: Microseconds(10_000),
};

const BRAKE_MSG: MsgConfig = MsgConfig {
    addr: TCS13,
    bus: 0,
    len: 8,
    check_checksum: true,
    max_counter: 7,
    expected_timestep: Microseconds(10_000),
};

const SCC12_MSG_BUS0: MsgConfig = MsgConfig {
    addr: SCC12,
    bus: 0,
    len: 8,
    check_checksum: true,
    max_counter: 15,
    expected_timestep: Microseconds(20_000),
};

const RX_CHECKS: &[AddrCheck] = &[
    AddrCheck { msgs: GAS_MSGS },
    AddrCheck { msgs: &[WHEEL_SPEED_MSG] },
    AddrCheck { msgs: &[BRAKE_MSG] },
    AddrCheck { msgs: &[SCC12_MSG_BUS0] },
];

const CAMERA_SCC_RX_CHECKS: &[AddrCheck] = &[
    AddrCheck { msgs: GAS_MSGS },
    AddrCheck { msgs: &[WHEEL_SPEED_MSG] },
    AddrCheck { msgs: &[BRAKE_MSG] },
    AddrCheck {
        msgs: &[MsgConfig { bus: 2, ..SCC12_MSG_BUS0 }],
    },
];

const LONG_RX_CHECKS: &[AddrCheck] = &[
    AddrCheck { msgs: GAS_MSGS },
    AddrCheck { msgs: &[WHEEL_SPEED_MSG] },
    AddrCheck { msgs: &[BRAKE_MSG] },
    // under stack longitudinal control the radar is quiet; watch the
    // cruise-button message instead
    AddrCheck {
        msgs: &[MsgConfig {
            addr: CLU11,
            bus: 0,
            len: 4,
            check_checksum: false,
            max_counter: 15,
            expected_timestep: Microseconds(20_000),
        }],
    },
];

const LEGACY_RX_CHECKS: &[AddrCheck] = &[
    AddrCheck { msgs: GAS_MSGS },
    AddrCheck {
        msgs: &[MsgConfig { check_checksum: false, max_counter: 0, ..WHEEL_SPEED_MSG }],
    },
    AddrCheck {
        msgs: &[MsgConfig { check_checksum: false, max_counter: 0, ..BRAKE_MSG }],
    },
];

/// Counter and checksum layouts of the validated chassis messages.
pub struct HyundaiCodec;

impl FrameCodec for HyundaiCodec {
    fn counter(&self, frame: &CanFrame) -> u8 {
        match frame.addr {
            EMS16 => (frame.byte(7) >> 4) & 0x3,
            WHL_SPD11 => ((frame.byte(3) >> 6) << 2) | (frame.byte(1) >> 6),
            TCS13 => (frame.byte(1) >> 5) & 0x7,
            SCC12 => frame.byte(7) & 0xF,
            CLU11 => (frame.byte(3) >> 4) & 0xF,
            _ => 0,
        }
    }

    fn checksum(&self, frame: &CanFrame) -> u8 {
        match frame.addr {
            EMS16 => frame.byte(7) & 0xF,
            WHL_SPD11 => ((frame.byte(7) >> 6) << 2) | (frame.byte(5) >> 6),
            TCS13 => frame.byte(6) & 0xF,
            SCC12 => frame.byte(7) >> 4,
            _ => 0,
        }
    }

    fn compute_checksum(&self, frame: &CanFrame) -> u8 {
        if frame.addr == WHL_SPD11 {
            // population count over the payload, excluding the counter and
            // checksum bits in the top of every odd byte
            let mut count = 0u8;
            for i in 0..8usize {
                let b = frame.byte(i);
                for j in 0..8u8 {
                    let excluded = (i % 2 == 1) && (j >= 6);
                    if !excluded {
                        count += (b >> j) & 1;
                    }
                }
            }
            (count ^ 9) & 0xF
        } else {
            // nibble sum with the checksum nibble masked out
            let mut sum = 0u32;
            for i in 0..8usize {
                if frame.addr == TCS13 && i == 7 {
                    continue;
                }
                let mut b = frame.byte(i);
                if (frame.addr == EMS16 && i == 7) || (frame.addr == TCS13 && i == 6) {
                    b &= 0xF0;
                }
                if frame.addr == SCC12 && i == 7 {
                    b &= 0x0F;
                }
                sum += u32::from(b & 0xF) + u32::from(b >> 4);
            }
            ((16 - (sum % 16)) % 16) as u8
        }
    }
}

/// Full per-vehicle safety module: validation, limits, forwarding and
/// the steering-sensor rewrite, all owned here.
pub struct HyundaiSafety {
    param: HyundaiParam,
    legacy: bool,
    longitudinal: bool,
    camera_scc: bool,
    state: SafetyState,
    rx_checks: RxChecks,
    limiter: TorqueLimiter,
    gateway: Gateway,
    anti_nag: AntiNag,
    cruise_button_prev: u8,
}

impl HyundaiSafety {
    pub fn new(param: HyundaiParam, has_obd: bool) -> Self {
        Self::init(param, false, has_obd)
    }

    /// Older platforms without checksums on the chassis messages.
    pub fn new_legacy(param: HyundaiParam, has_obd: bool) -> Self {
        Self::init(param, true, has_obd)
    }

    fn init(param: HyundaiParam, legacy: bool, has_obd: bool) -> Self {
        let camera_scc = param.contains(HyundaiParam::CAMERA_SCC);
        // longitudinal control needs the radar on a stack-facing bus
        let longitudinal =
            param.contains(HyundaiParam::LONGITUDINAL) && !camera_scc && !legacy;
        let rx_config = if legacy {
            LEGACY_RX_CHECKS
        } else if camera_scc {
            CAMERA_SCC_RX_CHECKS
        } else if longitudinal {
            LONG_RX_CHECKS
        } else {
            RX_CHECKS
        };
        let limits = if param.contains(HyundaiParam::ALT_LIMITS) {
            &HYUNDAI_STEERING_LIMITS_ALT
        } else {
            &HYUNDAI_STEERING_LIMITS
        };
        Self {
            param,
            legacy,
            longitudinal,
            camera_scc,
            state: SafetyState::new(),
            rx_checks: RxChecks::new(rx_config),
            limiter: TorqueLimiter::new(limits),
            gateway: Gateway::new(&TOPOLOGY, has_obd),
            anti_nag: AntiNag::new(),
            cruise_button_prev: cruise_button::NONE,
        }
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn is_longitudinal(&self) -> bool {
        self.longitudinal
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Oldest undrained topology event.
    pub fn pop_event(&mut self) -> Option<GatewayEvent> {
        self.gateway.pop_event()
    }

    fn tx_table(&self) -> &'static [CanMsg] {
        if self.longitudinal {
            LONG_TX_MSGS
        } else if self.camera_scc {
            CAMERA_SCC_TX_MSGS
        } else {
            TX_MSGS
        }
    }

    fn cruise_buttons_check(&mut self, button: u8) {
        // engage on button release, matching the stock cluster behavior
        let released = button == cruise_button::NONE
            && matches!(
                self.cruise_button_prev,
                cruise_button::SET_DECEL | cruise_button::RES_ACCEL
            );
        if released {
            self.state.controls_allowed = true;
        }
        if button == cruise_button::CANCEL {
            self.state.controls_allowed = false;
        }
        self.cruise_button_prev = button;
    }

    fn parse_valid_rx(&mut self, frame: &CanFrame) {
        let image = frame.payload_u64();

        if frame.addr == SCC11 && !self.longitudinal {
            let scc_bus = self.gateway.scc_bus();
            if scc_bus < 0 || i16::from(frame.bus) == i16::from(scc_bus) {
                self.state.cruise_state_check(Scc11(image).main_mode_acc());
            }
        }

        if frame.addr == MDPS12
            && i16::from(frame.bus) == i16::from(self.gateway.eps_bus())
        {
            let raw = (frame.bytes(0, 4) & 0x7FF) as f32;
            let torque = (raw * 0.79 - 808.0) as i32;
            self.state.torque_driver.update(torque);
        }

        if frame.addr == CLU11 && frame.bus == 0 && self.longitudinal {
            self.cruise_buttons_check(Clu11(image).cruise_button());
        }

        if frame.bus == 0 {
            if self.param.contains(HyundaiParam::EV_GAS) {
                if frame.addr == E_EMS11 {
                    self.state.gas_pressed = EEms11(image).ev_gas() != 0;
                }
            } else if self.param.contains(HyundaiParam::HYBRID_GAS) {
                if frame.addr == E_EMS11 {
                    self.state.gas_pressed = EEms11(image).hybrid_gas() != 0;
                }
            } else if frame.addr == EMS16 {
                self.state.gas_pressed = Ems16(image).gas_pedal() != 0;
            }

            if frame.addr == TCS13 {
                self.state.brake_pressed = Tcs13(image).driver_braking();
            }

            if frame.addr == WHL_SPD11 {
                let spd = WhlSpd11(image);
                let mean = (u32::from(spd.front_left()) + u32::from(spd.rear_right())) / 2;
                self.state.vehicle_moving = mean > u32::from(STANDSTILL_THRESHOLD);
            }
        }

        // gas/brake disengagement is disabled on this platform; the
        // signals are still tracked for the vehicle-moving state
        self.state.gas_pressed = false;
        self.state.brake_pressed = false;

        let stock_ecu = (frame.addr == LKAS11 && frame.bus == 0)
            || (self.longitudinal && frame.addr == SCC12 && frame.bus == 0);
        self.state.generic_rx_checks(stock_ecu);
    }

    fn check_scc12_tx(&mut self, frame: &CanFrame) -> bool {
        let msg = Scc12(frame.payload_u64());
        let mut violation = false;
        violation |= longitudinal_accel_check(msg.accel_raw(), &HYUNDAI_LONG_LIMITS);
        violation |= longitudinal_accel_check(msg.accel_val(), &HYUNDAI_LONG_LIMITS);
        // emergency braking stays with the stock system
        violation |= msg.aeb_decel_cmd() != 0;
        violation |= msg.aeb_req();
        if !self.state.controls_allowed
            && (msg.accel_raw() != 0 || msg.accel_val() != 0)
        {
            violation = true;
        }
        !violation
    }

    fn check_lkas11_tx(&mut self, frame: &CanFrame, now: Timestamp) -> bool {
        let msg = Lkas11(frame.payload_u64());
        let violation = self.limiter.check_steer_cmd(
            msg.torque_cmd(),
            Some(msg.steer_req()),
            self.state.controls_allowed,
            &self.state.torque_driver,
            now,
        );
        !violation
    }

    fn note_tx(&mut self, frame: &CanFrame, allowed: bool, now: Timestamp) {
        let class = match frame.addr {
            LKAS11 => Some(StackMsg::Steer),
            SCC12 => Some(StackMsg::Longitudinal),
            MDPS12 => Some(StackMsg::EpsRelay),
            FCA11 => Some(StackMsg::Fca),
            EMS11 => Some(StackMsg::EmsRelay),
            CLU11 if frame.bus == 1 => Some(StackMsg::ClusterRelay),
            _ => None,
        };
        if let Some(class) = class {
            self.gateway.note_stack_tx(class, allowed, now);
        }
    }
}

impl SafetyHooks for HyundaiSafety {
    fn rx(&mut self, frame: &CanFrame, now: Timestamp) -> bool {
        self.gateway.observe_rx(frame);

        let mut valid = self.rx_checks.validate(frame, now, &HyundaiCodec);
        if frame.bus == 1 && LCAN_MSGS.contains(&frame.addr) {
            valid = false;
        }

        if frame.addr == MDPS12 {
            self.anti_nag.probe(frame);
        }

        if valid {
            self.parse_valid_rx(frame);
        }
        valid
    }

    fn tx(&mut self, frame: &CanFrame, now: Timestamp) -> bool {
        let mut allowed = msg_allowed(frame, self.tx_table());

        if allowed {
            allowed = match frame.addr {
                LKAS11 => self.check_lkas11_tx(frame, now),
                SCC12 => self.check_scc12_tx(frame),
                FCA11 => !Fca11(frame.payload_u64()).commands_braking(),
                // the radar stays in diagnostic silence under stack
                // longitudinal control; only tester-present may pass
                RADAR_UDS => {
                    frame.bytes(0, 4) == 0x0080_3E02 && frame.bytes(4, 4) == 0
                }
                _ => true,
            };
        }

        self.note_tx(frame, allowed, now);
        allowed
    }

    fn tx_lin(&mut self, _lin_num: u8, _data: &[u8]) -> bool {
        false
    }

    fn fwd(&mut self, frame: &mut CanFrame, now: Timestamp) -> FwdBus {
        let dest = self.gateway.decide(frame, now);
        if frame.addr == MDPS12 && dest != FwdBus::None {
            self.anti_nag.patch(frame);
        }
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec_fix(frame: &mut CanFrame) {
        let codec = HyundaiCodec;
        let ck = codec.compute_checksum(frame);
        match frame.addr {
            EMS16 => frame.set_byte(7, (frame.byte(7) & 0xF0) | ck),
            WHL_SPD11 => {
                frame.set_byte(5, (frame.byte(5) & 0x3F) | ((ck & 0x3) << 6));
                frame.set_byte(7, (frame.byte(7) & 0x3F) | ((ck >> 2) << 6));
            }
            TCS13 => frame.set_byte(6, (frame.byte(6) & 0xF0) | ck),
            SCC12 => frame.set_byte(7, (frame.byte(7) & 0x0F) | (ck << 4)),
            _ => {}
        }
    }

    fn chassis_frame(addr: u16, counter: u8) -> CanFrame {
        let mut frame = CanFrame::new(0, addr, &[0; 8]);
        match addr {
            EMS16 => frame.set_byte(7, (counter & 0x3) << 4),
            WHL_SPD11 => {
                frame.set_byte(1, (counter & 0x3) << 6);
                frame.set_byte(3, (counter >> 2) << 6);
            }
            TCS13 => frame.set_byte(1, (counter & 0x7) << 5),
            SCC12 => frame.set_byte(7, counter & 0xF),
            _ => {}
        }
        codec_fix(&mut frame);
        frame
    }

    fn feed_valid_chassis(safety: &mut HyundaiSafety, counter: u8, now: u32) {
        assert!(safety.rx(&chassis_frame(EMS16, counter & 0x3), Microseconds(now)));
        assert!(safety.rx(&chassis_frame(WHL_SPD11, counter & 0xF), Microseconds(now)));
        assert!(safety.rx(&chassis_frame(TCS13, counter & 0x7), Microseconds(now)));
        assert!(safety.rx(&chassis_frame(SCC12, counter & 0xF), Microseconds(now)));
    }

    fn scc11_frame(engaged: bool) -> CanFrame {
        CanFrame::new(0, SCC11, &[engaged as u8, 0, 0, 0, 0, 0, 0, 0])
    }

    fn lkas11_frame(torque: i32, steer_req: bool) -> CanFrame {
        let raw = (torque + 1024) as u64;
        let image = (raw << 16) | ((steer_req as u64) << 27);
        CanFrame::new(0, LKAS11, &image.to_le_bytes())
    }

    #[test]
    fn healthy_chassis_streams_stay_valid() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        let mut now = 0u32;
        for i in 0..8u8 {
            feed_valid_chassis(&mut safety, i, now);
            now += 10_000;
        }
    }

    #[test]
    fn codec_round_trips_all_checked_layouts() {
        let codec = HyundaiCodec;
        for addr in [EMS16, TCS13, SCC12] {
            let frame = chassis_frame(addr, 2);
            assert_eq!(codec.checksum(&frame), codec.compute_checksum(&frame), "addr {addr}");
        }
        let frame = chassis_frame(WHL_SPD11, 5);
        assert_eq!(codec.checksum(&frame), codec.compute_checksum(&frame));
        assert_eq!(codec.counter(&frame), 5);
    }

    #[test]
    fn cruise_engagement_grants_controls() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(!safety.state().controls_allowed);
        assert!(safety.rx(&scc11_frame(false), Microseconds(0)));
        assert!(safety.rx(&scc11_frame(true), Microseconds(10_000)));
        assert!(safety.state().controls_allowed);
        assert!(safety.rx(&scc11_frame(false), Microseconds(20_000)));
        assert!(!safety.state().controls_allowed);
    }

    #[test]
    fn corrupt_chassis_frame_marks_rx_invalid() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        let mut frame = chassis_frame(TCS13, 0);
        frame.set_byte(0, frame.byte(0) ^ 0x01);
        assert!(!safety.rx(&frame, Microseconds(0)));
    }

    #[test]
    fn tx_rejects_unlisted_addresses() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        let frame = CanFrame::new(0, 0x123, &[0; 8]);
        assert!(!safety.tx(&frame, Microseconds(0)));
    }

    #[test]
    fn steering_needs_control_authority() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(!safety.tx(&lkas11_frame(10, true), Microseconds(0)));
        // zero torque passes even without authority
        assert!(safety.tx(&lkas11_frame(0, false), Microseconds(10_000)));
    }

    #[test]
    fn steering_within_limits_passes_when_engaged() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(safety.rx(&scc11_frame(false), Microseconds(0)));
        assert!(safety.rx(&scc11_frame(true), Microseconds(10_000)));
        let mut now = 20_000u32;
        let mut torque = 0i32;
        for _ in 0..5 {
            torque += 10;
            assert!(safety.tx(&lkas11_frame(torque, true), Microseconds(now)));
            now += 10_000;
        }
        // beyond the ramp rate
        assert!(!safety.tx(&lkas11_frame(torque + 100, true), Microseconds(now)));
    }

    #[test]
    fn sensor_relay_is_listed_for_every_variant() {
        for param in [
            HyundaiParam::empty(),
            HyundaiParam::LONGITUDINAL,
            HyundaiParam::CAMERA_SCC,
        ] {
            let mut safety = HyundaiSafety::new(param, false);
            assert!(safety.tx(&CanFrame::new(2, MDPS12, &[0; 8]), Microseconds(1_000_000)));
            assert!(safety.tx(&CanFrame::new(2, CLU11, &[0; 4]), Microseconds(1_000_000)));
            // relaying the sensor message suppresses the forwarded stock copy
            let mut stock = CanFrame::new(0, MDPS12, &[0; 8]);
            assert_eq!(safety.fwd(&mut stock, Microseconds(1_010_000)), FwdBus::None);
        }
    }

    #[test]
    fn blocked_steer_tx_leaves_stock_command_flowing() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(!safety.tx(&lkas11_frame(50, true), Microseconds(1_000_000)));
        let mut stock = CanFrame::new(2, LKAS11, &[0; 8]);
        assert_eq!(safety.fwd(&mut stock, Microseconds(1_010_000)), FwdBus::Bus0);
    }

    #[test]
    fn allowed_steer_tx_suppresses_stock_command() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(safety.rx(&scc11_frame(false), Microseconds(0)));
        assert!(safety.rx(&scc11_frame(true), Microseconds(10_000)));
        assert!(safety.tx(&lkas11_frame(5, true), Microseconds(1_000_000)));
        let mut stock = CanFrame::new(2, LKAS11, &[0; 8]);
        assert_eq!(safety.fwd(&mut stock, Microseconds(1_010_000)), FwdBus::None);
        // and the companion HUD message with it
        let mut aux = CanFrame::new(2, LFAHDA_MFC, &[0; 4]);
        assert_eq!(safety.fwd(&mut aux, Microseconds(1_020_000)), FwdBus::None);
    }

    #[test]
    fn fca_braking_commands_are_rejected() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        let quiet = CanFrame::new(0, FCA11, &[0; 8]);
        assert!(safety.tx(&quiet, Microseconds(0)));
        let mut braking = [0u8; 8];
        braking[1] = 10; // decel command
        assert!(!safety.tx(&CanFrame::new(0, FCA11, &braking), Microseconds(0)));
    }

    #[test]
    fn longitudinal_accel_bounds_enforced() {
        let mut safety = HyundaiSafety::new(HyundaiParam::LONGITUDINAL, false);
        // engage via buttons: press SET, release
        let press = CanFrame::new(0, CLU11, &[cruise_button::SET_DECEL, 0, 0, 0]);
        let release = CanFrame::new(0, CLU11, &[cruise_button::NONE, 0, 0, 0x10]);
        assert!(safety.rx(&press, Microseconds(0)));
        assert!(safety.rx(&release, Microseconds(20_000)));
        assert!(safety.state().controls_allowed);

        let scc12 = |accel: i32| {
            let enc = (accel + 1023) as u64;
            let image = (enc << 24) | (enc << 37);
            CanFrame::new(0, SCC12, &image.to_le_bytes())
        };
        assert!(safety.tx(&scc12(0), Microseconds(30_000)));
        assert!(safety.tx(&scc12(200), Microseconds(40_000)));
        assert!(safety.tx(&scc12(-350), Microseconds(50_000)));
        assert!(!safety.tx(&scc12(201), Microseconds(60_000)));
        assert!(!safety.tx(&scc12(-351), Microseconds(70_000)));
    }

    #[test]
    fn cancel_button_revokes_controls() {
        let mut safety = HyundaiSafety::new(HyundaiParam::LONGITUDINAL, false);
        let press = CanFrame::new(0, CLU11, &[cruise_button::SET_DECEL, 0, 0, 0]);
        let release = CanFrame::new(0, CLU11, &[cruise_button::NONE, 0, 0, 0x10]);
        assert!(safety.rx(&press, Microseconds(0)));
        assert!(safety.rx(&release, Microseconds(20_000)));
        assert!(safety.state().controls_allowed);
        let cancel = CanFrame::new(0, CLU11, &[cruise_button::CANCEL, 0, 0, 0x20]);
        assert!(safety.rx(&cancel, Microseconds(40_000)));
        assert!(!safety.state().controls_allowed);
    }

    #[test]
    fn radar_diag_allows_only_tester_present() {
        let mut safety = HyundaiSafety::new(HyundaiParam::LONGITUDINAL, false);
        let tester = CanFrame::new(0, RADAR_UDS, &[0x02, 0x3E, 0x80, 0x00, 0, 0, 0, 0]);
        assert!(safety.tx(&tester, Microseconds(0)));
        let other = CanFrame::new(0, RADAR_UDS, &[0x03, 0x22, 0x01, 0x00, 0, 0, 0, 0]);
        assert!(!safety.tx(&other, Microseconds(0)));
    }

    #[test]
    fn stock_camera_frame_revokes_controls() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(safety.rx(&scc11_frame(false), Microseconds(0)));
        assert!(safety.rx(&scc11_frame(true), Microseconds(10_000)));
        assert!(safety.state().controls_allowed);
        // a steering command arriving on the vehicle bus means the stock
        // camera is still wired in
        safety.rx(&CanFrame::new(0, LKAS11, &[0; 8]), Microseconds(20_000));
        assert!(!safety.state().controls_allowed);
    }

    #[test]
    fn forwarded_eps_sensor_gets_rewritten_in_window() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        // checksum variant learned from the first inbound sensor frame
        let mut probe = CanFrame::new(0, MDPS12, &[0x10, 0x02, 0, 0, 0, 0, 0, 0]);
        probe.set_byte(3, crate::checksum::byte_sum(probe.data(), 3));
        assert!(safety.rx(&probe, Microseconds(0)));

        let mut rewritten = 0u32;
        for i in 0..345u32 {
            let mut frame = probe.clone();
            let dest = safety.fwd(&mut frame, Microseconds(10_000 * (i + 1)));
            assert_eq!(dest, FwdBus::Bus2);
            if frame != probe {
                rewritten += 1;
                assert_eq!(
                    frame.byte(3),
                    crate::checksum::byte_sum(frame.data(), 3)
                );
            }
        }
        assert_eq!(rewritten, 14);
    }

    #[test]
    fn legacy_accepts_plain_chassis_messages() {
        let mut safety = HyundaiSafety::new_legacy(HyundaiParam::empty(), false);
        assert!(safety.is_legacy());
        let plain = CanFrame::new(0, WHL_SPD11, &[0x40, 0, 0, 0, 0, 0, 0x40, 0]);
        assert!(safety.rx(&plain, Microseconds(0)));
    }

    #[test]
    fn camera_scc_forces_longitudinal_off() {
        let safety = HyundaiSafety::new(
            HyundaiParam::LONGITUDINAL | HyundaiParam::CAMERA_SCC,
            false,
        );
        assert!(!safety.is_longitudinal());
    }

    #[test]
    fn countersteering_driver_forces_torque_decay() {
        let mut safety = HyundaiSafety::new(HyundaiParam::empty(), false);
        assert!(safety.rx(&scc11_frame(false), Microseconds(0)));
        assert!(safety.rx(&scc11_frame(true), Microseconds(10_000)));

        let mut now = 20_000u32;
        let mut torque = 0i32;
        for _ in 0..5 {
            torque += 10;
            assert!(safety.tx(&lkas11_frame(torque, true), Microseconds(now)));
            now += 10_000;
        }

        // a zeroed sensor payload decodes to a large negative column torque
        let mut mdps = CanFrame::new(0, MDPS12, &[0; 8]);
        mdps.set_byte(3, crate::checksum::byte_sum(mdps.data(), 3));
        for _ in 0..6 {
            assert!(safety.rx(&mdps, Microseconds(now)));
            now += 10_000;
        }

        // holding torque against the driver is rejected, decaying is not
        assert!(safety.tx(&lkas11_frame(40, true), Microseconds(now)));
        now += 10_000;
        assert!(!safety.tx(&lkas11_frame(40, true), Microseconds(now)));
    }
}
