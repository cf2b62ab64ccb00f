//! # Hyundai CAN message bitfields.
//!
//! Payloads are accessed through a little-endian `u64` image of the
//! frame data. Only the signals the safety logic reads or rewrites are
//! declared; raw field values keep their on-wire encoding and the
//! accessor methods below apply the signal offsets.

use bitfield::bitfield;

pub const MDPS12: u16 = 593;
pub const EMS16: u16 = 608;
pub const EMS11: u16 = 790;
pub const LKAS11: u16 = 832;
pub const E_EMS11: u16 = 881;
pub const MDPS11: u16 = 897;
pub const WHL_SPD11: u16 = 902;
pub const SCC14: u16 = 905;
pub const FCA11: u16 = 909;
pub const TCS13: u16 = 916;
pub const SCC11: u16 = 1056;
pub const SCC12: u16 = 1057;
pub const FCA12: u16 = 1155;
pub const LFAHDA_MFC: u16 = 1157;
pub const FRT_RADAR11: u16 = 1186;
pub const CLU11: u16 = 1265;
pub const SCC13: u16 = 1290;
/// UDS tester-present/diagnostic address of the radar unit.
pub const RADAR_UDS: u16 = 2000;

/// Body-network addresses that only appear on a local-CAN tap.
pub const LCAN_MSGS: &[u16] = &[1296, 524];

/// Wheel-speed threshold below which the vehicle counts as standing still.
pub const STANDSTILL_THRESHOLD: u16 = 30;

bitfield! {
    /// Steering command from the camera or the assistance stack.
    #[derive(Copy, Clone, Debug)]
    pub struct Lkas11(u64);
    /// Requested torque, on-wire encoding (offset 1024).
    pub u16, torque_cmd_raw, _: 26, 16;
    /// Steering-request active bit.
    pub bool, steer_req, _: 27;
}

impl Lkas11 {
    /// Requested torque with the signal offset removed.
    pub fn torque_cmd(&self) -> i32 {
        i32::from(self.torque_cmd_raw()) - 1024
    }
}

bitfield! {
    /// Radar cruise command.
    #[derive(Copy, Clone, Debug)]
    pub struct Scc12(u64);
    /// Emergency-braking deceleration command.
    pub u8, aeb_decel_cmd, _: 23, 16;
    /// Raw acceleration command, on-wire encoding (offset 1023).
    pub u16, accel_raw_enc, _: 34, 24;
    /// Applied acceleration command, on-wire encoding (offset 1023).
    pub u16, accel_val_enc, _: 47, 37;
    /// Emergency-braking request bit.
    pub bool, aeb_req, _: 54;
}

impl Scc12 {
    pub fn accel_raw(&self) -> i32 {
        i32::from(self.accel_raw_enc()) - 1023
    }

    pub fn accel_val(&self) -> i32 {
        i32::from(self.accel_val_enc()) - 1023
    }
}

bitfield! {
    /// Power-steering sensor message.
    #[derive(Copy, Clone, Debug)]
    pub struct Mdps12(u64);
    /// Driver-applied column torque.
    pub u16, column_torque, set_column_torque: 10, 0;
    /// Checksum byte.
    pub u8, checksum, set_checksum: 31, 24;
    /// Motor output torque.
    pub u16, output_torque, set_output_torque: 63, 52;
}

bitfield! {
    /// Forward-collision-assist command.
    #[derive(Copy, Clone, Debug)]
    pub struct Fca11(u64);
    pub u8, vsm_decel_cmd, _: 15, 8;
    pub bool, fca_cmd_act, _: 20;
    pub bool, vsm_decel_cmd_act, _: 31;
}

impl Fca11 {
    /// True when the frame commands any braking at all.
    pub fn commands_braking(&self) -> bool {
        self.vsm_decel_cmd() != 0 || self.fca_cmd_act() || self.vsm_decel_cmd_act()
    }
}

bitfield! {
    /// Cluster message carrying the cruise buttons.
    #[derive(Copy, Clone, Debug)]
    pub struct Clu11(u64);
    pub u8, cruise_button, _: 2, 0;
    pub bool, main_button, _: 3;
}

/// `Clu11::cruise_button` values.
pub mod cruise_button {
    pub const NONE: u8 = 0;
    pub const RES_ACCEL: u8 = 1;
    pub const SET_DECEL: u8 = 2;
    pub const CANCEL: u8 = 4;
}

bitfield! {
    /// Radar cruise status.
    #[derive(Copy, Clone, Debug)]
    pub struct Scc11(u64);
    pub bool, main_mode_acc, _: 0;
}

bitfield! {
    /// Wheel speeds.
    #[derive(Copy, Clone, Debug)]
    pub struct WhlSpd11(u64);
    pub u16, front_left, _: 13, 0;
    pub u16, rear_right, _: 61, 48;
}

bitfield! {
    /// Engine data on combustion vehicles.
    #[derive(Copy, Clone, Debug)]
    pub struct Ems16(u64);
    pub u8, gas_pedal, _: 63, 62;
}

bitfield! {
    /// Engine data on electric and hybrid vehicles.
    #[derive(Copy, Clone, Debug)]
    pub struct EEms11(u64);
    pub u8, ev_gas, _: 38, 31;
    pub u8, hybrid_gas, _: 63, 56;
}

bitfield! {
    /// Traction-control status, carries the driver-braking bit.
    #[derive(Copy, Clone, Debug)]
    pub struct Tcs13(u64);
    pub bool, driver_braking, _: 55;
}
