//! Shared per-session safety state.

use crate::limits::TorqueSamples;

/// Vehicle state shared by every safety module: whether the assistance
/// stack currently holds control authority, and the driver inputs that
/// can revoke it.
#[derive(Debug, Default)]
pub struct SafetyState {
    pub controls_allowed: bool,
    pub gas_pressed: bool,
    pub gas_pressed_prev: bool,
    pub brake_pressed: bool,
    pub brake_pressed_prev: bool,
    pub vehicle_moving: bool,
    pub cruise_engaged_prev: bool,
    pub torque_driver: TorqueSamples,
}

impl SafetyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver-override and stock-ECU checks run against every valid
    /// inbound frame. A rising gas edge, a fresh or rolling brake press,
    /// or a stock ECU still talking on the stack's bus all revoke
    /// control authority.
    pub fn generic_rx_checks(&mut self, stock_ecu_detected: bool) {
        if self.gas_pressed && !self.gas_pressed_prev {
            self.controls_allowed = false;
        }
        self.gas_pressed_prev = self.gas_pressed;

        if self.brake_pressed && (!self.brake_pressed_prev || self.vehicle_moving) {
            self.controls_allowed = false;
        }
        self.brake_pressed_prev = self.brake_pressed;

        if stock_ecu_detected {
            self.controls_allowed = false;
        }
    }

    /// Track the cruise-control engaged bit: a rising edge grants
    /// control authority, disengagement revokes it.
    pub fn cruise_state_check(&mut self, cruise_engaged: bool) {
        if cruise_engaged && !self.cruise_engaged_prev {
            self.controls_allowed = true;
        }
        if !cruise_engaged {
            self.controls_allowed = false;
        }
        self.cruise_engaged_prev = cruise_engaged;
    }
}
