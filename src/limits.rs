//! Outbound torque and acceleration limit enforcement.
//!
//! The steering limiter is stateful: it tracks the last commanded
//! torque, a real-time-rate baseline and the steer-request mismatch
//! window, and resets all of it to a conservative zero baseline whenever
//! control authority is lost or a violation occurs.

use embedded_time::duration::Microseconds;
use heapless::HistoryBuffer;

use crate::ts_elapsed;

/// Depth of the driver-torque rolling history.
const TORQUE_SAMPLES: usize = 6;

/// Rolling history of driver-applied torque readings.
pub struct TorqueSamples {
    buf: HistoryBuffer<i32, TORQUE_SAMPLES>,
}

impl core::fmt::Debug for TorqueSamples {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.buf.as_slice()).finish()
    }
}

impl Default for TorqueSamples {
    fn default() -> Self {
        Self::new()
    }
}

impl TorqueSamples {
    pub fn new() -> Self {
        Self {
            buf: HistoryBuffer::new(),
        }
    }

    pub fn update(&mut self, val: i32) {
        self.buf.write(val);
    }

    pub fn min(&self) -> i32 {
        self.buf.as_slice().iter().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> i32 {
        self.buf.as_slice().iter().copied().max().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.buf = HistoryBuffer::new();
    }
}

/// Static steering-torque limits for one vehicle configuration.
#[derive(Clone, Copy, Debug)]
pub struct SteeringLimits {
    pub max_steer: i32,
    pub max_rate_up: i32,
    pub max_rate_down: i32,
    pub max_rt_delta: i32,
    pub max_rt_interval: Microseconds<u32>,
    pub driver_torque_allowance: i32,
    pub driver_torque_factor: i32,
    /// Frames of agreeing request bit required before a torque cut is tolerated.
    pub min_valid_request_frames: u32,
    /// Consecutive mismatched frames tolerated once armed.
    pub max_invalid_request_frames: u32,
    /// Minimum real time between tolerated torque cuts.
    pub min_valid_request_rt_interval: Microseconds<u32>,
    pub has_steer_req_tolerance: bool,
}

/// Static longitudinal acceleration limits, in 1/100 m/s².
#[derive(Clone, Copy, Debug)]
pub struct LongitudinalLimits {
    pub max_accel: i32,
    pub min_accel: i32,
}

/// True when `val` lies outside `[min, max]`.
pub fn max_limit_check(val: i32, max: i32, min: i32) -> bool {
    (val > max) || (val < min)
}

/// Rate-of-change bound relaxed by the driver's recently applied torque,
/// so a human can always override.
pub fn driver_limit_check(
    val: i32,
    val_last: i32,
    driver: &TorqueSamples,
    limits: &SteeringLimits,
) -> bool {
    let mut highest_allowed = val_last.clamp(0, limits.max_steer) + limits.max_rate_up;
    let mut lowest_allowed = val_last.clamp(-limits.max_steer, 0) - limits.max_rate_up;

    let driver_max_limit =
        limits.max_steer + (limits.driver_torque_allowance + driver.max()) * limits.driver_torque_factor;
    let driver_min_limit =
        -limits.max_steer + (-limits.driver_torque_allowance + driver.min()) * limits.driver_torque_factor;

    // once past the driver's applied torque, the command must move toward zero
    highest_allowed =
        highest_allowed.min((val_last - limits.max_rate_down).max(driver_max_limit.max(0)));
    lowest_allowed =
        lowest_allowed.max((val_last + limits.max_rate_down).min(driver_min_limit.min(0)));

    max_limit_check(val, highest_allowed, lowest_allowed)
}

/// Real-time rate bound against the latched window baseline.
pub fn rt_rate_limit_check(val: i32, val_last: i32, max_rt_delta: i32) -> bool {
    let highest = val_last.max(0) + max_rt_delta;
    let lowest = val_last.min(0) - max_rt_delta;
    max_limit_check(val, highest, lowest)
}

/// Violation when the commanded acceleration falls outside the limits.
pub fn longitudinal_accel_check(accel: i32, limits: &LongitudinalLimits) -> bool {
    max_limit_check(accel, limits.max_accel, limits.min_accel)
}

/// Stateful steering-command limiter.
#[derive(Debug)]
pub struct TorqueLimiter {
    limits: &'static SteeringLimits,
    desired_torque_last: i32,
    rt_torque_last: i32,
    ts_torque_check_last: u32,
    ts_steer_req_mismatch_last: u32,
    valid_steer_req_count: u32,
    invalid_steer_req_count: u32,
}

impl TorqueLimiter {
    pub fn new(limits: &'static SteeringLimits) -> Self {
        Self {
            limits,
            desired_torque_last: 0,
            rt_torque_last: 0,
            ts_torque_check_last: 0,
            ts_steer_req_mismatch_last: 0,
            valid_steer_req_count: 0,
            invalid_steer_req_count: 0,
        }
    }

    pub fn limits(&self) -> &'static SteeringLimits {
        self.limits
    }

    /// Check one outbound steering command. Returns true on violation.
    ///
    /// `steer_req` is the frame's "steering request active" bit where the
    /// message carries one; `None` skips the mismatch window entirely.
    pub fn check_steer_cmd(
        &mut self,
        desired_torque: i32,
        steer_req: Option<bool>,
        controls_allowed: bool,
        driver: &TorqueSamples,
        now: Microseconds<u32>,
    ) -> bool {
        let now = now.0;
        let mut violation = false;

        if controls_allowed {
            violation |= max_limit_check(desired_torque, self.limits.max_steer, -self.limits.max_steer);

            violation |=
                driver_limit_check(desired_torque, self.desired_torque_last, driver, self.limits);
            self.desired_torque_last = desired_torque;

            violation |= rt_rate_limit_check(desired_torque, self.rt_torque_last, self.limits.max_rt_delta);

            // re-latch the real-time baseline once per interval
            if ts_elapsed(now, self.ts_torque_check_last) > self.limits.max_rt_interval.0 {
                self.rt_torque_last = desired_torque;
                self.ts_torque_check_last = now;
            }
        }

        // no torque while controls are not allowed
        if !controls_allowed && desired_torque != 0 {
            violation = true;
        }

        if let Some(req) = steer_req {
            let mismatch = !req && desired_torque != 0;
            if !self.limits.has_steer_req_tolerance {
                violation |= mismatch;
            } else if mismatch {
                if self.invalid_steer_req_count == 0 {
                    // a fresh torque cut needs enough agreeing frames behind it
                    if self.valid_steer_req_count < self.limits.min_valid_request_frames {
                        violation = true;
                    }
                    // and enough real time since the previous cut
                    if ts_elapsed(now, self.ts_steer_req_mismatch_last)
                        < self.limits.min_valid_request_rt_interval.0
                    {
                        violation = true;
                    }
                } else if self.invalid_steer_req_count >= self.limits.max_invalid_request_frames {
                    violation = true;
                }
                self.valid_steer_req_count = 0;
                self.ts_steer_req_mismatch_last = now;
                self.invalid_steer_req_count = (self.invalid_steer_req_count + 1)
                    .min(self.limits.max_invalid_request_frames);
            } else {
                self.valid_steer_req_count =
                    (self.valid_steer_req_count + 1).min(self.limits.min_valid_request_frames);
                self.invalid_steer_req_count = 0;
            }
        }

        // a stale baseline must never survive a violation or loss of authority
        if violation || !controls_allowed {
            self.reset(now);
        }

        violation
    }

    fn reset(&mut self, now: u32) {
        self.valid_steer_req_count = 0;
        self.invalid_steer_req_count = 0;
        self.desired_torque_last = 0;
        self.rt_torque_last = 0;
        self.ts_torque_check_last = now;
        self.ts_steer_req_mismatch_last = now;
    }
}
