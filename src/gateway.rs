//! Bus topology discovery and frame forwarding decisions.
//!
//! Bus 0 carries the main vehicle CAN, bus 2 the camera CAN, and bus 1
//! is an optional extra harness drop where the power-steering unit or
//! radar may live on some installs. The gateway discovers the install
//! from live traffic, keeps per-message suppression windows for frames
//! the assistance stack is currently originating itself, and answers
//! "where does this frame go" for every frame on every bus.

use heapless::Deque;
use num_derive::{FromPrimitive, ToPrimitive};

use crate::frame::CanFrame;
use crate::ts_elapsed;
use crate::Timestamp;

/// Forwarding destination for one frame. The two-digit variants fan a
/// frame out to both named buses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(i8)]
pub enum FwdBus {
    None = -1,
    Bus0 = 0,
    Bus1 = 1,
    Bus2 = 2,
    Bus1And0 = 10,
    Bus1And2 = 12,
    Bus2And0 = 20,
}

/// Requested bus-1 transceiver role, surfaced to the caller as an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObdMode {
    /// Probe the OBD-II connector pins on bus 1.
    ObdCan2,
    /// Plain CAN on bus 1.
    Normal,
}

/// Topology discoveries and mode changes, drained by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A local-CAN (body network) message appeared on bus 1.
    LcanOnBus1,
    /// Bus 1 has been quiet of local-CAN traffic long enough.
    LcanClearedOnBus1,
    /// The stock camera is wired directly to bus 0; bus 2 forwarding off.
    StockCameraOnBus0,
    /// Bus 2 traffic resumed with no stock camera on bus 0.
    Bus2ForwardingRestored,
    EpsDiscovered { bus: u8 },
    SccDiscovered { bus: u8 },
    Bus1ForwardingEnabled,
    ObdModeRequest(ObdMode),
}

/// Static address map of the vehicle platform being gated.
#[derive(Debug)]
pub struct Topology {
    /// Steering command from camera/stack.
    pub steer_cmd: u16,
    /// Lane-assist HUD companion of the steering command.
    pub steer_aux: u16,
    /// Power-steering sensor message.
    pub eps_sensor: u16,
    /// Alternate power-steering message used for OBD-drop detection.
    pub alt_eps: u16,
    /// Engine message the stack relays toward the steering unit.
    pub ems_relay: u16,
    /// Cluster message the stack relays toward the steering unit.
    pub cluster_relay: u16,
    /// Radar cruise messages the stack replaces under longitudinal control.
    pub scc_msgs: &'static [u16],
    /// Forward-collision-assist messages the stack may replace.
    pub fca_msgs: &'static [u16],
    /// Body-network messages that identify bus 1 as a local CAN tap.
    pub lcan_msgs: &'static [u16],
}

/// Frame classes the stack can originate, each with its own suppression
/// window: while the stack is sending a class itself, the stock copy is
/// not forwarded across.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackMsg {
    Steer,
    Longitudinal,
    EpsRelay,
    Fca,
    EmsRelay,
    ClusterRelay,
}

impl StackMsg {
    fn index(self) -> usize {
        match self {
            StackMsg::Steer => 0,
            StackMsg::Longitudinal => 1,
            StackMsg::EpsRelay => 2,
            StackMsg::Fca => 3,
            StackMsg::EmsRelay => 4,
            StackMsg::ClusterRelay => 5,
        }
    }

    /// Suppression window after the stack's last transmission of this class.
    fn window(self) -> u32 {
        match self {
            StackMsg::Longitudinal | StackMsg::Fca => 400_000,
            _ => 200_000,
        }
    }
}

const STACK_MSG_COUNT: usize = 6;

/// Frames of bus-2 traffic required before bus-2 forwarding is restored
/// after a stock camera was seen on bus 0.
const STEER_CMD_BUS0_DEBOUNCE: u32 = 20;

/// Frames of non-body bus-1 traffic required before the local-CAN flag
/// clears again.
const LCAN_BUS1_DEBOUNCE: u32 = 500;

/// Bus-1 frames observed while probing for an OBD-connector drop.
const OBD_PROBE_FRAMES: u32 = 20;

const EVENT_QUEUE_DEPTH: usize = 16;

/// Forwarding engine. All decisions are pure functions of discovered
/// topology, the suppression windows, and the frame itself.
pub struct Gateway {
    topo: &'static Topology,
    fwd_bus1: bool,
    fwd_bus2: bool,
    fwd_obd: bool,
    lcan_on_bus1: bool,
    eps_bus: i8,
    scc_bus: i8,
    steer_cmd_bus0_cnt: u32,
    lcan_bus1_cnt: u32,
    obd_cnt: u32,
    has_obd: bool,
    // last stack transmission per class; None = never sent
    guards: [Option<u32>; STACK_MSG_COUNT],
    events: Deque<GatewayEvent, EVENT_QUEUE_DEPTH>,
}

impl Gateway {
    pub fn new(topo: &'static Topology, has_obd: bool) -> Self {
        Self {
            topo,
            fwd_bus1: false,
            fwd_bus2: true,
            fwd_obd: false,
            lcan_on_bus1: false,
            eps_bus: -1,
            scc_bus: -1,
            steer_cmd_bus0_cnt: 0,
            lcan_bus1_cnt: 0,
            obd_cnt: if has_obd { OBD_PROBE_FRAMES } else { 0 },
            has_obd,
            guards: [None; STACK_MSG_COUNT],
            events: Deque::new(),
        }
    }

    pub fn topology(&self) -> &'static Topology {
        self.topo
    }

    pub fn eps_bus(&self) -> i8 {
        self.eps_bus
    }

    pub fn scc_bus(&self) -> i8 {
        self.scc_bus
    }

    pub fn bus1_forwarding(&self) -> bool {
        self.fwd_bus1 || self.fwd_obd
    }

    pub fn bus2_forwarding(&self) -> bool {
        self.fwd_bus2
    }

    /// Oldest undrained topology event, if any.
    pub fn pop_event(&mut self) -> Option<GatewayEvent> {
        self.events.pop_front()
    }

    fn push_event(&mut self, ev: GatewayEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        // cannot fail after the pop above
        self.events.push_back(ev).ok();
    }

    /// Record a stack transmission of `msg`. Blocked transmissions clear
    /// the window so a rejected command never suppresses the stock copy.
    pub fn note_stack_tx(&mut self, msg: StackMsg, allowed: bool, now: Timestamp) {
        self.guards[msg.index()] = if allowed { Some(now.0) } else { None };
    }

    fn stack_active(&self, msg: StackMsg, now: u32) -> bool {
        match self.guards[msg.index()] {
            Some(last) => ts_elapsed(now, last) < msg.window(),
            None => false,
        }
    }

    fn is_lcan(&self, addr: u16) -> bool {
        self.topo.lcan_msgs.contains(&addr)
    }

    fn is_scc(&self, addr: u16) -> bool {
        self.topo.scc_msgs.contains(&addr)
    }

    fn is_fca(&self, addr: u16) -> bool {
        self.topo.fca_msgs.contains(&addr)
    }

    /// Update topology state from one inbound frame. Runs on every frame
    /// the rx hook sees, before any validity judgement.
    pub fn observe_rx(&mut self, frame: &CanFrame) {
        if frame.addr == self.topo.steer_cmd && frame.bus == 0 {
            // a stock camera talking straight onto the vehicle bus
            self.steer_cmd_bus0_cnt = STEER_CMD_BUS0_DEBOUNCE;
            if self.fwd_bus2 {
                self.fwd_bus2 = false;
                self.push_event(GatewayEvent::StockCameraOnBus0);
            }
        }

        if frame.bus == 2 && frame.addr == self.topo.steer_cmd {
            if self.steer_cmd_bus0_cnt > 0 {
                self.steer_cmd_bus0_cnt -= 1;
            } else if !self.fwd_bus2 {
                self.fwd_bus2 = true;
                self.push_event(GatewayEvent::Bus2ForwardingRestored);
            }
        }

        if frame.bus == 0 {
            if frame.addr == self.topo.eps_sensor && self.eps_bus < 0 {
                self.eps_bus = 0;
                self.push_event(GatewayEvent::EpsDiscovered { bus: 0 });
            }
            if self.is_scc(frame.addr) && self.scc_bus < 0 {
                self.scc_bus = 0;
                self.push_event(GatewayEvent::SccDiscovered { bus: 0 });
            }
        }

        if frame.bus == 1 {
            if self.is_lcan(frame.addr) {
                self.lcan_bus1_cnt = LCAN_BUS1_DEBOUNCE;
                if !self.lcan_on_bus1 {
                    self.lcan_on_bus1 = true;
                    self.push_event(GatewayEvent::LcanOnBus1);
                }
                if self.fwd_bus1 {
                    self.fwd_bus1 = false;
                }
            } else if self.lcan_bus1_cnt > 0 {
                self.lcan_bus1_cnt -= 1;
            } else if self.lcan_on_bus1 {
                self.lcan_on_bus1 = false;
                self.push_event(GatewayEvent::LcanClearedOnBus1);
            }

            if self.has_obd && !self.fwd_bus1 && self.obd_cnt > 0 {
                if self.obd_cnt == OBD_PROBE_FRAMES {
                    self.push_event(GatewayEvent::ObdModeRequest(ObdMode::ObdCan2));
                }
                if frame.addr == self.topo.alt_eps && self.obd_cnt < OBD_PROBE_FRAMES {
                    // steering unit found behind the OBD connector
                    self.fwd_obd = true;
                    self.obd_cnt = 0;
                    self.push_event(GatewayEvent::Bus1ForwardingEnabled);
                } else {
                    self.obd_cnt -= 1;
                    if self.obd_cnt == 0 && !self.fwd_obd {
                        self.push_event(GatewayEvent::ObdModeRequest(ObdMode::Normal));
                    }
                }
            }

            if !self.lcan_on_bus1 {
                if frame.addr == self.topo.eps_sensor {
                    if self.eps_bus != 1 {
                        self.eps_bus = 1;
                        self.push_event(GatewayEvent::EpsDiscovered { bus: 1 });
                    }
                    if !self.fwd_bus1 {
                        self.fwd_bus1 = true;
                        self.push_event(GatewayEvent::Bus1ForwardingEnabled);
                    }
                }
                if self.is_scc(frame.addr) {
                    if self.scc_bus != 1 {
                        self.scc_bus = 1;
                        self.push_event(GatewayEvent::SccDiscovered { bus: 1 });
                    }
                    if !self.fwd_bus1 {
                        self.fwd_bus1 = true;
                        self.push_event(GatewayEvent::Bus1ForwardingEnabled);
                    }
                }
            }
        }
    }

    /// Forwarding decision for one frame.
    pub fn decide(&self, frame: &CanFrame, now: Timestamp) -> FwdBus {
        let now = now.0;
        let bus1_live = self.bus1_forwarding();
        let to_bus1 = if bus1_live { FwdBus::Bus1 } else { FwdBus::None };

        if !self.fwd_bus2 {
            // stock camera on bus 0: never bridge bus 0 and bus 2
            return match frame.bus {
                0 => to_bus1,
                1 if bus1_live => FwdBus::Bus0,
                _ => FwdBus::None,
            };
        }

        match frame.bus {
            0 => {
                if self.stack_active(StackMsg::ClusterRelay, now)
                    && frame.addr == self.topo.cluster_relay
                    && self.eps_bus != 0
                {
                    // stack re-emits the cluster message on bus 1 itself
                    return FwdBus::Bus2;
                }
                if self.stack_active(StackMsg::EpsRelay, now) && frame.addr == self.topo.eps_sensor
                {
                    return to_bus1;
                }
                if self.stack_active(StackMsg::EmsRelay, now) && frame.addr == self.topo.ems_relay {
                    return FwdBus::Bus2;
                }
                if bus1_live {
                    FwdBus::Bus1And2
                } else {
                    FwdBus::Bus2
                }
            }
            1 if bus1_live => {
                if self.stack_active(StackMsg::EpsRelay, now) && frame.addr == self.topo.eps_sensor
                {
                    return FwdBus::Bus0;
                }
                if self.stack_active(StackMsg::Longitudinal, now) && self.is_scc(frame.addr) {
                    return FwdBus::Bus2;
                }
                FwdBus::Bus2And0
            }
            2 => {
                if frame.addr == self.topo.steer_cmd || frame.addr == self.topo.steer_aux {
                    if self.stack_active(StackMsg::Steer, now) {
                        // stack is steering: block the stock command from the car
                        return if self.eps_bus == 0 { to_bus1 } else { FwdBus::None };
                    }
                } else if self.is_scc(frame.addr) && self.stack_active(StackMsg::Longitudinal, now)
                {
                    return to_bus1;
                } else if self.is_fca(frame.addr) && self.stack_active(StackMsg::Fca, now) {
                    return to_bus1;
                }
                if bus1_live {
                    FwdBus::Bus1And0
                } else {
                    FwdBus::Bus0
                }
            }
            _ => FwdBus::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_time::duration::Microseconds;

    const TOPO: Topology = Topology {
        steer_cmd: 832,
        steer_aux: 1157,
        eps_sensor: 593,
        alt_eps: 897,
        ems_relay: 790,
        cluster_relay: 1265,
        scc_msgs: &[905, 1056, 1057, 1290],
        fca_msgs: &[909, 1155],
        lcan_msgs: &[1296, 524],
    };

    fn f(bus: u8, addr: u16) -> CanFrame {
        CanFrame::new(bus, addr, &[0; 8])
    }

    #[test]
    fn default_topology_bridges_bus0_and_bus2() {
        let gw = Gateway::new(&TOPO, false);
        assert_eq!(gw.decide(&f(0, 100), Microseconds(0)), FwdBus::Bus2);
        assert_eq!(gw.decide(&f(2, 100), Microseconds(0)), FwdBus::Bus0);
        assert_eq!(gw.decide(&f(1, 100), Microseconds(0)), FwdBus::None);
    }

    #[test]
    fn steer_guard_blocks_stock_command_then_expires() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.note_stack_tx(StackMsg::Steer, true, Microseconds(1_000_000));
        let lkas = f(2, 832);
        assert_eq!(gw.decide(&lkas, Microseconds(1_050_000)), FwdBus::None);
        assert_eq!(gw.decide(&lkas, Microseconds(1_199_999)), FwdBus::None);
        // window is 200 ms; after that the stock command flows again
        assert_eq!(gw.decide(&lkas, Microseconds(1_200_000)), FwdBus::Bus0);
    }

    #[test]
    fn blocked_stack_tx_does_not_arm_the_guard() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.note_stack_tx(StackMsg::Steer, false, Microseconds(1_000_000));
        assert_eq!(gw.decide(&f(2, 832), Microseconds(1_050_000)), FwdBus::Bus0);
    }

    #[test]
    fn guard_never_fires_before_first_stack_tx() {
        let gw = Gateway::new(&TOPO, false);
        // timer near zero at boot must not look like a recent transmission
        assert_eq!(gw.decide(&f(2, 832), Microseconds(10)), FwdBus::Bus0);
    }

    #[test]
    fn stock_camera_on_bus0_cuts_bus2_and_recovers() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.observe_rx(&f(0, 832));
        assert_eq!(gw.pop_event(), Some(GatewayEvent::StockCameraOnBus0));
        assert!(!gw.bus2_forwarding());
        assert_eq!(gw.decide(&f(0, 100), Microseconds(0)), FwdBus::None);
        assert_eq!(gw.decide(&f(2, 100), Microseconds(0)), FwdBus::None);

        // sustained bus-2 steer commands with no further bus-0 copy
        for _ in 0..21 {
            gw.observe_rx(&f(2, 832));
        }
        assert_eq!(gw.pop_event(), Some(GatewayEvent::Bus2ForwardingRestored));
        assert!(gw.bus2_forwarding());
    }

    #[test]
    fn unrelated_bus2_traffic_does_not_restore_forwarding() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.observe_rx(&f(0, 832));
        assert!(!gw.bus2_forwarding());
        gw.pop_event();

        // aggregate bus-2 chatter runs much faster than the 50 Hz steer
        // command; only bus-2 copies of the command count the debounce down
        for _ in 0..200 {
            gw.observe_rx(&f(2, 100));
        }
        assert!(!gw.bus2_forwarding());
        assert_eq!(gw.pop_event(), None);

        for _ in 0..21 {
            gw.observe_rx(&f(2, 832));
        }
        assert!(gw.bus2_forwarding());
    }

    #[test]
    fn eps_on_bus1_enables_bus1_forwarding() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.observe_rx(&f(1, 593));
        assert_eq!(gw.pop_event(), Some(GatewayEvent::EpsDiscovered { bus: 1 }));
        assert_eq!(gw.pop_event(), Some(GatewayEvent::Bus1ForwardingEnabled));
        assert_eq!(gw.eps_bus(), 1);
        assert_eq!(gw.decide(&f(0, 100), Microseconds(0)), FwdBus::Bus1And2);
        assert_eq!(gw.decide(&f(1, 100), Microseconds(0)), FwdBus::Bus2And0);
        assert_eq!(gw.decide(&f(2, 100), Microseconds(0)), FwdBus::Bus1And0);
    }

    #[test]
    fn lcan_on_bus1_disables_bus1_forwarding() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.observe_rx(&f(1, 593));
        assert!(gw.bus1_forwarding());
        gw.observe_rx(&f(1, 1296));
        assert!(!gw.bus1_forwarding());
        let mut saw_lcan = false;
        while let Some(ev) = gw.pop_event() {
            saw_lcan |= ev == GatewayEvent::LcanOnBus1;
        }
        assert!(saw_lcan);
        // body traffic present: the steering unit seen there is ignored
        gw.observe_rx(&f(1, 593));
        assert!(!gw.bus1_forwarding());
    }

    #[test]
    fn eps_relay_guard_reroutes_the_sensor_message() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.observe_rx(&f(1, 593));
        while gw.pop_event().is_some() {}
        gw.note_stack_tx(StackMsg::EpsRelay, true, Microseconds(500_000));
        // the stack relays the sensor message itself, so the stock copies
        // must not cross between bus 0/1 and bus 2
        assert_eq!(gw.decide(&f(0, 593), Microseconds(550_000)), FwdBus::Bus1);
        assert_eq!(gw.decide(&f(1, 593), Microseconds(550_000)), FwdBus::Bus0);
        assert_eq!(gw.decide(&f(0, 593), Microseconds(750_000)), FwdBus::Bus1And2);
    }

    #[test]
    fn longitudinal_guard_blocks_radar_toward_the_car() {
        let mut gw = Gateway::new(&TOPO, false);
        gw.note_stack_tx(StackMsg::Longitudinal, true, Microseconds(2_000_000));
        assert_eq!(gw.decide(&f(2, 1057), Microseconds(2_100_000)), FwdBus::None);
        // 400 ms window for longitudinal
        assert_eq!(gw.decide(&f(2, 1057), Microseconds(2_399_000)), FwdBus::None);
        assert_eq!(gw.decide(&f(2, 1057), Microseconds(2_400_000)), FwdBus::Bus0);
    }

    #[test]
    fn obd_probe_requests_modes_and_finds_eps() {
        let mut gw = Gateway::new(&TOPO, true);
        gw.observe_rx(&f(1, 100));
        assert_eq!(
            gw.pop_event(),
            Some(GatewayEvent::ObdModeRequest(ObdMode::ObdCan2))
        );
        gw.observe_rx(&f(1, 897));
        assert_eq!(gw.pop_event(), Some(GatewayEvent::Bus1ForwardingEnabled));
        assert!(gw.bus1_forwarding());
    }

    #[test]
    fn obd_probe_times_out_to_normal() {
        let mut gw = Gateway::new(&TOPO, true);
        for _ in 0..OBD_PROBE_FRAMES {
            gw.observe_rx(&f(1, 100));
        }
        assert_eq!(
            gw.pop_event(),
            Some(GatewayEvent::ObdModeRequest(ObdMode::ObdCan2))
        );
        assert_eq!(
            gw.pop_event(),
            Some(GatewayEvent::ObdModeRequest(ObdMode::Normal))
        );
        assert!(!gw.bus1_forwarding());
    }
}
