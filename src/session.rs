/// The device session: emergency state machine plus everything it drives.
///
/// A [`Beacon`] owns the transmission policy (and through it the sequence
/// counter), the delay timer, the LED and the blocking delay. The only
/// state it shares is [`Signals`], which the asynchronous producers write.
///
/// ```text
///  Idle --press--> Delay --press--> Cancelled --1 s--> Idle
///                    |
///                  expiry
///                    v
///                Confirmed --send(Emergency)--> Idle
/// ```
use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::comm;
use crate::config::BeaconConfig;
use crate::hal::{BatteryMonitor, Clock, DelayTimer, RadioLink};
use crate::indicator::{fault_level, set_led, StatusIndicator};
use crate::packet::PacketType;
use crate::protocol::DeviceMessage;
use crate::signal::Signals;
use crate::state::ProtocolState;
use crate::transmit::Transmitter;

/// Board resources handed to [`Beacon::new`].
pub struct BeaconParts<R, T, C, B, L, D> {
    pub radio: R,
    pub timer: T,
    pub clock: C,
    pub battery: B,
    pub led: L,
    pub delay: D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// The transceiver did not come up
    RadioInit,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::RadioInit => f.write_str("radio init failed"),
        }
    }
}

pub struct Beacon<'s, R, T, C, B, L, D> {
    signals: &'s Signals,
    config: BeaconConfig,
    transmitter: Transmitter<R>,
    timer: T,
    clock: C,
    battery: B,
    led: L,
    delay: D,
    indicator: StatusIndicator,
}

impl<'s, R, T, C, B, L, D> Beacon<'s, R, T, C, B, L, D>
where
    R: RadioLink,
    T: DelayTimer,
    C: Clock,
    B: BatteryMonitor,
    L: OutputPin,
    D: DelayNs,
{
    pub fn new(
        signals: &'s Signals,
        config: BeaconConfig,
        parts: BeaconParts<R, T, C, B, L, D>,
    ) -> Self {
        Self {
            signals,
            transmitter: Transmitter::new(parts.radio, config.device_id, config.retry_backoff_ms),
            indicator: StatusIndicator::new(config.blink_period_ms),
            config,
            timer: parts.timer,
            clock: parts.clock,
            battery: parts.battery,
            led: parts.led,
            delay: parts.delay,
        }
    }

    /// Bring up the radio and announce liveness with a single heartbeat.
    ///
    /// On error the caller must not poll; [`fail_stop`](Self::fail_stop)
    /// is the only valid continuation.
    pub fn boot(&mut self) -> Result<(), BootError> {
        set_led(&mut self.led, false);

        if !self.transmitter.initialize() {
            log::error!("FATAL: radio initialization failed");
            comm::emit(&DeviceMessage::Fault {
                reason: "radio init failed",
            });
            return Err(BootError::RadioInit);
        }

        log::info!(
            "Device {:#06x} ready, press to raise an emergency",
            self.config.device_id
        );
        self.send(PacketType::Heartbeat);
        Ok(())
    }

    /// Permanent slow blink. Never returns and never looks at the button.
    pub fn fail_stop(&mut self) -> ! {
        log::error!("Entering fail-stop");
        loop {
            let on = fault_level(self.clock.now_ms(), self.config.fault_blink_ms);
            set_led(&mut self.led, on);
            self.delay.delay_ms(self.config.poll_interval_ms);
        }
    }

    /// One polling-loop iteration.
    pub fn poll(&mut self) {
        if self.signals.take_press() {
            self.on_press();
        }

        if self.signals.state() == ProtocolState::Confirmed {
            self.on_confirmed();
        }

        let on = self
            .indicator
            .level(self.signals.state(), self.clock.now_ms());
        set_led(&mut self.led, on);
    }

    fn on_press(&mut self) {
        match self.signals.state() {
            ProtocolState::Idle => {
                log::info!(
                    "Button pressed, press again within {} ms to cancel",
                    self.config.confirm_delay_ms
                );
                // State first: the timer may only ever expire into Delay
                self.signals.set_state(ProtocolState::Delay);
                self.timer.start_once(self.config.confirm_delay_ms);
            }
            ProtocolState::Delay => {
                self.timer.cancel();
                if self
                    .signals
                    .transition(ProtocolState::Delay, ProtocolState::Cancelled)
                {
                    self.on_cancelled();
                } else {
                    log::debug!("Press lost the race with the confirmation timer");
                }
            }
            state => log::debug!("Press ignored in {}", state.as_str()),
        }
    }

    fn on_cancelled(&mut self) {
        log::info!("Emergency cancelled by user");
        self.send(PacketType::Cancel);
        set_led(&mut self.led, false);
        self.delay.delay_ms(self.config.cancel_hold_ms);
        self.finish();
    }

    fn on_confirmed(&mut self) {
        log::info!("EMERGENCY TRIGGERED");
        if self.send(PacketType::Emergency) {
            log::info!("Emergency alert transmitted");
            for _ in 0..self.config.success_flashes {
                set_led(&mut self.led, true);
                self.delay.delay_ms(self.config.success_flash_ms);
                set_led(&mut self.led, false);
                self.delay.delay_ms(self.config.success_flash_ms);
            }
        } else {
            log::error!("Emergency alert could not be transmitted");
        }
        self.finish();
    }

    /// Back to `Idle`, discarding presses that arrived while busy.
    fn finish(&mut self) {
        if self.signals.take_press() {
            log::debug!("Dropping press received in {}", self.signals.state().as_str());
        }
        self.signals.set_state(ProtocolState::Idle);
    }

    fn send(&mut self, packet_type: PacketType) -> bool {
        let battery = self.battery.read_level().min(100);
        let delivered =
            self.transmitter
                .send(packet_type, battery, &self.clock, &mut self.delay);
        if let Some(report) = self.transmitter.last_report() {
            comm::emit(&DeviceMessage::tx(&report, battery, self.clock.now_ms()));
        }
        delivered
    }

    pub fn state(&self) -> ProtocolState {
        self.signals.state()
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    pub fn transmitter(&self) -> &Transmitter<R> {
        &self.transmitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::FixedBattery;
    use crate::packet::{decode, PACKET_LEN};
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        TimerStart(u32),
        TimerCancel,
        Tx(PacketType, u16),
        Wait(u32, ProtocolState),
    }

    struct Trace {
        events: Vec<Event>,
        led: Vec<bool>,
        init_ok: bool,
        ready: bool,
        results: VecDeque<bool>,
        /// Confirmation timer fires while it is being cancelled
        expire_on_cancel: bool,
        /// A button edge arrives during every blocking wait
        press_during_waits: bool,
    }

    type Shared = Rc<RefCell<Trace>>;

    struct FakeRadio(Shared);

    impl RadioLink for FakeRadio {
        fn initialize(&mut self) -> bool {
            self.0.borrow().init_ok
        }

        fn is_ready(&mut self) -> bool {
            self.0.borrow().ready
        }

        fn transmit(&mut self, frame: &[u8; PACKET_LEN]) -> bool {
            let packet = decode(frame).unwrap();
            let mut trace = self.0.borrow_mut();
            trace
                .events
                .push(Event::Tx(packet.packet_type, packet.sequence));
            trace.results.pop_front().unwrap_or(true)
        }
    }

    struct FakeTimer<'a> {
        trace: Shared,
        signals: &'a Signals,
    }

    impl DelayTimer for FakeTimer<'_> {
        fn start_once(&mut self, duration_ms: u32) {
            self.trace
                .borrow_mut()
                .events
                .push(Event::TimerStart(duration_ms));
        }

        fn cancel(&mut self) {
            let expire = {
                let mut trace = self.trace.borrow_mut();
                trace.events.push(Event::TimerCancel);
                trace.expire_on_cancel
            };
            if expire {
                self.signals.expire_delay();
            }
        }
    }

    struct FakeClock(Rc<Cell<u64>>);

    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    struct FakeLed(Shared);

    impl embedded_hal::digital::ErrorType for FakeLed {
        type Error = Infallible;
    }

    impl OutputPin for FakeLed {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().led.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().led.push(true);
            Ok(())
        }
    }

    struct FakeDelay<'a> {
        trace: Shared,
        clock: Rc<Cell<u64>>,
        signals: &'a Signals,
    }

    impl DelayNs for FakeDelay<'_> {
        fn delay_ns(&mut self, ns: u32) {
            self.clock.set(self.clock.get() + (ns / 1_000_000) as u64);
        }

        fn delay_ms(&mut self, ms: u32) {
            let press = {
                let mut trace = self.trace.borrow_mut();
                trace.events.push(Event::Wait(ms, self.signals.state()));
                trace.press_during_waits
            };
            if press {
                self.signals.on_press_edge(self.clock.get() as u32 + ms / 2);
            }
            self.clock.set(self.clock.get() + ms as u64);
        }
    }

    struct Rig {
        trace: Shared,
        clock: Rc<Cell<u64>>,
        signals: Signals,
    }

    type TestBeacon<'a> =
        Beacon<'a, FakeRadio, FakeTimer<'a>, FakeClock, FixedBattery, FakeLed, FakeDelay<'a>>;

    impl Rig {
        fn new() -> Self {
            Self {
                trace: Rc::new(RefCell::new(Trace {
                    events: Vec::new(),
                    led: Vec::new(),
                    init_ok: true,
                    ready: true,
                    results: VecDeque::new(),
                    expire_on_cancel: false,
                    press_during_waits: false,
                })),
                clock: Rc::new(Cell::new(1_000)),
                signals: Signals::new(50),
            }
        }

        fn beacon(&self) -> TestBeacon<'_> {
            let parts = BeaconParts {
                radio: FakeRadio(self.trace.clone()),
                timer: FakeTimer {
                    trace: self.trace.clone(),
                    signals: &self.signals,
                },
                clock: FakeClock(self.clock.clone()),
                battery: FixedBattery(87),
                led: FakeLed(self.trace.clone()),
                delay: FakeDelay {
                    trace: self.trace.clone(),
                    clock: self.clock.clone(),
                    signals: &self.signals,
                },
            };
            Beacon::new(&self.signals, BeaconConfig::new(), parts)
        }

        fn advance(&self, ms: u64) {
            self.clock.set(self.clock.get() + ms);
        }

        fn press(&self, beacon: &mut TestBeacon<'_>) {
            self.signals.on_press_edge(self.clock.get() as u32);
            beacon.poll();
        }

        fn events(&self) -> Vec<Event> {
            self.trace.borrow().events.clone()
        }

        fn sent(&self) -> Vec<(PacketType, u16)> {
            self.trace
                .borrow()
                .events
                .iter()
                .filter_map(|e| match *e {
                    Event::Tx(t, s) => Some((t, s)),
                    _ => None,
                })
                .collect()
        }

        fn waits(&self) -> Vec<(u32, ProtocolState)> {
            self.trace
                .borrow()
                .events
                .iter()
                .filter_map(|e| match *e {
                    Event::Wait(ms, s) => Some((ms, s)),
                    _ => None,
                })
                .collect()
        }

        fn clear(&self) {
            let mut trace = self.trace.borrow_mut();
            trace.events.clear();
            trace.led.clear();
        }
    }

    #[test]
    fn boot_sends_one_heartbeat() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();

        assert_eq!(beacon.boot(), Ok(()));
        assert_eq!(rig.sent(), [(PacketType::Heartbeat, 0)]);
        assert_eq!(beacon.state(), ProtocolState::Idle);
        assert_eq!(beacon.transmitter().next_sequence(), 1);
    }

    #[test]
    fn boot_fails_when_radio_does_not_initialize() {
        let rig = Rig::new();
        rig.trace.borrow_mut().init_ok = false;
        let mut beacon = rig.beacon();

        assert_eq!(beacon.boot(), Err(BootError::RadioInit));
        assert!(rig.sent().is_empty());
    }

    #[test]
    fn first_press_opens_confirmation_window() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.clear();

        rig.press(&mut beacon);
        assert_eq!(beacon.state(), ProtocolState::Delay);
        assert_eq!(rig.events(), [Event::TimerStart(3_000)]);
    }

    #[test]
    fn expiry_sends_emergency_and_returns_to_idle() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.clear();

        rig.press(&mut beacon);
        rig.advance(3_000);
        assert!(rig.signals.expire_delay());
        assert_eq!(beacon.state(), ProtocolState::Confirmed);

        beacon.poll();
        assert_eq!(rig.sent(), [(PacketType::Emergency, 1)]);
        assert_eq!(beacon.state(), ProtocolState::Idle);

        // Success flash: 10 on/off pairs of 100 ms, all while Confirmed
        let waits = rig.waits();
        assert_eq!(waits.len(), 20);
        assert!(waits
            .iter()
            .all(|&w| w == (100, ProtocolState::Confirmed)));
        assert_eq!(rig.trace.borrow().led.last(), Some(&false));
    }

    #[test]
    fn second_press_cancels_and_holds() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.clear();

        rig.press(&mut beacon);
        rig.advance(1_500);
        rig.press(&mut beacon);

        assert_eq!(
            rig.events(),
            [
                Event::TimerStart(3_000),
                Event::TimerCancel,
                Event::Tx(PacketType::Cancel, 1),
                Event::Wait(1_000, ProtocolState::Cancelled),
            ]
        );
        assert_eq!(beacon.state(), ProtocolState::Idle);
    }

    #[test]
    fn stale_expiry_after_cancel_is_discarded() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();

        rig.press(&mut beacon);
        rig.advance(500);
        rig.press(&mut beacon);
        rig.clear();

        assert!(!rig.signals.expire_delay());
        beacon.poll();
        assert_eq!(beacon.state(), ProtocolState::Idle);
        assert!(rig.sent().is_empty());
    }

    #[test]
    fn press_racing_expiry_lets_emergency_proceed() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.press(&mut beacon);
        rig.clear();

        rig.trace.borrow_mut().expire_on_cancel = true;
        rig.advance(2_999);
        rig.press(&mut beacon);

        assert_eq!(rig.sent(), [(PacketType::Emergency, 1)]);
        assert_eq!(beacon.state(), ProtocolState::Idle);
    }

    #[test]
    fn retry_after_failed_transmit() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.clear();
        rig.trace.borrow_mut().results = VecDeque::from([false, true]);

        rig.press(&mut beacon);
        rig.advance(3_000);
        rig.signals.expire_delay();
        beacon.poll();

        assert_eq!(
            rig.sent(),
            [(PacketType::Emergency, 1), (PacketType::Emergency, 2)]
        );
        let waits = rig.waits();
        assert_eq!(waits[0], (500, ProtocolState::Confirmed));
        // Delivered on retry, so the success flash still runs
        assert_eq!(waits.len(), 21);
        assert_eq!(beacon.state(), ProtocolState::Idle);
    }

    #[test]
    fn undelivered_emergency_still_returns_to_idle() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.clear();
        rig.trace.borrow_mut().results = VecDeque::from([false, false]);

        rig.press(&mut beacon);
        rig.signals.expire_delay();
        beacon.poll();

        assert_eq!(rig.sent().len(), 2);
        assert_eq!(rig.waits(), [(500, ProtocolState::Confirmed)]);
        assert_eq!(beacon.state(), ProtocolState::Idle);
    }

    #[test]
    fn radio_not_ready_skips_transmission() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();
        rig.clear();
        rig.trace.borrow_mut().ready = false;

        rig.press(&mut beacon);
        rig.signals.expire_delay();
        beacon.poll();

        assert!(rig.sent().is_empty());
        assert!(rig.waits().is_empty());
        assert_eq!(beacon.state(), ProtocolState::Idle);
        assert_eq!(beacon.transmitter().next_sequence(), 1);
    }

    #[test]
    fn press_while_confirmed_is_ignored() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();

        rig.press(&mut beacon);
        rig.signals.expire_delay();
        rig.advance(100);
        rig.clear();
        rig.press(&mut beacon);

        assert_eq!(rig.sent(), [(PacketType::Emergency, 1)]);
        assert!(!rig.events().contains(&Event::TimerStart(3_000)));
        assert_eq!(beacon.state(), ProtocolState::Idle);
    }

    #[test]
    fn presses_during_cancel_hold_are_not_queued() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();

        rig.press(&mut beacon);
        rig.advance(800);
        rig.trace.borrow_mut().press_during_waits = true;
        rig.press(&mut beacon);
        assert_eq!(beacon.state(), ProtocolState::Idle);

        rig.trace.borrow_mut().press_during_waits = false;
        rig.clear();
        rig.advance(10);
        beacon.poll();
        assert_eq!(beacon.state(), ProtocolState::Idle);
        assert!(rig.events().is_empty());
    }

    #[test]
    fn presses_during_success_flash_are_not_queued() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();

        rig.press(&mut beacon);
        rig.signals.expire_delay();
        rig.trace.borrow_mut().press_during_waits = true;
        beacon.poll();
        assert_eq!(beacon.state(), ProtocolState::Idle);

        rig.trace.borrow_mut().press_during_waits = false;
        rig.clear();
        rig.advance(10);
        beacon.poll();
        assert!(rig.events().is_empty());
    }

    #[test]
    fn contact_bounce_does_not_cancel() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();

        rig.press(&mut beacon);
        rig.advance(20);
        rig.press(&mut beacon);
        assert_eq!(beacon.state(), ProtocolState::Delay);
        assert!(!rig.events().contains(&Event::TimerCancel));
    }

    #[test]
    fn led_blinks_during_delay_and_goes_dark_after_cancel() {
        let rig = Rig::new();
        let mut beacon = rig.beacon();
        beacon.boot().unwrap();

        rig.press(&mut beacon);
        rig.clear();
        for _ in 0..60 {
            rig.advance(10);
            beacon.poll();
        }
        let led = rig.trace.borrow().led.clone();
        assert!(led.contains(&true));
        assert!(led.contains(&false));

        rig.press(&mut beacon);
        assert_eq!(rig.trace.borrow().led.last(), Some(&false));
    }
}
