/// Transmission policy: encode a packet and get it onto the radio with at
/// most one retry.
///
/// Radio transmission is the only unreliable step in the device. A single
/// retry after a fixed backoff covers transient contention while keeping
/// the worst-case blocking time of the polling loop bounded.
use embedded_hal::delay::DelayNs;

use crate::hal::{Clock, RadioLink};
use crate::packet::{PacketCodec, PacketType, PACKET_LEN};

/// Upper bound on transmit attempts per `send`.
pub const MAX_ATTEMPTS: u8 = 2;

/// Outcome of the most recent [`Transmitter::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub packet_type: PacketType,
    /// 0 when the radio was not ready and nothing was encoded
    pub attempts: u8,
    /// Sequence number of the last packet handed to the radio
    pub sequence: Option<u16>,
    pub delivered: bool,
}

/// Owns the radio link and the packet codec (and with it the device's
/// sequence counter).
pub struct Transmitter<R> {
    radio: R,
    codec: PacketCodec,
    device_id: u16,
    backoff_ms: u32,
    last_report: Option<SendReport>,
}

impl<R: RadioLink> Transmitter<R> {
    pub fn new(radio: R, device_id: u16, backoff_ms: u32) -> Self {
        Self {
            radio,
            codec: PacketCodec::new(),
            device_id,
            backoff_ms,
            last_report: None,
        }
    }

    /// Bring up the underlying radio link.
    pub fn initialize(&mut self) -> bool {
        self.radio.initialize()
    }

    /// Send one packet of `packet_type`.
    ///
    /// Returns `false` straight away if the radio is not ready. Otherwise a
    /// failed transmission is retried once, after `backoff_ms`, with a
    /// freshly encoded packet (new sequence number and timestamp).
    pub fn send<C, D>(
        &mut self,
        packet_type: PacketType,
        battery_level: u8,
        clock: &C,
        delay: &mut D,
    ) -> bool
    where
        C: Clock + ?Sized,
        D: DelayNs + ?Sized,
    {
        let mut report = SendReport {
            packet_type,
            attempts: 0,
            sequence: None,
            delivered: false,
        };

        if !self.radio.is_ready() {
            log::warn!("Radio not ready, {} packet dropped", packet_type.as_str());
            self.last_report = Some(report);
            return false;
        }

        let battery_level = battery_level.min(100);

        while report.attempts < MAX_ATTEMPTS && !report.delivered {
            if report.attempts > 0 {
                log::warn!(
                    "{} packet #{} failed, retrying in {} ms",
                    packet_type.as_str(),
                    report.sequence.unwrap_or_default(),
                    self.backoff_ms
                );
                delay.delay_ms(self.backoff_ms);
            }

            let sequence = self.codec.next_sequence();
            let frame = self
                .codec
                .encode(packet_type, battery_level, self.device_id, clock);
            report.attempts += 1;
            report.sequence = Some(sequence);
            report.delivered = self.transmit(&frame, packet_type, sequence);
        }

        if !report.delivered {
            log::warn!(
                "{} packet abandoned after {} attempts",
                packet_type.as_str(),
                report.attempts
            );
        }

        self.last_report = Some(report);
        report.delivered
    }

    fn transmit(&mut self, frame: &[u8; PACKET_LEN], packet_type: PacketType, sequence: u16) -> bool {
        log::info!("Sending {} packet #{}", packet_type.as_str(), sequence);
        let ok = self.radio.transmit(frame);
        if ok {
            log::info!("Packet #{} transmitted", sequence);
        }
        ok
    }

    pub fn last_report(&self) -> Option<SendReport> {
        self.last_report
    }

    /// Sequence number the next packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.codec.next_sequence()
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}
