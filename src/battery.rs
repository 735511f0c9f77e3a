/// Battery level estimation for single-cell Li-ion packs.
///
/// Linear mapping between the empty and full cell voltages. Crude, but the
/// receiver only needs a rough figure to prioritise a low-battery unit.
use crate::hal::BatteryMonitor;

/// Cell voltage reported as 0 %.
pub const CELL_EMPTY_MV: u32 = 3_000;
/// Cell voltage reported as 100 %.
pub const CELL_FULL_MV: u32 = 4_200;

/// Charge percentage for a cell voltage, clamped to 0..=100.
pub fn level_from_millivolts(millivolts: u32) -> u8 {
    if millivolts <= CELL_EMPTY_MV {
        return 0;
    }
    if millivolts >= CELL_FULL_MV {
        return 100;
    }
    ((millivolts - CELL_EMPTY_MV) * 100 / (CELL_FULL_MV - CELL_EMPTY_MV)) as u8
}

/// Cell voltage from a raw 12-bit ADC sample taken behind a resistive
/// divider (`divider` = cell voltage / pin voltage).
pub fn millivolts_from_raw(raw: u16, reference_mv: u32, divider: u32) -> u32 {
    (raw.min(4095) as u32) * reference_mv * divider / 4095
}

/// Battery sensed through an ADC channel behind a resistive divider.
///
/// `sample` returns one raw 12-bit reading; the firmware wraps its ADC
/// driver in a closure so this type stays independent of the HAL.
pub struct AdcBattery<F> {
    sample: F,
    reference_mv: u32,
    divider: u32,
}

impl<F: FnMut() -> u16> AdcBattery<F> {
    pub fn new(sample: F, reference_mv: u32, divider: u32) -> Self {
        Self {
            sample,
            reference_mv,
            divider,
        }
    }

    pub fn read_millivolts(&mut self) -> u32 {
        millivolts_from_raw((self.sample)(), self.reference_mv, self.divider)
    }
}

impl<F: FnMut() -> u16> BatteryMonitor for AdcBattery<F> {
    fn read_level(&mut self) -> u8 {
        level_from_millivolts(self.read_millivolts())
    }
}

/// For boards without a battery sense pin: always reports the same level.
pub struct FixedBattery(pub u8);

impl BatteryMonitor for FixedBattery {
    fn read_level(&mut self) -> u8 {
        self.0.min(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_below_empty_and_above_full() {
        assert_eq!(level_from_millivolts(0), 0);
        assert_eq!(level_from_millivolts(2_900), 0);
        assert_eq!(level_from_millivolts(3_000), 0);
        assert_eq!(level_from_millivolts(4_200), 100);
        assert_eq!(level_from_millivolts(5_000), 100);
    }

    #[test]
    fn linear_between_limits() {
        assert_eq!(level_from_millivolts(3_600), 50);
        assert_eq!(level_from_millivolts(3_300), 25);
        assert_eq!(level_from_millivolts(4_188), 99);
    }

    #[test]
    fn raw_sample_through_divider() {
        // Full-scale pin reading behind a 2:1 divider at 3.3 V reference
        assert_eq!(millivolts_from_raw(4095, 3_300, 2), 6_600);
        assert_eq!(millivolts_from_raw(0, 3_300, 2), 0);
        // Out-of-range samples saturate
        assert_eq!(millivolts_from_raw(u16::MAX, 3_300, 2), 6_600);
        assert_eq!(level_from_millivolts(millivolts_from_raw(2370, 3_300, 2)), 68);
    }

    #[test]
    fn adc_battery_samples_on_every_read() {
        let mut samples = [4095u16, 2370, 0].into_iter();
        let mut battery = AdcBattery::new(move || samples.next().unwrap_or(0), 3_300, 2);
        assert_eq!(battery.read_level(), 100);
        assert_eq!(battery.read_level(), 68);
        assert_eq!(battery.read_level(), 0);
    }

    #[test]
    fn fixed_battery_is_clamped() {
        assert_eq!(FixedBattery(100).read_level(), 100);
        assert_eq!(FixedBattery(180).read_level(), 100);
        assert_eq!(FixedBattery(37).read_level(), 37);
    }
}
