use crate::{analog::AnalogValue, config::MIN_RTH_CURRENT_DELTA};

use super::resistance::{Resistance, ResistanceScale};

/// Thevenin equivalent of one electrical node, the whole pack or a single
/// balance cell: an open circuit voltage `vth` behind a resistance `rth`.
///
/// The resistance is a two point secant across consecutive update ticks:
/// [`Thevenin::calculate_rth_vth`] compares the new sample with the one handed
/// to [`Thevenin::store_last`] on the previous tick. The estimate is only as
/// good as the tick interval is regular.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thevenin {
    v_last: AnalogValue,
    i_last: AnalogValue,
    rth: Resistance,
    vth: AnalogValue,
    v_end: AnalogValue,
    min_i: AnalogValue,
    charge: bool,
}

impl Thevenin {
    pub fn new(vth: AnalogValue, v_end: AnalogValue, min_i: AnalogValue, charge: bool) -> Self {
        let mut node = Self::default();
        node.init(vth, v_end, min_i, charge);
        node
    }

    pub fn init(&mut self, vth: AnalogValue, v_end: AnalogValue, min_i: AnalogValue, charge: bool) {
        *self = Self {
            v_last: vth,
            i_last: 0,
            rth: Resistance::UNDEFINED,
            vth,
            v_end,
            min_i,
            charge,
        };
    }

    pub fn store_last(&mut self, v: AnalogValue, i: AnalogValue) {
        self.v_last = v;
        self.i_last = i;
    }

    pub fn calculate_rth_vth(&mut self, v: AnalogValue, i: AnalogValue) {
        let current_delta = i32::from(i) - i32::from(self.i_last);

        if current_delta.abs() >= MIN_RTH_CURRENT_DELTA {
            // charging pushes the terminal voltage up with current, discharging pulls it down
            let voltage_delta = if self.charge {
                i32::from(v) - i32::from(self.v_last)
            } else {
                i32::from(self.v_last) - i32::from(v)
            };

            let rth = Resistance::new(voltage_delta, current_delta).normalized();
            if rth.is_positive() {
                self.rth = rth;
            } else {
                trace!("thevenin: rejected rth {}/{}", rth.voltage_delta, rth.current_delta);
            }
        }

        self.calculate_vth(v, i);
    }

    fn calculate_vth(&mut self, v: AnalogValue, i: AnalogValue) {
        let drop = self.rth.voltage_drop(i);
        let vth = if self.charge {
            i32::from(v) - drop
        } else {
            i32::from(v) + drop
        };

        self.vth = saturate_analog(i64::from(vth));
    }

    /// Largest current that brings the node to `v_end` under the current
    /// model. Falls back to the node's minimum current until the resistance
    /// has been measured once.
    pub fn calculate_i(&self, v_end: AnalogValue) -> AnalogValue {
        let headroom = if self.charge {
            i32::from(v_end) - i32::from(self.vth)
        } else {
            i32::from(self.vth) - i32::from(v_end)
        };

        if headroom <= 0 {
            return 0;
        }

        match self.rth.current_for_drop(headroom) {
            Some(i) => saturate_analog(i),
            None => self.min_i,
        }
    }

    /// [`Self::calculate_i`] against the end voltage given at init.
    pub fn calculate_end_i(&self) -> AnalogValue {
        self.calculate_i(self.v_end)
    }

    pub fn readable_rth(&self, scale: &ResistanceScale) -> Option<u32> {
        self.rth.readable_rth(scale)
    }

    pub fn rth(&self) -> Resistance {
        self.rth
    }

    pub fn vth(&self) -> AnalogValue {
        self.vth
    }

    pub fn v_end(&self) -> AnalogValue {
        self.v_end
    }
}

fn saturate_analog(val: i64) -> AnalogValue {
    val.clamp(0, i64::from(AnalogValue::MAX)) as AnalogValue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_resets_model() {
        let mut node = Thevenin::new(4000, 4200, 50, true);
        node.store_last(4000, 0);
        node.calculate_rth_vth(4100, 1000);
        assert!(node.rth().is_defined());

        node.init(3900, 4200, 50, true);
        assert_eq!(node.rth(), Resistance::UNDEFINED);
        assert_eq!(node.vth(), 3900);
        assert_eq!(node.v_end(), 4200);
    }

    #[test]
    fn secant_across_two_samples() {
        let mut node = Thevenin::new(100, 50, 5, false);
        node.store_last(100, 10);
        node.calculate_rth_vth(90, 20);

        assert_eq!(node.rth(), Resistance::new(10, 10));
        // discharging: vth sits above the terminal voltage
        assert_eq!(node.vth(), 110);
    }

    #[test]
    fn repeated_sample_keeps_ratio() {
        let mut node = Thevenin::new(100, 50, 5, false);
        node.store_last(100, 10);
        node.calculate_rth_vth(90, 20);
        node.store_last(90, 20);

        node.calculate_rth_vth(90, 20);
        assert_eq!(node.rth(), Resistance::new(10, 10));
        assert_eq!(node.vth(), 110);
    }

    #[test]
    fn negative_resistance_is_noise() {
        let mut node = Thevenin::new(4000, 4200, 50, true);
        node.store_last(4000, 0);
        node.calculate_rth_vth(4100, 1000);
        let rth = node.rth();
        node.store_last(4100, 1000);

        // more current, lower voltage while charging
        node.calculate_rth_vth(4050, 1500);
        assert_eq!(node.rth(), rth);
    }

    #[test]
    fn charging_current_reaches_end_voltage() {
        let mut node = Thevenin::new(4000, 4200, 50, true);
        node.store_last(4000, 0);
        // 100 counts over 1000 counts
        node.calculate_rth_vth(4100, 1000);
        assert_eq!(node.vth(), 4000);

        // 200 counts of headroom at R = 0.1
        assert_eq!(node.calculate_i(4200), 2000);
        assert_eq!(node.calculate_i(4000), 0);
        assert_eq!(node.calculate_i(3900), 0);
    }

    #[test]
    fn discharging_current_reaches_end_voltage() {
        let mut node = Thevenin::new(100, 50, 5, false);
        node.store_last(100, 10);
        node.calculate_rth_vth(90, 20);

        // vth 110, 60 counts of headroom at R = 1
        assert_eq!(node.calculate_i(50), 60);
        assert_eq!(node.calculate_i(120), 0);
    }

    #[test]
    fn unmeasured_node_probes_with_min_current() {
        let node = Thevenin::new(4000, 4200, 50, true);
        assert_eq!(node.calculate_i(4200), 50);
        assert_eq!(node.calculate_i(3999), 0);
    }

    #[test]
    fn current_saturates() {
        let mut node = Thevenin::new(1000, 60000, 50, true);
        node.store_last(1000, 0);
        node.calculate_rth_vth(1001, 1000);
        assert_eq!(node.calculate_i(60000), AnalogValue::MAX);
    }

    #[test]
    fn end_current_uses_init_end_voltage() {
        let mut node = Thevenin::new(4000, 4200, 50, true);
        assert_eq!(node.calculate_end_i(), 50);

        node.store_last(4000, 0);
        node.calculate_rth_vth(4100, 1000);
        assert_eq!(node.calculate_end_i(), node.calculate_i(4200));
        assert_eq!(node.calculate_end_i(), 2000);

        node.init(4000, 3900, 50, true);
        assert_eq!(node.calculate_end_i(), 0);
    }
}
