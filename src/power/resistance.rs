use crate::{analog::AnalogValue, math::{linear_map::LinearMap, range::Range}};

pub const MILLIOHM_PER_OHM: i64 = 1000;

/// Raw to physical scaling of the two components of a [`Resistance`].
///
/// `voltage` maps raw voltage counts to mV, `current` maps raw current counts
/// to mA.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResistanceScale {
    pub voltage: LinearMap<i64>,
    pub current: LinearMap<i64>,
}

impl ResistanceScale {
    /// For ratios that were built from values already in mV and mA.
    pub const REAL: ResistanceScale = ResistanceScale {
        voltage: LinearMap::new(Range::new(0, 1), Range::new(0, 1)),
        current: LinearMap::new(Range::new(0, 1), Range::new(0, 1)),
    };
}

/// A resistance kept as the ratio of a voltage delta over a current delta in
/// raw units. Nothing is divided until someone asks for a readable value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resistance {
    pub voltage_delta: i32,
    pub current_delta: i32,
}

impl Resistance {
    pub const UNDEFINED: Resistance = Resistance { voltage_delta: 0, current_delta: 0 };

    pub const fn new(voltage_delta: i32, current_delta: i32) -> Self {
        Self { voltage_delta, current_delta }
    }

    pub fn is_defined(&self) -> bool {
        self.current_delta != 0
    }

    /// Physically meaningful: defined with both deltas the same sign.
    pub fn is_positive(&self) -> bool {
        self.is_defined() && (self.voltage_delta > 0) == (self.current_delta > 0) && self.voltage_delta != 0
    }

    /// Same ratio with a positive current delta.
    pub fn normalized(self) -> Self {
        if self.current_delta < 0 {
            Self::new(-self.voltage_delta, -self.current_delta)
        } else {
            self
        }
    }

    /// Voltage dropped across this resistance at `current`, in raw units.
    pub fn voltage_drop(&self, current: AnalogValue) -> i32 {
        if !self.is_defined() {
            return 0;
        }

        let drop = i64::from(current) * i64::from(self.voltage_delta) / i64::from(self.current_delta);
        saturate_i32(drop)
    }

    /// Current that drops `voltage` across this resistance, in raw units.
    pub fn current_for_drop(&self, voltage: i32) -> Option<i64> {
        if !self.is_positive() {
            return None;
        }

        Some(i64::from(voltage) * i64::from(self.current_delta) / i64::from(self.voltage_delta))
    }

    /// Resistance in milliohm, `None` while the current delta is zero.
    pub fn readable_rth(&self, scale: &ResistanceScale) -> Option<u32> {
        if !self.is_defined() || scale.voltage.is_degenerate() || scale.current.is_degenerate() {
            return None;
        }

        let voltage_mv = scale.voltage.map_delta(i64::from(self.voltage_delta));
        let current_ma = scale.current.map_delta(i64::from(self.current_delta));
        if current_ma == 0 {
            return None;
        }

        let milliohm = voltage_mv * MILLIOHM_PER_OHM / current_ma;
        u32::try_from(milliohm.max(0)).ok()
    }
}

fn saturate_i32(val: i64) -> i32 {
    val.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
