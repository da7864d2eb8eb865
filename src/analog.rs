//! Contract of the analog acquisition layer as seen by the regulation core.
//!
//! Every voltage and current crossing this boundary is an [`AnalogValue`] in
//! raw fixed-point units. Sampling, filtering and calibration stay on the
//! other side of the trait.

use crate::config::MAX_BALANCE_CELLS;

pub type AnalogValue = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnalogInput {
    /// output terminal voltage
    Vout,
    /// pack voltage seen through the balance port
    VoutBalancer,
    /// output current
    Iout,
}

pub trait AnalogInputs {
    /// Best available pack voltage (balance port sum when connected).
    fn v_battery(&self) -> AnalogValue;

    /// Filtered raw value of a single input.
    fn value(&self, input: AnalogInput) -> AnalogValue;

    /// Calibrated value of a single input, mV for voltages and mA for currents.
    fn real_value(&self, input: AnalogInput) -> AnalogValue;

    /// True once the output has settled after the last current change.
    fn is_out_stable(&self) -> bool;

    /// Bit `n` set when balance cell `n` is connected.
    fn connected_balance_cells(&self) -> u8;
}

pub fn connected_cells(mask: u8) -> impl Iterator<Item = usize> {
    (0..MAX_BALANCE_CELLS).filter(move |cell| mask & (1 << cell) != 0)
}
