use crate::analog::AnalogValue;

use super::strategy::StrategyStatus;

/// The per cell balancer as seen by the regulation core.
///
/// How the balancer picks which cells to bleed is its own business. The core
/// only polls it, asks it to wrap up a pass, and reads the presumed cell
/// voltages it derives from the balance port.
pub trait Balancer {
    /// Advance the balancing strategy by one step.
    fn do_strategy(&mut self) -> StrategyStatus;

    /// Finish the current balancing pass as soon as possible.
    fn end_balancing(&mut self);

    /// True while bleed switches are on. Cell voltages are disturbed then.
    fn is_working(&self) -> bool;

    fn is_calibration_required(&self) -> bool;

    /// Pick the reference (lowest) cell again on the next pass.
    fn reset_min_cell(&mut self);

    /// Voltage of `cell` corrected for the bleed current, raw units.
    fn presumed_v(&self, cell: usize) -> AnalogValue;

    /// Share of a pack level value that falls onto one cell.
    fn calculate_per_cell(&self, v: AnalogValue) -> AnalogValue;

    fn set_done(&mut self, done: bool);

    /// Incremented every time a balancing pass ends, wraps.
    fn balancing_ended(&self) -> u16;
}
