use crate::analog::AnalogValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StrategyStatus {
    Running,
    Complete,
    Error,
}

/// Per session settings, read only to the regulation core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StrategyConfig {
    /// pack end voltage, raw units
    pub end_v: AnalogValue,
    /// current floor outside of balancing, raw units
    pub min_i: AnalogValue,
    /// hard current ceiling, raw units
    pub max_i: AnalogValue,
    pub balance_enabled: bool,
}

impl StrategyConfig {
    pub const fn new(end_v: AnalogValue, min_i: AnalogValue, max_i: AnalogValue, balance_enabled: bool) -> Self {
        Self {
            end_v,
            min_i,
            max_i,
            balance_enabled,
        }
    }
}
