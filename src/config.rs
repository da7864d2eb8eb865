// Compile time limits shared by every charger target. Board crates pick the
// session values (end voltage, current limits) through StrategyConfig, these
// are the hardware/firmware constants underneath.

use embassy_time::Duration;

use crate::analog::AnalogValue;

// balance port width of the largest supported target (8S)
pub const MAX_BALANCE_CELLS: usize = 8;

// current the balancer bleed resistors can sink on their own (50mA on the
// reference calibration), above this the balancer has to be re-armed
pub const BALANCER_I: AnalogValue = 50;

// consecutive qualifying ticks before a session is reported complete
pub const COMPLETION_TICKS: u8 = 10;

// current deltas smaller than this are ADC noise, not a new secant point
pub const MIN_RTH_CURRENT_DELTA: i32 = 2;

// the output compare register is written with duty / PRECISION every period,
// the remainder is carried into the next period
pub const OUTPUT_PWM_PRECISION_FACTOR: u32 = 16;
pub const OUTPUT_PWM_FREQUENCY_HZ: u32 = 32_000;
pub const OUTPUT_PWM_CHANNELS: usize = 3;
pub const MAX_PWM_PINS: usize = 8;

pub const CHARGE_TICK_INTERVAL: Duration = Duration::from_millis(100);
