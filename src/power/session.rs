use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use embassy_time::Ticker;

use crate::{
    analog::{AnalogInput, AnalogInputs, AnalogValue},
    config::CHARGE_TICK_INTERVAL,
    drivers::pwm::{PwmError, PwmOutput, PwmPinControl},
    math::linear_map::LinearMap,
};

use super::{balancer::Balancer, strategy::StrategyConfig, thevenin_method::TheveninMethod};

/// Maps a commanded current onto a power stage duty, in dither steps.
pub trait CurrentToDuty {
    fn duty_for(&self, current: AnalogValue) -> u32;
}

/// Straight line from the current calibration points to duty.
pub struct LinearCurrentToDuty {
    map: LinearMap<i64>,
}

impl LinearCurrentToDuty {
    pub const fn new(map: LinearMap<i64>) -> Self {
        Self { map }
    }
}

impl CurrentToDuty for LinearCurrentToDuty {
    fn duty_for(&self, current: AnalogValue) -> u32 {
        if current == 0 {
            return 0;
        }

        self.map.map_bounded(i64::from(current)).clamp(0, i64::from(u32::MAX)) as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionOutcome {
    Complete,
    Stopped,
}

/// One charge or discharge run: the regulation state machine plus the output
/// pin it drives.
pub struct ChargeSession<M: CurrentToDuty> {
    method: TheveninMethod,
    charge: bool,
    pin: u8,
    to_duty: M,
}

impl<M: CurrentToDuty> ChargeSession<M> {
    pub fn new(config: StrategyConfig, charge: bool, pin: u8, to_duty: M) -> Self {
        Self {
            method: TheveninMethod::new(config),
            charge,
            pin,
            to_duty,
        }
    }

    pub fn start<A: AnalogInputs, B: Balancer>(&mut self, analog: &A, balancer: &B) {
        self.method.initialize(self.charge, analog, balancer);
    }

    pub fn is_end_vout<A: AnalogInputs>(&self, analog: &A) -> bool {
        let v = analog.v_battery();
        let end_v = self.method.config().end_v;

        if self.charge {
            v >= end_v
        } else {
            v <= end_v
        }
    }

    /// One control tick. Returns true once the session is complete, the
    /// output is disabled by then.
    pub fn step<A: AnalogInputs, B: Balancer, H: PwmPinControl>(
        &mut self,
        analog: &A,
        balancer: &mut B,
        output: &mut PwmOutput<'_>,
        hw: &mut H,
    ) -> Result<bool, PwmError> {
        let i = analog.value(AnalogInput::Iout);
        let is_end_vout = self.is_end_vout(analog);

        if self.method.balance_is_complete(is_end_vout, i, balancer) {
            info!("session: complete at {}", analog.v_battery());
            output.disable(hw, self.pin)?;
            return Ok(true);
        }

        let new_i = self.method.calculate_new_i(is_end_vout, i, analog, balancer);
        output.set_duty(hw, self.pin, self.to_duty.duty_for(new_i))?;

        Ok(false)
    }

    pub fn method(&self) -> &TheveninMethod {
        &self.method
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

/// Drives `session` every [`CHARGE_TICK_INTERVAL`] until it completes or
/// `stop` is signaled.
pub async fn run_charge_session<M, A, B, H, R>(
    session: &mut ChargeSession<M>,
    analog: &A,
    balancer: &mut B,
    output: &mut PwmOutput<'_>,
    hw: &mut H,
    stop: &Signal<R, ()>,
) -> Result<SessionOutcome, PwmError>
where
    M: CurrentToDuty,
    A: AnalogInputs,
    B: Balancer,
    H: PwmPinControl,
    R: RawMutex,
{
    session.start(analog, balancer);
    let mut ticker = Ticker::every(CHARGE_TICK_INTERVAL);

    loop {
        match select(ticker.next(), stop.wait()).await {
            Either::First(_) => {
                if session.step(analog, balancer, output, hw)? {
                    return Ok(SessionOutcome::Complete);
                }
            }
            Either::Second(_) => {
                warn!("session: stopped in {}", session.method().state());
                output.disable(hw, session.pin())?;
                return Ok(SessionOutcome::Stopped);
            }
        }
    }
}
