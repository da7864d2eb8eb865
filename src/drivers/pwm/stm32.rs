use embassy_stm32::{
    interrupt::{InterruptExt, Priority},
    time::Hertz,
    timer::{simple_pwm::SimplePwm, Channel, GeneralInstance4Channel},
};

use crate::config::OUTPUT_PWM_CHANNELS;

use super::{PwmChannel, PwmCompare, PwmPinControl};

/// Output stage on one general purpose timer, channels A/B/C mapped onto
/// timer channels.
///
/// The board binds the timer update interrupt and calls
/// [`super::PwmDither::tick`] with this as the compare target from there.
pub struct Stm32PwmOutput<'d, T: GeneralInstance4Channel> {
    pwm: SimplePwm<'d, T>,
    channels: [Channel; OUTPUT_PWM_CHANNELS],
    max_compare: u16,
}

impl<'d, T: GeneralInstance4Channel> Stm32PwmOutput<'d, T> {
    pub fn new(pwm: SimplePwm<'d, T>, channels: [Channel; OUTPUT_PWM_CHANNELS]) -> Self {
        let max_compare = pwm.max_duty_cycle();
        Self {
            pwm,
            channels,
            max_compare,
        }
    }

    /// Sets the period and arms the update interrupt at `priority`.
    pub fn initialize<I: InterruptExt>(&mut self, frequency: Hertz, irq: I, priority: Priority) {
        self.pwm.set_frequency(frequency);
        self.max_compare = self.pwm.max_duty_cycle();

        for channel in self.channels {
            self.pwm.channel(channel).set_duty_cycle(0);
        }

        irq.set_priority(priority);
        // SAFETY: the handler only touches the dither state and this timer
        unsafe { irq.enable() };

        debug!("pwm: period {} counts", self.max_compare);
    }

    pub fn max_compare(&self) -> u16 {
        self.max_compare
    }
}

impl<'d, T: GeneralInstance4Channel> PwmCompare for Stm32PwmOutput<'d, T> {
    fn set_compare(&mut self, channel: PwmChannel, value: u16) {
        let value = value.min(self.max_compare);
        self.pwm.channel(self.channels[channel.index()]).set_duty_cycle(value);
    }
}

impl<'d, T: GeneralInstance4Channel> PwmPinControl for Stm32PwmOutput<'d, T> {
    fn set_pin_output(&mut self, _pin: u8, channel: PwmChannel, enabled: bool) {
        let mut ch = self.pwm.channel(self.channels[channel.index()]);
        if enabled {
            ch.enable();
        } else {
            ch.disable();
        }
    }
}
