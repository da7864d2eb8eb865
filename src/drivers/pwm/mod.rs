//! Power stage PWM with sub-LSB resolution.
//!
//! Duties are commanded in 1/`PRECISION` steps of the compare register. The
//! period interrupt accumulates the commanded duty and writes the integer part,
//! carrying the remainder into the next period, so the time averaged duty is
//! exact even though every single period is rounded.
//!
//! The control loop only writes [`PwmDuty`] words, the interrupt only reads
//! them. Each channel is a single `AtomicU32`, so a reader never sees half a
//! duty. Several channels are only updated together inside a critical section
//! ([`PwmDuty::set_all`]).

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Vec;

use crate::config::{MAX_PWM_PINS, OUTPUT_PWM_CHANNELS, OUTPUT_PWM_PRECISION_FACTOR};

#[cfg(feature = "stm32")]
pub mod stm32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmChannel {
    A,
    B,
    C,
}

impl PwmChannel {
    pub const ALL: [PwmChannel; OUTPUT_PWM_CHANNELS] = [PwmChannel::A, PwmChannel::B, PwmChannel::C];

    pub const fn index(self) -> usize {
        match self {
            PwmChannel::A => 0,
            PwmChannel::B => 1,
            PwmChannel::C => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmError {
    UnknownPin,
    ChannelBusy,
    TooManyPins,
}

/// Compare register access, called from the period interrupt.
pub trait PwmCompare {
    fn set_compare(&mut self, channel: PwmChannel, value: u16);
}

/// Output enable of a physical pin, configuration time only.
pub trait PwmPinControl {
    fn set_pin_output(&mut self, pin: u8, channel: PwmChannel, enabled: bool);
}

pub struct PwmDuty {
    duty: [AtomicU32; OUTPUT_PWM_CHANNELS],
}

impl PwmDuty {
    pub const fn new() -> Self {
        Self {
            duty: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
        }
    }

    pub fn set(&self, channel: PwmChannel, value: u32) {
        self.duty[channel.index()].store(value, Ordering::SeqCst);
    }

    pub fn get(&self, channel: PwmChannel) -> u32 {
        self.duty[channel.index()].load(Ordering::SeqCst)
    }

    pub fn set_all(&self, values: [u32; OUTPUT_PWM_CHANNELS]) {
        critical_section::with(|_| {
            for (duty, value) in self.duty.iter().zip(values) {
                duty.store(value, Ordering::SeqCst);
            }
        });
    }
}

impl Default for PwmDuty {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt side of the output. `PRECISION` must not be zero.
pub struct PwmDither<const PRECISION: u32 = OUTPUT_PWM_PRECISION_FACTOR> {
    sum: [u32; OUTPUT_PWM_CHANNELS],
}

impl<const PRECISION: u32> PwmDither<PRECISION> {
    pub const fn new() -> Self {
        Self {
            sum: [0; OUTPUT_PWM_CHANNELS],
        }
    }

    /// Call once per timer period.
    pub fn tick<H: PwmCompare>(&mut self, duty: &PwmDuty, hw: &mut H) {
        for channel in PwmChannel::ALL {
            let sum = &mut self.sum[channel.index()];
            let total = u64::from(*sum) + u64::from(duty.get(channel));

            let compare = (total / u64::from(PRECISION)).min(u64::from(u16::MAX)) as u16;
            hw.set_compare(channel, compare);

            *sum = (total % u64::from(PRECISION)) as u32;
        }
    }

    pub fn residue(&self, channel: PwmChannel) -> u32 {
        self.sum[channel.index()]
    }
}

impl<const PRECISION: u32> Default for PwmDither<PRECISION> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmPinBinding {
    pub pin: u8,
    pub channel: PwmChannel,
}

/// Control loop side of the output: which pin drives which channel.
///
/// A channel is owned by at most one enabled pin. Pins sharing a channel have
/// to wait for the owner to be disabled.
pub struct PwmOutput<'a> {
    duty: &'a PwmDuty,
    bindings: Vec<PwmPinBinding, MAX_PWM_PINS>,
    owner: [Option<u8>; OUTPUT_PWM_CHANNELS],
}

impl<'a> PwmOutput<'a> {
    pub fn new(duty: &'a PwmDuty) -> Self {
        Self {
            duty,
            bindings: Vec::new(),
            owner: [None; OUTPUT_PWM_CHANNELS],
        }
    }

    pub fn bind(&mut self, pin: u8, channel: PwmChannel) -> Result<(), PwmError> {
        if self.owner.contains(&Some(pin)) {
            return Err(PwmError::ChannelBusy);
        }

        if let Some(binding) = self.bindings.iter_mut().find(|binding| binding.pin == pin) {
            binding.channel = channel;
            return Ok(());
        }

        self.bindings.push(PwmPinBinding { pin, channel }).map_err(|_| PwmError::TooManyPins)
    }

    pub fn channel_of(&self, pin: u8) -> Result<PwmChannel, PwmError> {
        self.bindings
            .iter()
            .find(|binding| binding.pin == pin)
            .map(|binding| binding.channel)
            .ok_or(PwmError::UnknownPin)
    }

    pub fn set_duty<H: PwmPinControl>(&mut self, hw: &mut H, pin: u8, value: u32) -> Result<(), PwmError> {
        let channel = self.channel_of(pin)?;
        let owner = &mut self.owner[channel.index()];

        match *owner {
            Some(owner_pin) if owner_pin != pin => {
                warn!("pwm: pin {} blocked, channel {} driven by pin {}", pin, channel, owner_pin);
                Err(PwmError::ChannelBusy)
            }
            Some(_) => {
                self.duty.set(channel, value);
                Ok(())
            }
            None => {
                self.duty.set(channel, value);
                *owner = Some(pin);
                hw.set_pin_output(pin, channel, true);
                Ok(())
            }
        }
    }

    pub fn disable<H: PwmPinControl>(&mut self, hw: &mut H, pin: u8) -> Result<(), PwmError> {
        let channel = self.channel_of(pin)?;

        hw.set_pin_output(pin, channel, false);
        if self.owner[channel.index()] == Some(pin) {
            self.owner[channel.index()] = None;
            self.duty.set(channel, 0);
        }

        Ok(())
    }

    pub fn is_enabled(&self, pin: u8) -> bool {
        self.owner.contains(&Some(pin))
    }
}
