//! Charge current regulation built on Thevenin models of the pack and of
//! every connected balance cell.
//!
//! Possible transitions:
//!   RthMeasurement <--> ConstantCurrentBalancing --> ConstantCurrent -->
//!   LastRthMeasurement --> LastConstantCurrent --> ConstantVoltageBalancing

use crate::{
    analog::{connected_cells, AnalogInput, AnalogInputs, AnalogValue},
    config::{BALANCER_I, COMPLETION_TICKS, MAX_BALANCE_CELLS},
};

use super::{
    balancer::Balancer,
    resistance::{Resistance, ResistanceScale},
    strategy::{StrategyConfig, StrategyStatus},
    thevenin::Thevenin,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeState {
    ConstantCurrentBalancing,
    ConstantCurrent,
    RthMeasurement,
    LastRthMeasurement,
    LastConstantCurrent,
    ConstantVoltageBalancing,
}

pub struct TheveninMethod {
    config: StrategyConfig,
    state: ChargeState,
    new_i: AnalogValue,

    t_vout: Thevenin,
    t_bal: [Thevenin; MAX_BALANCE_CELLS],
    connected_cells: u8,

    full_count: u8,
    last_balancing_ended: u16,
    bstatus: StrategyStatus,
}

impl TheveninMethod {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            state: ChargeState::ConstantCurrentBalancing,
            new_i: 0,
            t_vout: Thevenin::default(),
            t_bal: [Thevenin::default(); MAX_BALANCE_CELLS],
            connected_cells: 0,
            full_count: 0,
            last_balancing_ended: 0,
            bstatus: StrategyStatus::Complete,
        }
    }

    pub fn initialize<A: AnalogInputs, B: Balancer>(&mut self, charge: bool, analog: &A, balancer: &B) {
        self.bstatus = StrategyStatus::Complete;

        let vout = analog.v_battery();
        self.t_vout.init(vout, self.config.end_v, self.config.min_i, charge);

        let v_end_per_cell = balancer.calculate_per_cell(self.config.end_v);

        // the cell set is latched for the whole session
        self.connected_cells = analog.connected_balance_cells();
        for cell in connected_cells(self.connected_cells) {
            let v = balancer.presumed_v(cell);
            self.t_bal[cell].init(v, v_end_per_cell, self.config.min_i, charge);
        }

        self.state = ChargeState::ConstantCurrentBalancing;
        self.full_count = 0;
        self.new_i = 0;

        info!("thevenin: session start, charge {}, vout {}, cells {=u8:b}", charge, vout, self.connected_cells);
    }

    /// Runs one control tick and returns the current to command.
    pub fn calculate_new_i<A: AnalogInputs, B: Balancer>(
        &mut self,
        is_end_vout: bool,
        i: AnalogValue,
        analog: &A,
        balancer: &mut B,
    ) -> AnalogValue {
        // update when output is stable or end voltage reached
        let mut update_i = analog.is_out_stable() || (is_end_vout && self.new_i != 0);

        // bleed switches disturb the presumed cell voltages
        update_i = update_i && !balancer.is_working();

        if !update_i {
            return self.new_i;
        }

        debug!("thevenin: I {}, Rth {}/{}, Vth {}",
            i, self.t_vout.rth().voltage_delta, self.t_vout.rth().current_delta, self.t_vout.vth());

        self.calculate_rth_vth(i, analog, balancer);
        self.store_i(i, analog, balancer);

        let previous_i = self.new_i;
        let mut new_i = self.calculate_i();

        if new_i < previous_i {
            // low pass filter, only on the way down
            new_i = ((u32::from(new_i) + u32::from(previous_i)) / 2) as AnalogValue;
        }

        let new_i = self.normalize_i(new_i, previous_i, balancer);
        self.new_i = self.advance_state(is_end_vout, new_i, balancer);

        debug!("thevenin: normalized I {}", self.new_i);
        self.new_i
    }

    /// Session completion verdict, polled every tick next to [`Self::calculate_new_i`].
    pub fn balance_is_complete<B: Balancer>(&mut self, is_end_vout: bool, i: AnalogValue, balancer: &mut B) -> bool {
        if self.config.balance_enabled {
            if is_end_vout && self.state == ChargeState::ConstantCurrentBalancing {
                balancer.end_balancing();
                self.set_state(ChargeState::ConstantCurrent);
            }

            if matches!(self.state, ChargeState::ConstantCurrentBalancing | ChargeState::ConstantVoltageBalancing) {
                if i > BALANCER_I.max(self.config.min_i) {
                    balancer.set_done(false);
                }

                self.bstatus = balancer.do_strategy();
                if self.bstatus != StrategyStatus::Complete {
                    // not complete until we finish balancing
                    self.full_count = 0;
                    return false;
                }

                if balancer.is_calibration_required() {
                    balancer.reset_min_cell();
                }
            }
        }

        if i <= self.min_i_with_balancer() && is_end_vout && self.state == ChargeState::ConstantVoltageBalancing {
            self.full_count = self.full_count.saturating_add(1);
            if self.full_count >= COMPLETION_TICKS {
                return true;
            }
        } else {
            self.full_count = 0;
        }

        false
    }

    /// Take one zero current reading of the resistance before continuing the
    /// balancing constant current phase. Only honoured in that phase.
    pub fn request_rth_measurement(&mut self) -> bool {
        if self.state != ChargeState::ConstantCurrentBalancing {
            return false;
        }

        self.set_state(ChargeState::RthMeasurement);
        self.new_i = 0;
        true
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    pub fn current(&self) -> AnalogValue {
        self.new_i
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn readable_batt_rth(&self, scale: &ResistanceScale) -> Option<u32> {
        self.t_vout.readable_rth(scale)
    }

    pub fn readable_rth_cell(&self, cell: usize, scale: &ResistanceScale) -> Option<u32> {
        if cell >= MAX_BALANCE_CELLS || self.connected_cells & (1 << cell) == 0 {
            return None;
        }

        self.t_bal.get(cell)?.readable_rth(scale)
    }

    /// Resistance of the output leads, from the drop between the output
    /// terminals and the balance port.
    pub fn readable_wires_rth<A: AnalogInputs>(&self, analog: &A) -> Option<u32> {
        let v_out = i32::from(analog.real_value(AnalogInput::Vout));
        let v_balancer = i32::from(analog.real_value(AnalogInput::VoutBalancer));
        let i_out = i32::from(analog.real_value(AnalogInput::Iout));

        Resistance::new(v_out - v_balancer, i_out).readable_rth(&ResistanceScale::REAL)
    }

    fn min_i_with_balancer(&self) -> AnalogValue {
        if self.bstatus != StrategyStatus::Complete {
            0
        } else {
            self.config.min_i
        }
    }

    fn set_state(&mut self, state: ChargeState) {
        if self.state != state {
            info!("thevenin: {} -> {}", self.state, state);
        }
        self.state = state;
    }

    fn advance_state<B: Balancer>(&mut self, is_end_vout: bool, new_i: AnalogValue, balancer: &mut B) -> AnalogValue {
        let (next_state, new_i) = match self.state {
            ChargeState::ConstantCurrentBalancing => {
                if is_end_vout {
                    balancer.end_balancing();
                    (ChargeState::ConstantCurrent, new_i)
                } else {
                    (ChargeState::ConstantCurrentBalancing, new_i)
                }
            }
            ChargeState::ConstantCurrent => {
                if is_end_vout {
                    // temporarily turn off for a zero current reading
                    (ChargeState::LastRthMeasurement, 0)
                } else {
                    (ChargeState::ConstantCurrent, new_i)
                }
            }
            ChargeState::RthMeasurement => (ChargeState::ConstantCurrentBalancing, new_i),
            ChargeState::LastRthMeasurement => (ChargeState::LastConstantCurrent, 0),
            ChargeState::LastConstantCurrent => {
                if is_end_vout {
                    (ChargeState::ConstantVoltageBalancing, new_i)
                } else {
                    (ChargeState::LastConstantCurrent, new_i)
                }
            }
            ChargeState::ConstantVoltageBalancing => (ChargeState::ConstantVoltageBalancing, new_i),
        };

        self.set_state(next_state);
        new_i
    }

    fn calculate_rth_vth<A: AnalogInputs, B: Balancer>(&mut self, i: AnalogValue, analog: &A, balancer: &B) {
        self.t_vout.calculate_rth_vth(analog.v_battery(), i);

        for cell in connected_cells(self.connected_cells) {
            self.t_bal[cell].calculate_rth_vth(balancer.presumed_v(cell), i);
        }
    }

    fn store_i<A: AnalogInputs, B: Balancer>(&mut self, i: AnalogValue, analog: &A, balancer: &B) {
        self.t_vout.store_last(analog.v_battery(), i);

        for cell in connected_cells(self.connected_cells) {
            self.t_bal[cell].store_last(balancer.presumed_v(cell), i);
        }
    }

    // per cell end voltages were latched at initialize
    fn calculate_i(&self) -> AnalogValue {
        connected_cells(self.connected_cells)
            .map(|cell| self.t_bal[cell].calculate_end_i())
            .fold(self.t_vout.calculate_end_i(), AnalogValue::min)
    }

    fn normalize_i<B: Balancer>(&mut self, new_i: AnalogValue, i: AnalogValue, balancer: &B) -> AnalogValue {
        let min_i = self.min_i_with_balancer();
        let new_i = new_i.max(min_i).min(self.config.max_i);

        if i != new_i {
            // update current when:
            // - we are NOT in the ConstantVoltageBalancing state, or
            // - the new current is smaller than the previous one, or
            // - the new current is not larger than the minimum, or
            // - the previous current sat at the minimum and a balancing pass ended since
            if self.state != ChargeState::ConstantVoltageBalancing
                || new_i < i
                || new_i <= min_i
                || (i <= self.config.min_i && self.last_balancing_ended != balancer.balancing_ended())
            {
                self.last_balancing_ended = balancer.balancing_ended();
                return new_i;
            }
        }

        i
    }
}
