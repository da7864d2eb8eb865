use std::cell::Cell;

use ateam_lib_charger::{
    analog::{AnalogInput, AnalogInputs, AnalogValue},
    drivers::pwm::{PwmChannel, PwmCompare, PwmDither, PwmDuty, PwmOutput, PwmPinControl},
    math::{linear_map::LinearMap, range::Range},
    power::{
        balancer::Balancer,
        session::{ChargeSession, LinearCurrentToDuty},
        strategy::{StrategyConfig, StrategyStatus},
        thevenin_method::ChargeState,
    },
};

const CELLS: usize = 3;
const END_V: AnalogValue = 12600;
const MIN_I: AnalogValue = 50;
const MAX_I: AnalogValue = 2000;
const PIN: u8 = 19;
const PRECISION: u32 = 16;

// Three cells charged from an ideal current source. Every cell is an open
// circuit voltage that rises 1 count per `capacity` current-ticks behind a
// 1/20 resistance.
struct SimPack {
    ocv: [Cell<AnalogValue>; CELLS],
    acc: [Cell<u32>; CELLS],
    capacity: [u32; CELLS],
    i: Cell<AnalogValue>,
    stable: Cell<bool>,
}

impl SimPack {
    fn new(ocv: [AnalogValue; CELLS], capacity: [u32; CELLS]) -> Self {
        Self {
            ocv: ocv.map(Cell::new),
            acc: Default::default(),
            capacity,
            i: Cell::new(0),
            stable: Cell::new(true),
        }
    }

    fn cell_v(&self, cell: usize) -> AnalogValue {
        self.ocv[cell].get() + self.i.get() / 20
    }

    fn apply(&self, i: AnalogValue) {
        self.i.set(i);
        for cell in 0..CELLS {
            let mut acc = self.acc[cell].get() + u32::from(i);
            while acc >= self.capacity[cell] {
                acc -= self.capacity[cell];
                self.ocv[cell].set(self.ocv[cell].get() + 1);
            }
            self.acc[cell].set(acc);
        }
    }
}

impl AnalogInputs for SimPack {
    fn v_battery(&self) -> AnalogValue {
        (0..CELLS).map(|cell| self.cell_v(cell)).sum()
    }

    fn value(&self, input: AnalogInput) -> AnalogValue {
        match input {
            AnalogInput::Iout => self.i.get(),
            AnalogInput::Vout | AnalogInput::VoutBalancer => self.v_battery(),
        }
    }

    fn real_value(&self, input: AnalogInput) -> AnalogValue {
        self.value(input)
    }

    fn is_out_stable(&self) -> bool {
        self.stable.get()
    }

    fn connected_balance_cells(&self) -> u8 {
        0b111
    }
}

// Reports `passes` non-complete polls, bleeding on every other tick meanwhile.
struct SimBalancer<'a> {
    pack: &'a SimPack,
    passes: u32,
    polls: u32,
    ended: u16,
    end_balancing_calls: u32,
    tick: u32,
}

impl<'a> SimBalancer<'a> {
    fn new(pack: &'a SimPack, passes: u32) -> Self {
        Self { pack, passes, polls: 0, ended: 0, end_balancing_calls: 0, tick: 0 }
    }
}

impl<'a> Balancer for SimBalancer<'a> {
    fn do_strategy(&mut self) -> StrategyStatus {
        self.polls += 1;
        if self.passes > 0 {
            self.passes -= 1;
            if self.passes == 0 {
                self.ended = self.ended.wrapping_add(1);
            }
            return StrategyStatus::Running;
        }
        StrategyStatus::Complete
    }

    fn end_balancing(&mut self) {
        self.end_balancing_calls += 1;
    }

    fn is_working(&self) -> bool {
        self.passes > 0 && self.tick % 2 == 1
    }

    fn is_calibration_required(&self) -> bool {
        false
    }

    fn reset_min_cell(&mut self) {}

    fn presumed_v(&self, cell: usize) -> AnalogValue {
        self.pack.cell_v(cell)
    }

    fn calculate_per_cell(&self, v: AnalogValue) -> AnalogValue {
        v / CELLS as AnalogValue
    }

    fn set_done(&mut self, _done: bool) {}

    fn balancing_ended(&self) -> u16 {
        self.ended
    }
}

#[derive(Default)]
struct Stage {
    compare_sum: u32,
    enabled: bool,
}

impl PwmCompare for Stage {
    fn set_compare(&mut self, channel: PwmChannel, value: u16) {
        if channel == PwmChannel::A {
            self.compare_sum += u32::from(value);
        }
    }
}

impl PwmPinControl for Stage {
    fn set_pin_output(&mut self, _pin: u8, _channel: PwmChannel, enabled: bool) {
        self.enabled = enabled;
    }
}

fn state_order(state: ChargeState) -> u8 {
    match state {
        ChargeState::ConstantCurrentBalancing => 0,
        ChargeState::ConstantCurrent => 1,
        ChargeState::RthMeasurement => 2,
        ChargeState::LastRthMeasurement => 3,
        ChargeState::LastConstantCurrent => 4,
        ChargeState::ConstantVoltageBalancing => 5,
    }
}

struct Run {
    ticks: u32,
    final_state: ChargeState,
    final_current: AnalogValue,
    max_current: AnalogValue,
}

fn charge(pack: &SimPack, balancer: &mut SimBalancer, balance_enabled: bool, max_ticks: u32) -> Option<Run> {
    let duty = PwmDuty::new();
    let mut output = PwmOutput::new(&duty);
    output.bind(PIN, PwmChannel::A).unwrap();
    let mut dither = PwmDither::<PRECISION>::new();
    let mut stage = Stage::default();

    let to_duty = LinearCurrentToDuty::new(LinearMap::new(Range::new(0, 1000), Range::new(0, 4000)));
    let config = StrategyConfig::new(END_V, MIN_I, MAX_I, balance_enabled);
    let mut session = ChargeSession::new(config, true, PIN, to_duty);
    session.start(pack, balancer);

    let mut max_current = 0;
    let mut order = 0;
    for tick in 0..max_ticks {
        balancer.tick = tick;
        if session.step(pack, balancer, &mut output, &mut stage).unwrap() {
            assert!(!stage.enabled);
            assert_eq!(duty.get(PwmChannel::A), 0);
            return Some(Run {
                ticks: tick,
                final_state: session.method().state(),
                final_current: pack.i.get(),
                max_current,
            });
        }

        let current = session.method().current();
        assert!(current <= MAX_I);
        max_current = max_current.max(current);

        let next_order = state_order(session.method().state());
        assert!(next_order >= order, "state went backwards at tick {}", tick);
        order = next_order;

        // one control tick is many output periods, the writes average out exactly
        stage.compare_sum = 0;
        for _ in 0..PRECISION {
            dither.tick(&duty, &mut stage);
        }
        assert_eq!(stage.compare_sum, duty.get(PwmChannel::A));

        pack.apply(current);
    }

    None
}

#[test]
fn three_cell_charge_completes() {
    let pack = SimPack::new([4000, 4020, 3990], [1000, 1100, 1200]);
    let mut balancer = SimBalancer::new(&pack, 0);

    let run = charge(&pack, &mut balancer, false, 2000).expect("charge did not complete");

    assert_eq!(run.final_state, ChargeState::ConstantVoltageBalancing);
    assert!(run.final_current <= MIN_I);
    assert_eq!(run.max_current, MAX_I);
    assert!(pack.v_battery() >= END_V);
    assert_eq!(balancer.end_balancing_calls, 1);
    // 10 debounce ticks on the plateau at least
    assert!(run.ticks > 10);
}

#[test]
fn charge_waits_for_balancer() {
    let pack = SimPack::new([4000, 4020, 3990], [1000, 1100, 1200]);
    let mut balancer = SimBalancer::new(&pack, 40);

    let run = charge(&pack, &mut balancer, true, 2000).expect("charge did not complete");

    assert_eq!(run.final_state, ChargeState::ConstantVoltageBalancing);
    assert_eq!(balancer.passes, 0);
    assert_eq!(balancer.ended, 1);
    assert!(balancer.polls > 40);
    assert!(balancer.end_balancing_calls >= 1);
}

#[test]
fn unsettled_output_never_starts() {
    let pack = SimPack::new([4000, 4020, 3990], [1000, 1100, 1200]);
    pack.stable.set(false);
    let mut balancer = SimBalancer::new(&pack, 0);

    assert!(charge(&pack, &mut balancer, false, 200).is_none());
    assert_eq!(pack.i.get(), 0);
    assert_eq!(pack.ocv[0].get(), 4000);
}
