//! Цикл испытаний: связи, шаг, измерения, статистика.

#[cfg(test)]
pub mod test_scenarios;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::coin::CoinOperator;
use crate::config::WalkOptions;
use crate::error::{Result, WalkError};
use crate::evolution::{Evolution, StepBuffers};
use crate::grid::Grid;
use crate::lattice::Lattice;
use crate::links::LinkState;
use crate::measure::{measure_detectors, random_measure, DetectorSet};
use crate::screen::ObservationScreen;
use crate::state::{Axis, WalkState};
use crate::statistics::{
    estimate_stationary, observe_step, AverageDistribution, MixingTracker, StatisticsAccumulator,
    StatisticsRecord,
};
use crate::WALK_TOL;

/// Исход измерения детекторами на шаге испытания
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionEvent {
    pub trial: usize,
    pub iteration: usize,
    pub outcome: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub lattice: Lattice,
    /// Распределение в конце испытания, усреднённое по испытаниям
    pub average: Grid<f64>,
    /// Волновая функция в конце последнего испытания
    pub last_state: WalkState,
    pub statistics: Vec<StatisticsRecord>,
    pub stationary: Option<Grid<f64>>,
    pub screen: Option<ObservationScreen>,
    pub detections: Vec<DetectionEvent>,
}

pub struct Simulation {
    options: WalkOptions,
    lattice: Lattice,
    evolution: Evolution,
    initial: WalkState,
    base_links: LinkState,
    detectors: Option<DetectorSet>,
    screen: Option<ObservationScreen>,
    seed: u64,
}

impl Simulation {
    /// Проверяет опции и строит всё, что не меняется между испытаниями
    pub fn new(options: WalkOptions) -> Result<Self> {
        options.validate()?;
        let lattice = options.lattice()?;
        let coin = CoinOperator::build(options.coin, lattice.dims(), options.custom_coin.as_deref())?;
        if !coin.is_unitary(WALK_TOL) {
            warn!("Монета {} не унитарна, норма не будет сохраняться", options.coin);
        }
        let evolution = Evolution::new(lattice, coin, options.scan_mode)?;
        let initial = WalkState::initial(lattice, options.state, options.custom_state.as_deref())?;

        let mut base_links = LinkState::new(lattice)?;
        if !options.defects.is_empty() {
            base_links.apply_defects(&options.defects)?;
            info!("Постоянно разорвано {} ветвей связей", base_links.broken_count());
        }
        let detectors = if options.detectors.is_empty() {
            None
        } else {
            Some(DetectorSet::new(&lattice, &options.detectors)?)
        };
        let screen = options
            .screen
            .map(|spec| ObservationScreen::new(&lattice, spec))
            .transpose()?;
        let seed = options.resolved_seed();
        info!(
            "Решётка {} ({}D), max={}, шагов {}, испытаний {}, зерно {}",
            lattice.topology(),
            lattice.dims(),
            lattice.max(),
            options.steps,
            options.experiments,
            seed
        );
        Ok(Self {
            options,
            lattice,
            evolution,
            initial,
            base_links,
            detectors,
            screen,
            seed,
        })
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn check_state(&self, state: &WalkState, iteration: usize) -> Result<()> {
        let checks = self.options.checks;
        if checks.norm && !state.check_norm() {
            return Err(WalkError::NormDrift {
                iteration,
                total: state.total_probability(),
            });
        }
        if checks.symmetry_x && !state.check_symmetry(Axis::X) {
            return Err(WalkError::Asymmetric { iteration, axis: 'x' });
        }
        if checks.symmetry_y && !state.check_symmetry(Axis::Y) {
            return Err(WalkError::Asymmetric { iteration, axis: 'y' });
        }
        Ok(())
    }

    fn stationary(&self) -> Result<Option<Grid<f64>>> {
        let options = &self.options;
        if !options.mixing_enabled() {
            return Ok(None);
        }
        if options.break_probabilities.any() || options.decoherence > 0.0 {
            let message = "стационарное распределение оценивается без разрывов и декогеренции";
            if options.strict {
                return Err(WalkError::Config(message.to_string()));
            }
            warn!("{}: при декогеренции предел всегда равномерный", message);
        }
        estimate_stationary(&self.evolution, &self.initial, &self.base_links, options.mixing_steps).map(Some)
    }

    /// Выполняет все испытания. Одно и то же зерно даёт один и тот же отчёт.
    pub fn run(&self) -> Result<SimulationReport> {
        let options = &self.options;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let stationary = self.stationary()?;
        let mut tracker = stationary
            .clone()
            .map(|grid| MixingTracker::new(self.lattice, grid))
            .transpose()?;
        let mut accumulator = StatisticsAccumulator::new(options.steps, options.experiments)?;
        let mut average = AverageDistribution::new(&self.lattice, options.experiments)?;
        let mut screen = self.screen.clone();
        let mut detections = Vec::new();

        let mut buffers = StepBuffers::new(self.initial.clone())?;
        let mut links = self.base_links.clone();
        let breaking = options.break_probabilities.any();

        for trial in 1..=options.experiments {
            info!("Испытание {} из {}", trial, options.experiments);
            buffers.reset(self.initial.clone())?;
            let mut end = options.steps;
            let mut t = 0;
            while t < end {
                if breaking {
                    links.reset();
                    if !options.defects.is_empty() {
                        links.apply_defects(&options.defects)?;
                    }
                    links.break_random(&mut rng, options.break_probabilities);
                }

                self.check_state(buffers.state(), t)?;
                self.evolution.step(&mut buffers, &links, t)?;

                if let Some(detectors) = &self.detectors {
                    let detection = measure_detectors(buffers.state_mut(), detectors, &mut rng)?;
                    if detection.clicked() {
                        end = (t + options.steps_after_measure).min(options.steps);
                        debug!(
                            "Детектор {} сработал на шаге {}, испытание закончится на шаге {}",
                            detection.outcome,
                            t + 1,
                            end.max(t + 1)
                        );
                    }
                    detections.push(DetectionEvent {
                        trial,
                        iteration: t + 1,
                        outcome: detection.outcome,
                    });
                }

                if options.decoherence > 0.0 {
                    random_measure(buffers.state_mut(), options.decoherence, &mut rng)?;
                }

                let record = observe_step(buffers.state(), t + 1, tracker.as_mut())?;
                accumulator.record(trial, &record)?;
                if let Some(screen) = screen.as_mut() {
                    screen.update(buffers.state());
                }
                t += 1;
            }
            average.add(buffers.state())?;
        }

        Ok(SimulationReport {
            seed: self.seed,
            lattice: self.lattice,
            average: average.into_grid(),
            last_state: buffers.into_state(),
            statistics: accumulator.finish(),
            stationary,
            screen,
            detections,
        })
    }
}
