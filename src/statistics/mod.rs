//! Статистика по шагам, усреднение по испытаниям и расстояние до стационарного распределения.

pub mod stationary;

pub use stationary::estimate_stationary;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};
use crate::grid::Grid;
use crate::lattice::{Lattice, Topology};
use crate::state::WalkState;

/// Статистика одного шага
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub iteration: usize,
    pub mean_x: f64,
    pub mean_y: f64,
    /// В 2D это сумма дисперсий по осям
    pub variance: f64,
    /// Полное расстояние до оценки стационарного распределения
    pub tvd: f64,
    /// Полное расстояние до равномерного распределения
    pub tvd_uniform: f64,
}

impl StatisticsRecord {
    pub fn std_deviation(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }

    fn accumulate(&mut self, other: &StatisticsRecord) {
        self.mean_x += other.mean_x;
        self.mean_y += other.mean_y;
        self.variance += other.variance;
        self.tvd += other.tvd;
        self.tvd_uniform += other.tvd_uniform;
    }

    fn scale(&mut self, factor: f64) {
        self.mean_x *= factor;
        self.mean_y *= factor;
        self.variance *= factor;
        self.tvd *= factor;
        self.tvd_uniform *= factor;
    }
}

/// Первые моменты распределения: `(E[x], E[y], дисперсия)`
pub fn moments(lattice: &Lattice, probabilities: &Grid<f64>) -> (f64, f64, f64) {
    let n = lattice.axis_len();
    let probs = probabilities.as_slice();
    match lattice.dims() {
        1 => {
            let (first, second) = probs.iter().enumerate().fold((0.0, 0.0), |(f, s), (m, &p)| {
                let x = lattice.coordinate(m) as f64;
                (f + x * p, s + x * x * p)
            });
            (first, 0.0, second - first * first)
        }
        _ => {
            let mut sums = [0.0f64; 4];
            for (site, &p) in probs.iter().enumerate() {
                let x = lattice.coordinate(site / n) as f64;
                let y = lattice.coordinate(site % n) as f64;
                sums[0] += x * p;
                sums[1] += x * x * p;
                sums[2] += y * p;
                sums[3] += y * y * p;
            }
            let var_x = sums[1] - sums[0] * sums[0];
            let var_y = sums[3] - sums[2] * sums[2];
            (sums[0], sums[2], var_x + var_y)
        }
    }
}

/// Бегущее среднее распределения внутри одного испытания и расстояния от него
/// до стационарного и равномерного распределений.
#[derive(Debug, Clone)]
pub struct MixingTracker {
    lattice: Lattice,
    stationary: Grid<f64>,
    running: Grid<f64>,
}

impl MixingTracker {
    pub fn new(lattice: Lattice, stationary: Grid<f64>) -> Result<Self> {
        let running = Grid::zeros(&lattice.site_shape())?;
        running.ensure_same_shape(&stationary)?;
        Ok(Self {
            lattice,
            stationary,
            running,
        })
    }

    pub fn stationary(&self) -> &Grid<f64> {
        &self.stationary
    }

    /// Добавляет распределение шага `iteration` (с единицы) и возвращает `(tvd, tvd_uniform)`.
    /// На первом шаге бегущее среднее сбрасывается.
    pub fn observe(&mut self, probabilities: &Grid<f64>, iteration: usize) -> Result<(f64, f64)> {
        if iteration == 0 {
            return Err(WalkError::Bookkeeping("шаги нумеруются с единицы".to_string()));
        }
        self.running.ensure_same_shape(probabilities)?;
        if iteration == 1 {
            self.running.clear();
        }
        let uniform = self.lattice.uniform_probability();
        let n = self.lattice.axis_len();
        let diagonal = self.lattice.topology() == Topology::Diagonal;
        let steps = iteration as f64;
        let mut tvd = 0.0;
        let mut tvd_uniform = 0.0;
        let running = self.running.as_mut_slice();
        let stationary = self.stationary.as_slice();
        for (site, &p) in probabilities.as_slice().iter().enumerate() {
            running[site] += p;
            let average = running[site] / steps;
            tvd += (stationary[site] - average).abs();
            if !diagonal || (site / n + site % n) % 2 == 0 {
                tvd_uniform += (uniform - average).abs();
            }
        }
        Ok((tvd, tvd_uniform))
    }
}

/// Статистика состояния после шага `iteration`
pub fn observe_step(
    state: &WalkState,
    iteration: usize,
    mixing: Option<&mut MixingTracker>,
) -> Result<StatisticsRecord> {
    let probabilities = state.probabilities()?;
    let (mean_x, mean_y, variance) = moments(state.lattice(), &probabilities);
    let (tvd, tvd_uniform) = match mixing {
        Some(tracker) => tracker.observe(&probabilities, iteration)?,
        None => (0.0, 0.0),
    };
    Ok(StatisticsRecord {
        iteration,
        mean_x,
        mean_y,
        variance,
        tvd,
        tvd_uniform,
    })
}

/// Суммирует статистику шага по испытаниям и делит на число испытаний на последнем.
///
/// Живёт ровно один прогон: создаётся в начале и поглощается `finish`.
#[derive(Debug, Clone)]
pub struct StatisticsAccumulator {
    trials: usize,
    sums: Vec<StatisticsRecord>,
    calls: Vec<usize>,
    averaged: Vec<Option<StatisticsRecord>>,
}

impl StatisticsAccumulator {
    pub fn new(steps: usize, trials: usize) -> Result<Self> {
        if steps == 0 || trials == 0 {
            return Err(WalkError::Config(format!(
                "нужны положительные числа шагов и испытаний: {} и {}",
                steps, trials
            )));
        }
        Ok(Self {
            trials,
            sums: vec![StatisticsRecord::default(); steps],
            calls: vec![0; steps],
            averaged: vec![None; steps],
        })
    }

    pub fn steps(&self) -> usize {
        self.sums.len()
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Учитывает запись испытания `trial` (с единицы).
    /// На последнем испытании возвращает усреднённую запись шага.
    pub fn record(&mut self, trial: usize, record: &StatisticsRecord) -> Result<Option<StatisticsRecord>> {
        if trial == 0 || trial > self.trials {
            return Err(WalkError::Bookkeeping(format!(
                "испытание {} вне диапазона 1..={}",
                trial, self.trials
            )));
        }
        let slot = record
            .iteration
            .checked_sub(1)
            .filter(|&i| i < self.sums.len())
            .ok_or_else(|| {
                WalkError::Bookkeeping(format!("шаг {} вне диапазона 1..={}", record.iteration, self.sums.len()))
            })?;
        if self.calls[slot] >= self.trials {
            return Err(WalkError::Bookkeeping(format!(
                "лишний вызов для шага {}: уже учтено {} испытаний",
                record.iteration, self.trials
            )));
        }
        self.calls[slot] += 1;
        self.sums[slot].accumulate(record);
        if trial < self.trials {
            return Ok(None);
        }
        let mut average = self.sums[slot];
        average.iteration = record.iteration;
        average.scale(1.0 / self.trials as f64);
        self.averaged[slot] = Some(average);
        Ok(Some(average))
    }

    /// Шаги, для которых пришло меньше записей, чем испытаний
    pub fn incomplete_steps(&self) -> Vec<usize> {
        self.calls
            .iter()
            .enumerate()
            .filter(|(_, &calls)| calls < self.trials)
            .map(|(slot, _)| slot + 1)
            .collect()
    }

    /// Усреднённые записи всех шагов, выполненных последним испытанием
    pub fn finish(self) -> Vec<StatisticsRecord> {
        let missing = self.incomplete_steps();
        if !missing.is_empty() {
            warn!(
                "Статистика неполна для {} шагов (первый: {})",
                missing.len(),
                missing[0]
            );
        }
        self.averaged.into_iter().flatten().collect()
    }
}

/// Среднее по испытаниям распределение в конце испытания
#[derive(Debug, Clone)]
pub struct AverageDistribution {
    trials: usize,
    added: usize,
    grid: Grid<f64>,
}

impl AverageDistribution {
    pub fn new(lattice: &Lattice, trials: usize) -> Result<Self> {
        if trials == 0 {
            return Err(WalkError::Config("число испытаний должно быть положительным".to_string()));
        }
        Ok(Self {
            trials,
            added: 0,
            grid: Grid::zeros(&lattice.site_shape())?,
        })
    }

    pub fn add(&mut self, state: &WalkState) -> Result<()> {
        if self.added >= self.trials {
            return Err(WalkError::Bookkeeping(format!(
                "распределение уже усреднено по {} испытаниям",
                self.trials
            )));
        }
        let probabilities = state.probabilities()?;
        self.grid.ensure_same_shape(&probabilities)?;
        let weight = 1.0 / self.trials as f64;
        for (acc, p) in self.grid.as_mut_slice().iter_mut().zip(probabilities.iter()) {
            *acc += p * weight;
        }
        self.added += 1;
        Ok(())
    }

    pub fn added(&self) -> usize {
        self.added
    }

    pub fn grid(&self) -> &Grid<f64> {
        &self.grid
    }

    pub fn into_grid(self) -> Grid<f64> {
        self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateKind;
    use num_complex::Complex64;

    fn record(iteration: usize, value: f64) -> StatisticsRecord {
        StatisticsRecord {
            iteration,
            mean_x: value,
            mean_y: 0.0,
            variance: 2.0 * value,
            tvd: 0.0,
            tvd_uniform: 0.0,
        }
    }

    #[test]
    fn test_moments_1d() {
        let lattice = Lattice::new(Topology::Line, 3, 1).unwrap();
        let probs = Grid::from_vec(&[7], vec![0.0, 0.0, 0.5, 0.0, 0.5, 0.0, 0.0]).unwrap();
        let (mx, my, var) = moments(&lattice, &probs);
        assert!(mx.abs() < 1e-15);
        assert_eq!(my, 0.0);
        assert!((var - 1.0).abs() < 1e-15);

        let cycle = Lattice::new(Topology::Cycle, 4, 0).unwrap();
        let probs = Grid::from_vec(&[4], vec![0.0, 0.0, 0.0, 1.0]).unwrap();
        let (mx, _, var) = moments(&cycle, &probs);
        assert!((mx - 3.0).abs() < 1e-15);
        assert!(var.abs() < 1e-15);
    }

    #[test]
    fn test_variance_2d_is_sum_of_axes() {
        let lattice = Lattice::new(Topology::Natural, 1, 0).unwrap();
        let mut probs = Grid::zeros(&[3, 3]).unwrap();
        *probs.get_mut(&[0, 0]).unwrap() = 0.5;
        *probs.get_mut(&[2, 2]).unwrap() = 0.5;
        let (mx, my, var) = moments(&lattice, &probs);
        assert!(mx.abs() < 1e-15 && my.abs() < 1e-15);
        // var_x = var_y = 1
        assert!((var - 2.0).abs() < 1e-15);
    }

    #[test]
    fn test_accumulator_averages_on_last_trial() {
        let mut acc = StatisticsAccumulator::new(2, 2).unwrap();
        assert_eq!(acc.record(1, &record(1, 1.0)).unwrap(), None);
        assert_eq!(acc.record(1, &record(2, 3.0)).unwrap(), None);
        let first = acc.record(2, &record(1, 3.0)).unwrap().unwrap();
        assert_eq!(first.iteration, 1);
        assert!((first.mean_x - 2.0).abs() < 1e-15);
        assert!((first.variance - 4.0).abs() < 1e-15);
        acc.record(2, &record(2, 5.0)).unwrap();
        let records = acc.finish();
        assert_eq!(records.len(), 2);
        assert!((records[1].mean_x - 4.0).abs() < 1e-15);
    }

    #[test]
    fn test_accumulator_rejects_extra_calls() {
        let mut acc = StatisticsAccumulator::new(3, 1).unwrap();
        acc.record(1, &record(2, 1.0)).unwrap();
        assert!(matches!(acc.record(1, &record(2, 1.0)), Err(WalkError::Bookkeeping(_))));
        assert!(acc.record(2, &record(1, 1.0)).is_err());
        assert!(acc.record(1, &record(4, 1.0)).is_err());
        assert!(acc.record(1, &record(0, 1.0)).is_err());
        assert_eq!(acc.incomplete_steps(), vec![1, 3]);
        assert_eq!(acc.finish().len(), 1);
    }

    #[test]
    fn test_mixing_tracker_resets_each_trial() {
        let lattice = Lattice::new(Topology::Cycle, 4, 0).unwrap();
        let stationary = Grid::filled(&[4], 0.25).unwrap();
        let mut tracker = MixingTracker::new(lattice, stationary).unwrap();
        let peaked = Grid::from_vec(&[4], vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let flat = Grid::filled(&[4], 0.25).unwrap();

        let (tvd, tvdu) = tracker.observe(&peaked, 1).unwrap();
        assert!((tvd - 1.5).abs() < 1e-15);
        assert!((tvdu - 1.5).abs() < 1e-15);
        // среднее (peaked + flat) / 2 = [0.625, 0.125, 0.125, 0.125]
        let (tvd, _) = tracker.observe(&flat, 2).unwrap();
        assert!((tvd - 0.75).abs() < 1e-15);
        let (tvd, _) = tracker.observe(&flat, 1).unwrap();
        assert!(tvd.abs() < 1e-15);
    }

    #[test]
    fn test_uniform_distance_skips_odd_diagonal_sites() {
        let lattice = Lattice::new(Topology::Diagonal, 1, 0).unwrap();
        let stationary = Grid::zeros(&[3, 3]).unwrap();
        let mut tracker = MixingTracker::new(lattice, stationary).unwrap();
        let mut probs = Grid::zeros(&[3, 3]).unwrap();
        *probs.get_mut(&[1, 1]).unwrap() = 1.0;
        let (tvd, tvdu) = tracker.observe(&probs, 1).unwrap();
        assert!((tvd - 1.0).abs() < 1e-15);
        // 5 чётных узлов при равномерной вероятности 1
        assert!((tvdu - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_distribution() {
        let lattice = Lattice::new(Topology::Segment, 3, 0).unwrap();
        let mut average = AverageDistribution::new(&lattice, 2).unwrap();
        let mut state = WalkState::zeros(lattice).unwrap();
        state.set(&[0], 0, Complex64::new(1.0, 0.0));
        average.add(&state).unwrap();
        let other = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        average.add(&other).unwrap();
        assert!(average.add(&other).is_err());
        assert_eq!(average.added(), 2);
        let grid = average.into_grid();
        assert!((*grid.get(&[0]).unwrap() - 0.5).abs() < 1e-15);
        assert!((*grid.get(&[1]).unwrap() - 0.5).abs() < 1e-15);
    }
}
