//! Волновая функция блуждания и начальные условия.

use std::fmt;

use log::warn;
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};
use crate::grid::Grid;
use crate::lattice::Lattice;
use crate::WALK_TOL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    /// Состояние максимального разлёта для монеты Адамара
    Hadamard,
    Fourier,
    Grover,
    /// Амплитуды задаются пользователем
    Custom,
}

impl StateKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "HADAMARD" => Some(StateKind::Hadamard),
            "FOURIER" => Some(StateKind::Fourier),
            "GROVER" => Some(StateKind::Grover),
            "CUSTOM" => Some(StateKind::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Hadamard => "Hadamard",
            StateKind::Fourier => "Fourier",
            StateKind::Grover => "Grover",
            StateKind::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// Ось проверки симметрии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Амплитуды `(позиция..., монета...)`; индекс монеты меняется быстрее всего
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkState {
    lattice: Lattice,
    amplitudes: Grid<Complex64>,
}

impl WalkState {
    pub fn zeros(lattice: Lattice) -> Result<Self> {
        Ok(Self {
            lattice,
            amplitudes: Grid::zeros(&lattice.shape())?,
        })
    }

    /// Строит начальное состояние; для `Custom` нужны сырые амплитуды
    pub fn initial(lattice: Lattice, kind: StateKind, custom: Option<&[Complex64]>) -> Result<Self> {
        let mut state = Self::zeros(lattice)?;
        let c = lattice.origin();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        match (kind, lattice.dims()) {
            (StateKind::Custom, _) => {
                let values = custom.ok_or_else(|| {
                    WalkError::Config("для состояния CUSTOM не заданы амплитуды".to_string())
                })?;
                return Self::from_raw(lattice, values);
            }
            (StateKind::Hadamard, 1) => {
                // (|0> + i|1>) / sqrt(2)
                state.set(&[c], 0, Complex64::new(s, 0.0));
                state.set(&[c], 1, Complex64::new(0.0, s));
            }
            (kind, 1) => {
                return Err(WalkError::Config(format!(
                    "состояние {} не определено для одномерного блуждания",
                    kind
                )))
            }
            (kind, _) => {
                let q = Complex64::new(1.0, -1.0) / (2.0 * std::f64::consts::SQRT_2);
                let coins = match kind {
                    StateKind::Hadamard => [
                        Complex64::new(0.5, 0.0),
                        Complex64::new(0.0, 0.5),
                        Complex64::new(0.0, 0.5),
                        Complex64::new(-0.5, 0.0),
                    ],
                    StateKind::Fourier => [Complex64::new(0.5, 0.0), q, Complex64::new(0.5, 0.0), -q],
                    _ => [
                        Complex64::new(0.5, 0.0),
                        Complex64::new(-0.5, 0.0),
                        Complex64::new(-0.5, 0.0),
                        Complex64::new(0.5, 0.0),
                    ],
                };
                for (coin, value) in coins.into_iter().enumerate() {
                    state.set(&[c, c], coin, value);
                }
            }
        }
        Ok(state)
    }

    /// Сырые амплитуды в порядке `[монета][позиция]` (1D) или `[j][k][x][y]` (2D).
    /// Нормировка не проверяется.
    pub fn from_raw(lattice: Lattice, values: &[Complex64]) -> Result<Self> {
        let mut state = Self::zeros(lattice)?;
        let sites = lattice.site_count();
        let coins = lattice.coins();
        if values.len() != sites * coins {
            return Err(WalkError::Config(format!(
                "ожидалось {} амплитуд, получено {}",
                sites * coins,
                values.len()
            )));
        }
        let data = state.amplitudes.as_mut_slice();
        for coin in 0..coins {
            for site in 0..sites {
                data[site * coins + coin] = values[coin * sites + site];
            }
        }
        Ok(state)
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn amplitudes(&self) -> &Grid<Complex64> {
        &self.amplitudes
    }

    pub fn as_slice(&self) -> &[Complex64] {
        self.amplitudes.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        self.amplitudes.as_mut_slice()
    }

    #[inline]
    fn site_offset(&self, site: &[usize]) -> usize {
        site.iter().fold(0, |acc, &i| acc * self.lattice.axis_len() + i)
    }

    /// Амплитуда узла; в 2D номер монеты равен `2j+k`
    pub fn get(&self, site: &[usize], coin: usize) -> Complex64 {
        self.amplitudes.as_slice()[self.site_offset(site) * self.lattice.coins() + coin]
    }

    pub fn set(&mut self, site: &[usize], coin: usize, value: Complex64) {
        let offset = self.site_offset(site) * self.lattice.coins() + coin;
        self.amplitudes.as_mut_slice()[offset] = value;
    }

    /// Вероятность узла с линейным номером `site`
    #[inline]
    pub fn site_probability(&self, site: usize) -> f64 {
        let coins = self.lattice.coins();
        self.amplitudes.as_slice()[site * coins..(site + 1) * coins]
            .iter()
            .map(|a| a.norm_sqr())
            .sum()
    }

    /// Распределение вероятностей по узлам
    pub fn probabilities(&self) -> Result<Grid<f64>> {
        let coins = self.lattice.coins();
        let probs: Vec<f64> = self
            .amplitudes
            .as_slice()
            .par_chunks(coins)
            .map(|chunk| chunk.iter().map(|a| a.norm_sqr()).sum())
            .collect();
        let total: f64 = probs.iter().sum();
        if (total - 1.0).abs() > WALK_TOL {
            warn!("Вероятность найти частицу на решётке равна {:e}", total);
        }
        Grid::from_vec(&self.lattice.site_shape(), probs)
    }

    pub fn total_probability(&self) -> f64 {
        self.amplitudes.as_slice().par_iter().map(|a| a.norm_sqr()).sum()
    }

    /// Норма равна 1 с точностью `WALK_TOL`
    pub fn check_norm(&self) -> bool {
        (self.total_probability() - 1.0).abs() <= WALK_TOL
    }

    /// Зеркальная симметрия распределения; на замкнутых решётках проверка не имеет смысла
    pub fn check_symmetry(&self, axis: Axis) -> bool {
        if !self.lattice.topology().is_open() {
            return true;
        }
        let n = self.lattice.axis_len();
        let last = n - 1;
        match (self.lattice.dims(), axis) {
            (1, Axis::X) => (0..n).all(|m| {
                (self.site_probability(m) - self.site_probability(last - m)).abs() <= WALK_TOL
            }),
            (1, Axis::Y) => true,
            (_, axis) => (0..n).all(|m| {
                (0..n).all(|k| {
                    let (a, b) = match axis {
                        Axis::X => ((m, k), (last - m, k)),
                        Axis::Y => ((k, m), (k, last - m)),
                    };
                    let pa = self.site_probability(a.0 * n + a.1);
                    let pb = self.site_probability(b.0 * n + b.1);
                    (pa - pb).abs() <= WALK_TOL
                })
            }),
        }
    }

    /// Обнуляет все амплитуды
    pub fn clear(&mut self) {
        self.amplitudes.clear();
    }

    pub fn same_shape(&self, other: &WalkState) -> bool {
        self.amplitudes.same_shape(&other.amplitudes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Topology;

    #[test]
    fn test_hadamard_state_1d() {
        let lattice = Lattice::new(Topology::Line, 5, 1).unwrap();
        let state = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        assert!(state.check_norm());
        assert!((state.get(&[5], 1) - Complex64::new(0.0, std::f64::consts::FRAC_1_SQRT_2)).norm() < 1e-12);
        assert!((state.site_probability(5) - 1.0).abs() < 1e-12);

        let cycle = Lattice::new(Topology::Cycle, 8, 0).unwrap();
        let state = WalkState::initial(cycle, StateKind::Hadamard, None).unwrap();
        assert!((state.site_probability(4) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_initial_states_2d_are_normalized() {
        for topology in [Topology::Natural, Topology::Diagonal, Topology::Torus] {
            let lattice = Lattice::new(topology, 4, 1).unwrap();
            for kind in [StateKind::Hadamard, StateKind::Fourier, StateKind::Grover] {
                let state = WalkState::initial(lattice, kind, None).unwrap();
                assert!(state.check_norm(), "{:?} {:?}", topology, kind);
            }
        }
        let torus = Lattice::new(Topology::Torus, 4, 0).unwrap();
        let grover = WalkState::initial(torus, StateKind::Grover, None).unwrap();
        assert!((grover.get(&[2, 2], 1) - Complex64::new(-0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_unsupported_1d_state() {
        let lattice = Lattice::new(Topology::Line, 3, 1).unwrap();
        assert!(WalkState::initial(lattice, StateKind::Grover, None).is_err());
        assert!(WalkState::initial(lattice, StateKind::Custom, None).is_err());
    }

    #[test]
    fn test_raw_state_is_coin_major() {
        let lattice = Lattice::new(Topology::Segment, 3, 0).unwrap();
        let values: Vec<Complex64> = (0..6).map(|v| Complex64::new(v as f64, 0.0)).collect();
        let state = WalkState::from_raw(lattice, &values).unwrap();
        assert_eq!(state.get(&[2], 0), Complex64::new(2.0, 0.0));
        assert_eq!(state.get(&[0], 1), Complex64::new(3.0, 0.0));
        assert!(!state.check_norm());
        assert!(WalkState::from_raw(lattice, &values[..5]).is_err());
    }

    #[test]
    fn test_probabilities_and_symmetry() {
        let lattice = Lattice::new(Topology::Natural, 2, 0).unwrap();
        let mut state = WalkState::zeros(lattice).unwrap();
        state.set(&[1, 2], 0, Complex64::new(0.5_f64.sqrt(), 0.0));
        state.set(&[3, 2], 3, Complex64::new(0.0, 0.5_f64.sqrt()));
        assert!(state.check_norm());
        assert!(state.check_symmetry(Axis::X));
        assert!(state.check_symmetry(Axis::Y));

        state.set(&[3, 2], 3, Complex64::new(0.0, 0.0));
        state.set(&[2, 3], 3, Complex64::new(0.0, 0.5_f64.sqrt()));
        assert!(!state.check_symmetry(Axis::X));

        let probs = state.probabilities().unwrap();
        assert_eq!(probs.shape(), &[5, 5]);
        assert!((*probs.get(&[1, 2]).unwrap() - 0.5).abs() < 1e-12);
        assert!((probs.sum() - 1.0).abs() < 1e-12);
    }
}
