//! Экран наблюдения: отрезок узлов, на котором копится вероятность за все шаги.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};
use crate::lattice::Lattice;
use crate::links::defects::straight_line;
use crate::state::WalkState;

/// Концы экрана в математических координатах
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSpec {
    pub from: (i64, i64),
    pub to: (i64, i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationScreen {
    points: Vec<(i64, i64)>,
    #[serde(skip)]
    sites: Vec<usize>,
    intensity: Vec<f64>,
}

impl ObservationScreen {
    pub fn new(lattice: &Lattice, spec: ScreenSpec) -> Result<Self> {
        if lattice.dims() != 2 {
            return Err(WalkError::DimensionMismatch {
                expected: 2,
                found: lattice.dims(),
            });
        }
        let points = straight_line(spec.from, spec.to).ok_or_else(|| {
            WalkError::Config(format!(
                "экран {:?} - {:?} должен быть горизонтальным, вертикальным или под 45°",
                spec.from, spec.to
            ))
        })?;
        let n = lattice.axis_len();
        let sites = points
            .iter()
            .map(|&(x, y)| {
                lattice
                    .index_of(x)
                    .zip(lattice.index_of(y))
                    .map(|(m, k)| m * n + k)
                    .ok_or_else(|| WalkError::SiteOutOfRange(format!("точка экрана ({}, {})", x, y)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            intensity: vec![0.0; points.len()],
            points,
            sites,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(i64, i64)] {
        &self.points
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    /// Добавляет вероятность каждой точки экрана
    pub fn update(&mut self, state: &WalkState) {
        for (value, &site) in self.intensity.iter_mut().zip(&self.sites) {
            *value += state.site_probability(site);
        }
    }

    /// Строки `(номер, x, y, интенсивность)` с ненулевой интенсивностью
    pub fn rows(&self) -> impl Iterator<Item = (usize, i64, i64, f64)> + '_ {
        self.points
            .iter()
            .zip(&self.intensity)
            .enumerate()
            .filter(|(_, (_, &value))| value > 0.0)
            .map(|(index, (&(x, y), &value))| (index, x, y, value))
    }
}
