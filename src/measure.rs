//! Проективные измерения: детекторы и случайная декогеренция.

use log::debug;
use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};
use crate::lattice::Lattice;
use crate::state::WalkState;

/// Координаты детектора; в 1D `y` не используется
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detector {
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

impl Detector {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Упорядоченный список детекторов. Исход 0 означает «нигде».
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSet {
    detectors: Vec<Detector>,
    /// Линейные номера узлов в хранилище
    sites: Vec<usize>,
}

impl DetectorSet {
    pub fn new(lattice: &Lattice, detectors: &[Detector]) -> Result<Self> {
        let n = lattice.axis_len();
        let mut sites = Vec::with_capacity(detectors.len());
        for detector in detectors {
            let m = lattice.index_of(detector.x);
            let site = if lattice.dims() == 1 {
                m
            } else {
                m.zip(lattice.index_of(detector.y)).map(|(m, k)| m * n + k)
            };
            let site = site.ok_or_else(|| {
                WalkError::SiteOutOfRange(format!("детектор в ({}, {})", detector.x, detector.y))
            })?;
            if sites.contains(&site) {
                return Err(WalkError::Config(format!(
                    "детектор ({}, {}) задан дважды",
                    detector.x, detector.y
                )));
            }
            sites.push(site);
        }
        Ok(Self {
            detectors: detectors.to_vec(),
            sites,
        })
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    /// Вероятности исходов: `[p0, p1, ..., pN]`, где `p0 = 1 - Σp`
    pub fn outcome_probabilities(&self, state: &WalkState) -> Vec<f64> {
        let mut probs = Vec::with_capacity(self.sites.len() + 1);
        probs.push(0.0);
        probs.extend(self.sites.iter().map(|&site| state.site_probability(site)));
        probs[0] = 1.0 - probs[1..].iter().sum::<f64>();
        probs
    }
}

/// Результат одного измерения детекторами
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 0, если частица не обнаружена, иначе номер сработавшего детектора (с 1)
    pub outcome: usize,
    pub probabilities: Vec<f64>,
}

impl Detection {
    pub fn clicked(&self) -> bool {
        self.outcome > 0
    }
}

/// Выбирает исход по полуоткрытым интервалам `[cum[i-1], cum[i])`.
/// Если из-за округления кубик выше всех интервалов, берётся последний исход с ненулевой вероятностью.
fn select_outcome(probs: &[f64], dice: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (outcome, &p) in probs.iter().enumerate() {
        let lower = cumulative;
        cumulative += p;
        if p > 0.0 && dice >= lower && dice < cumulative {
            return Some(outcome);
        }
    }
    probs.iter().rposition(|&p| p > 0.0)
}

/// Проективное измерение всеми детекторами сразу.
///
/// Состояние коллапсирует на узел сработавшего детектора (или на дополнение
/// ко всем детекторам при исходе 0) и перенормируется на `1/sqrt(p)`.
pub fn measure_detectors<R: Rng + ?Sized>(
    state: &mut WalkState,
    detectors: &DetectorSet,
    rng: &mut R,
) -> Result<Detection> {
    if detectors.is_empty() {
        return Err(WalkError::Config("не задано ни одного детектора".to_string()));
    }
    let probabilities = detectors.outcome_probabilities(state);
    let dice: f64 = rng.gen();
    let outcome = select_outcome(&probabilities, dice)
        .ok_or(WalkError::DegenerateCollapse(probabilities.iter().sum()))?;
    let p = probabilities[outcome];
    if p <= 0.0 {
        return Err(WalkError::DegenerateCollapse(p));
    }

    let scale = 1.0 / p.sqrt();
    let coins = state.lattice().coins();
    for (site, amplitudes) in state.as_mut_slice().chunks_mut(coins).enumerate() {
        let keep = if outcome == 0 {
            !detectors.sites.contains(&site)
        } else {
            site == detectors.sites[outcome - 1]
        };
        for a in amplitudes.iter_mut() {
            *a = if keep { *a * scale } else { Complex64::new(0.0, 0.0) };
        }
    }
    debug!("Измерение детекторами: исход {} (p = {:e})", outcome, p);
    Ok(Detection { outcome, probabilities })
}

/// Итог случайного измерения на одном шаге
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Decoherence {
    /// Сколько узлов было измерено
    pub triggered: usize,
    /// Узел, на который сколлапсировала частица
    pub collapsed: Option<usize>,
    /// Суммарная вероятность измеренных узлов
    pub measured: f64,
}

/// Каждый узел измеряется независимо с вероятностью `probability`.
///
/// Сначала бросается общий кубик A, затем по кубику B на каждый узел в порядке
/// хранения. Частица оказывается на первом измеренном узле, где накопленная
/// вероятность превысила A; остальные измеренные узлы обнуляются. Если такого
/// узла нет, оставшееся состояние делится на `sqrt(1 - Σp)`.
pub fn random_measure<R: Rng + ?Sized>(
    state: &mut WalkState,
    probability: f64,
    rng: &mut R,
) -> Result<Decoherence> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(WalkError::InvalidProbability {
            name: "decoherence",
            value: probability,
        });
    }
    let zero = Complex64::new(0.0, 0.0);
    let coins = state.lattice().coins();
    let dice_a: f64 = rng.gen();
    let mut outcome = Decoherence::default();

    for (site, amplitudes) in state.as_mut_slice().chunks_mut(coins).enumerate() {
        let dice_b: f64 = rng.gen();
        if dice_b >= probability {
            continue;
        }
        outcome.triggered += 1;
        outcome.measured += amplitudes.iter().map(|a| a.norm_sqr()).sum::<f64>();
        if outcome.collapsed.is_none() && dice_a < outcome.measured {
            outcome.collapsed = Some(site);
        } else {
            amplitudes.fill(zero);
        }
    }

    match outcome.collapsed {
        Some(target) => {
            let p = state.site_probability(target);
            let scale = 1.0 / p.sqrt();
            for (site, amplitudes) in state.as_mut_slice().chunks_mut(coins).enumerate() {
                if site == target {
                    amplitudes.iter_mut().for_each(|a| *a *= scale);
                } else {
                    amplitudes.fill(zero);
                }
            }
            debug!("Декогеренция: коллапс в узел {} (p = {:e})", target, p);
        }
        None if outcome.triggered > 0 => {
            let remaining = 1.0 - outcome.measured;
            if remaining <= 0.0 {
                return Err(WalkError::DegenerateCollapse(remaining));
            }
            let scale = 1.0 / remaining.sqrt();
            state.as_mut_slice().iter_mut().for_each(|a| *a *= scale);
        }
        None => {}
    }
    Ok(outcome)
}
