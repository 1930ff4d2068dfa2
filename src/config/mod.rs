//! Параметры запуска: разобранный набор опций и его проверка.

pub mod keyword;

pub use keyword::{parse_keyword_options, read_keyword_file};

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::coin::CoinKind;
use crate::error::{Result, WalkError};
use crate::lattice::{Lattice, ScanMode, Topology};
use crate::links::{BreakProbabilities, LinkDefect};
use crate::measure::Detector;
use crate::screen::ScreenSpec;
use crate::state::StateKind;

pub const DEFAULT_STEPS: usize = 100;
pub const DEFAULT_EXTRA: usize = 1;

/// Проверки состояния перед каждым шагом
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checks {
    pub norm: bool,
    pub symmetry_x: bool,
    pub symmetry_y: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkOptions {
    pub topology: Topology,
    /// Полуширина решётки (для открытых решёток уже с запасом `extra`)
    pub max: usize,
    pub extra: usize,
    pub steps: usize,
    /// Шагов после срабатывания детектора
    pub steps_after_measure: usize,
    pub experiments: usize,
    pub coin: CoinKind,
    pub state: StateKind,
    /// Элементы монеты CUSTOM в порядке строк
    pub custom_coin: Option<Vec<Complex64>>,
    /// Амплитуды состояния CUSTOM в порядке `[монета][позиция]`
    pub custom_state: Option<Vec<Complex64>>,
    pub break_probabilities: BreakProbabilities,
    pub decoherence: f64,
    pub detectors: Vec<Detector>,
    /// Шагов для оценки стационарного распределения; 0 отключает оценку
    pub mixing_steps: usize,
    pub checks: Checks,
    pub seed: Option<u64>,
    pub screen: Option<ScreenSpec>,
    pub defects: Vec<LinkDefect>,
    pub scan_mode: ScanMode,
    /// Физические предупреждения становятся ошибками
    pub strict: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::defaults(1)
    }
}

impl WalkOptions {
    /// Значения по умолчанию для блуждания размерности `dims`
    pub fn defaults(dims: usize) -> Self {
        Self {
            topology: if dims == 2 { Topology::Natural } else { Topology::Line },
            max: DEFAULT_STEPS + DEFAULT_EXTRA,
            extra: DEFAULT_EXTRA,
            steps: DEFAULT_STEPS,
            steps_after_measure: 0,
            experiments: 1,
            coin: CoinKind::Hadamard,
            state: StateKind::Hadamard,
            custom_coin: None,
            custom_state: None,
            break_probabilities: BreakProbabilities::default(),
            decoherence: 0.0,
            detectors: Vec::new(),
            mixing_steps: 0,
            checks: Checks::default(),
            seed: None,
            screen: None,
            defects: Vec::new(),
            scan_mode: ScanMode::LightCone,
            strict: false,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let options: WalkOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn dims(&self) -> usize {
        self.topology.dims()
    }

    pub fn lattice(&self) -> Result<Lattice> {
        Lattice::new(self.topology, self.max, self.extra)
    }

    /// Зерно генератора; без явного зерна берётся текущее время
    pub fn resolved_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }

    pub fn mixing_enabled(&self) -> bool {
        self.mixing_steps > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.max == 0 {
            return Err(WalkError::InvalidLatticeSize(self.max));
        }
        if self.steps == 0 {
            return Err(WalkError::Config("число шагов должно быть положительным".to_string()));
        }
        if self.experiments == 0 {
            return Err(WalkError::Config("число испытаний должно быть положительным".to_string()));
        }
        for (name, value) in [
            ("blprob_a", self.break_probabilities.a),
            ("blprob_b", self.break_probabilities.b),
            ("dtprob", self.decoherence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WalkError::InvalidProbability { name, value });
            }
        }
        let dims = self.dims();
        if dims == 1 && self.break_probabilities.b > 0.0 {
            return Err(WalkError::Config(
                "в 1D задаётся только одна вероятность разрыва".to_string(),
            ));
        }
        if dims != 2 && (self.screen.is_some() || !self.defects.is_empty()) {
            return Err(WalkError::DimensionMismatch { expected: 2, found: dims });
        }
        if dims == 1 && self.checks.symmetry_y {
            return Err(WalkError::Config("проверка симметрии по y в 1D невозможна".to_string()));
        }
        if self.coin == CoinKind::Custom && self.custom_coin.is_none() {
            return Err(WalkError::Config("монета CUSTOM задана без элементов".to_string()));
        }
        if self.state == StateKind::Custom && self.custom_state.is_none() {
            return Err(WalkError::Config("состояние CUSTOM задано без амплитуд".to_string()));
        }
        let lattice = self.lattice()?;
        if self.topology.is_open() && self.steps + lattice.extra() > self.max {
            warn!(
                "Решётка полуширины {} меньше, чем {} шагов с запасом {}: вероятность уйдёт за край",
                self.max, self.steps, lattice.extra()
            );
        }
        if !self.topology.is_open() && (self.checks.symmetry_x || self.checks.symmetry_y) {
            warn!("Проверка симметрии на решётке {} не выполняется", self.topology);
        }
        Ok(())
    }
}
