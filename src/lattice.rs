//! Топологии решёток и арифметика координат.
//!
//! Открытые решётки (Line, Natural, Diagonal) хранят координаты `-max..=max`
//! со сдвигом на `max`; замкнутые (Cycle, Segment, 2D Cycle) хранят
//! координаты `0..max` как есть.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Бесконечная прямая (усечённая до `-max..=max`)
    Line,
    /// Кольцо из `max` узлов
    Cycle,
    /// Отрезок из `max` узлов с отражающими концами
    Segment,
    /// Квадратная решётка, сдвиг вдоль одной оси за шаг
    Natural,
    /// Квадратная решётка с диагональными прыжками
    Diagonal,
    /// Двумерный цикл (тор `max x max`)
    Torus,
}

impl Topology {
    pub fn dims(self) -> usize {
        match self {
            Topology::Line | Topology::Cycle | Topology::Segment => 1,
            Topology::Natural | Topology::Diagonal | Topology::Torus => 2,
        }
    }

    /// Координаты центрированы в нуле и хранятся со сдвигом на `max`
    pub fn is_open(self) -> bool {
        matches!(self, Topology::Line | Topology::Natural | Topology::Diagonal)
    }

    pub fn is_periodic(self) -> bool {
        matches!(self, Topology::Cycle | Topology::Torus)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Topology::Line => "LINE",
            Topology::Cycle | Topology::Torus => "CYCLE",
            Topology::Segment => "SEGMENT",
            Topology::Natural => "NATURAL",
            Topology::Diagonal => "DIAGONAL",
        }
    }

    /// Разбирает ключевое слово LATTTYPE для заданной размерности
    pub fn from_keyword(word: &str, dims: usize) -> Option<Self> {
        match (dims, word) {
            (1, "LINE") => Some(Topology::Line),
            (1, "CYCLE") => Some(Topology::Cycle),
            (1, "SEGMENT") => Some(Topology::Segment),
            (2, "NATURAL") => Some(Topology::Natural),
            (2, "DIAGONAL") => Some(Topology::Diagonal),
            (2, "CYCLE") => Some(Topology::Torus),
            _ => None,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// Диапазон обновляемых узлов на шаге
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Только световой конус `t + extra` вокруг начала координат
    #[default]
    LightCone,
    /// Все узлы, соседи которых лежат внутри хранилища
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lattice {
    topology: Topology,
    max: usize,
    extra: usize,
}

impl Lattice {
    /// `max` уже включает запас `extra` для открытых решёток.
    /// Для замкнутых топологий запас не используется и обнуляется.
    pub fn new(topology: Topology, max: usize, extra: usize) -> Result<Self> {
        if max == 0 {
            return Err(WalkError::InvalidLatticeSize(max));
        }
        let extra = if topology.is_open() { extra } else { 0 };
        if extra > max {
            return Err(WalkError::Config(format!(
                "запас решётки {} больше полуширины {}",
                extra, max
            )));
        }
        Ok(Self { topology, max, extra })
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn extra(&self) -> usize {
        self.extra
    }

    pub fn dims(&self) -> usize {
        self.topology.dims()
    }

    /// Число базисных состояний монеты: 2 в 1D, 4 в 2D
    pub fn coins(&self) -> usize {
        1 << self.dims()
    }

    /// Длина хранилища по каждой оси
    pub fn axis_len(&self) -> usize {
        if self.topology.is_open() {
            2 * self.max + 1
        } else {
            self.max
        }
    }

    /// Форма сетки амплитуд: позиции, затем индексы монеты
    pub fn shape(&self) -> Vec<usize> {
        let n = self.axis_len();
        match self.dims() {
            1 => vec![n, 2],
            _ => vec![n, n, 2, 2],
        }
    }

    /// Форма сетки вероятностей
    pub fn site_shape(&self) -> Vec<usize> {
        vec![self.axis_len(); self.dims()]
    }

    pub fn site_count(&self) -> usize {
        self.axis_len().pow(self.dims() as u32)
    }

    /// Индекс хранилища, в который ставится начальное состояние
    pub fn origin(&self) -> usize {
        if self.topology.is_open() {
            self.max
        } else {
            self.max / 2
        }
    }

    /// Математическая координата по индексу хранилища
    pub fn coordinate(&self, index: usize) -> i64 {
        if self.topology.is_open() {
            index as i64 - self.max as i64
        } else {
            index as i64
        }
    }

    /// Индекс хранилища по координате, `None` вне решётки
    pub fn index_of(&self, coordinate: i64) -> Option<usize> {
        let index = if self.topology.is_open() {
            coordinate + self.max as i64
        } else {
            coordinate
        };
        if index >= 0 && (index as usize) < self.axis_len() {
            Some(index as usize)
        } else {
            None
        }
    }

    /// Сосед по оси со сдвигом `offset`; на кольце индекс заворачивается
    pub fn neighbour(&self, index: usize, offset: isize) -> Option<usize> {
        let n = self.axis_len() as isize;
        let target = index as isize + offset;
        if self.topology.is_periodic() {
            Some(target.rem_euclid(n) as usize)
        } else if (0..n).contains(&target) {
            Some(target as usize)
        } else {
            None
        }
    }

    /// Обновляемый диапазон индексов по каждой оси на шаге `iteration`.
    ///
    /// Конус на шаге `t` покрывает носитель старого состояния (`extra + t`)
    /// плюс один узел, куда амплитуда переходит за этот шаг.
    /// На открытых решётках крайние строки хранилища не обновляются никогда:
    /// так сдвиг на ±1 всегда остаётся внутри массива.
    pub fn span(&self, iteration: usize, mode: ScanMode) -> RangeInclusive<usize> {
        if !self.topology.is_open() {
            return 0..=self.axis_len() - 1;
        }
        let last = 2 * self.max - 1;
        match mode {
            ScanMode::Full => 1..=last,
            ScanMode::LightCone => {
                let reach = self.extra + iteration + 1;
                let lo = self.max.saturating_sub(reach).max(1);
                let hi = (self.max + reach).min(last);
                lo..=hi
            }
        }
    }

    /// На диагональной решётке заняты только узлы с чётной суммой координат
    pub fn is_valid_site(&self, m: usize, n: usize) -> bool {
        self.topology != Topology::Diagonal || (m + n) % 2 == 0
    }

    /// Вероятность узла в равномерном распределении по доступным узлам
    pub fn uniform_probability(&self) -> f64 {
        let max = self.max as f64;
        let sites = match self.topology {
            Topology::Line => 2.0 * (self.max - self.extra) as f64 + 1.0,
            Topology::Cycle | Topology::Segment => max,
            Topology::Natural => (2.0 * max - 1.0) * (2.0 * max - 1.0),
            Topology::Diagonal => 2.0 * max * max - 2.0 * max + 1.0,
            Topology::Torus => max * max,
        };
        1.0 / sites
    }
}
