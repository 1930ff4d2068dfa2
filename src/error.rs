use std::io;
use thiserror::Error;

/// Ошибки симулятора квантовых блужданий
#[derive(Debug, Error)]
pub enum WalkError {
    /// Ошибка ввода-вывода
    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] io::Error),

    /// Ошибка сериализации
    #[error("Ошибка сериализации: {0}")]
    Serialization(String),

    /// Некорректные параметры запуска
    #[error("Некорректная конфигурация: {0}")]
    Config(String),

    /// Ошибка разбора файла опций
    #[error("Ошибка разбора (строка {line}): {message}")]
    Parse { line: usize, message: String },

    /// Размер решётки должен быть положительным
    #[error("Некорректный размер решётки: {0}")]
    InvalidLatticeSize(usize),

    /// Вероятность вне отрезка [0, 1]
    #[error("Некорректная вероятность {name}: {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    /// Объект построен для другой размерности
    #[error("Несовпадение размерности: ожидалось {expected}D, получено {found}D")]
    DimensionMismatch { expected: usize, found: usize },

    /// Сетки разной формы
    #[error("Несовпадение формы сетки: ожидалось {expected:?}, получено {found:?}")]
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },

    /// Координата за пределами решётки
    #[error("Узел вне решётки: {0}")]
    SiteOutOfRange(String),

    /// Полная вероятность ушла от 1 дальше допуска
    #[error("Норма состояния не сохраняется на шаге {iteration}: {total:e}")]
    NormDrift { iteration: usize, total: f64 },

    /// Распределение несимметрично
    #[error("Распределение несимметрично по оси {axis} на шаге {iteration}")]
    Asymmetric { iteration: usize, axis: char },

    /// Коллапс на подпространство нулевой вероятности
    #[error("Коллапс на нулевую вероятность ({0:e})")]
    DegenerateCollapse(f64),

    /// Нарушен учёт шагов/испытаний
    #[error("Нарушен учёт статистики: {0}")]
    Bookkeeping(String),

    /// Стационарное распределение не нормировано
    #[error("Стационарное распределение не нормировано: сумма {0:e}")]
    StationaryNotNormalized(f64),

    /// Ошибка построения графика
    #[error("Ошибка построения графика: {0}")]
    Plot(String),
}

impl From<serde_json::Error> for WalkError {
    fn from(err: serde_json::Error) -> Self {
        WalkError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalkError>;
