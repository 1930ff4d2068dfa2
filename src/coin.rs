//! Операторы монеты.
//!
//! В 1D монета является матрицей 2x2. В 2D это тензор `C[j][k][j'][k']`, который
//! хранится как матрица 4x4 со строкой `2j+k` и столбцом `2j'+k'`.

use std::fmt;

use nalgebra::{Matrix2, Matrix4};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinKind {
    Hadamard,
    Fourier,
    Grover,
    /// Таблица задаётся пользователем
    Custom,
}

impl CoinKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "HADAMARD" => Some(CoinKind::Hadamard),
            "FOURIER" => Some(CoinKind::Fourier),
            "GROVER" => Some(CoinKind::Grover),
            "CUSTOM" => Some(CoinKind::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for CoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoinKind::Hadamard => "Hadamard",
            CoinKind::Fourier => "Fourier",
            CoinKind::Grover => "Grover",
            CoinKind::Custom => "Custom",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoinOperator {
    /// Монета одномерного блуждания
    Single(Matrix2<Complex64>),
    /// Монета двумерного блуждания
    Double(Matrix4<Complex64>),
}

/// Строка/столбец матрицы 4x4 для пары индексов монеты
#[inline]
pub fn tensor_index(j: usize, k: usize) -> usize {
    2 * j + k
}

impl CoinOperator {
    /// Строит монету заданного типа. Для `Custom` нужны элементы таблицы.
    pub fn build(kind: CoinKind, dims: usize, custom: Option<&[Complex64]>) -> Result<Self> {
        match (kind, dims) {
            (CoinKind::Custom, _) => {
                let entries = custom.ok_or_else(|| {
                    WalkError::Config("для монеты CUSTOM не заданы элементы".to_string())
                })?;
                Self::from_entries(dims, entries)
            }
            (CoinKind::Hadamard, 1) => Ok(Self::hadamard_1d()),
            (CoinKind::Hadamard, 2) => Ok(Self::hadamard_2d()),
            (CoinKind::Fourier, 2) => Ok(Self::fourier_2d()),
            (CoinKind::Grover, 2) => Ok(Self::grover_2d()),
            (kind, 1) => Err(WalkError::Config(format!(
                "монета {} не определена для одномерного блуждания",
                kind
            ))),
            (_, dims) => Err(WalkError::DimensionMismatch { expected: 2, found: dims }),
        }
    }

    pub fn hadamard_1d() -> Self {
        let h = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        CoinOperator::Single(Matrix2::new(h, h, h, -h))
    }

    /// H ⊗ H: `C[j][k][j'][k'] = (-1)^(j·j' + k·k') / 2`
    pub fn hadamard_2d() -> Self {
        Self::tabulate(|j, k, jp, kp| {
            let sign = if (j * jp + k * kp) % 2 == 0 { 0.5 } else { -0.5 };
            Complex64::new(sign, 0.0)
        })
    }

    /// Дискретное преобразование Фурье порядка 4
    pub fn fourier_2d() -> Self {
        Self::tabulate(|j, k, jp, kp| {
            let power = (tensor_index(j, k) * tensor_index(jp, kp)) as u32;
            Complex64::i().powu(power) * 0.5
        })
    }

    /// Монета Гровера `2|s><s| - I`
    pub fn grover_2d() -> Self {
        Self::tabulate(|j, k, jp, kp| {
            let value = if (j, k) == (jp, kp) { -0.5 } else { 0.5 };
            Complex64::new(value, 0.0)
        })
    }

    /// Таблица из элементов в порядке строк. Унитарность не проверяется.
    pub fn from_entries(dims: usize, entries: &[Complex64]) -> Result<Self> {
        match (dims, entries.len()) {
            (1, 4) => Ok(CoinOperator::Single(Matrix2::from_row_slice(entries))),
            (2, 16) => Ok(CoinOperator::Double(Matrix4::from_row_slice(entries))),
            (1, _) | (2, _) => Err(WalkError::Config(format!(
                "для монеты {}D нужно {} элементов, получено {}",
                dims,
                if dims == 1 { 4 } else { 16 },
                entries.len()
            ))),
            (dims, _) => Err(WalkError::DimensionMismatch { expected: 2, found: dims }),
        }
    }

    fn tabulate<F>(entry: F) -> Self
    where
        F: Fn(usize, usize, usize, usize) -> Complex64,
    {
        let mut matrix = Matrix4::zeros();
        for j in 0..2 {
            for k in 0..2 {
                for jp in 0..2 {
                    for kp in 0..2 {
                        matrix[(tensor_index(j, k), tensor_index(jp, kp))] = entry(j, k, jp, kp);
                    }
                }
            }
        }
        CoinOperator::Double(matrix)
    }

    pub fn dims(&self) -> usize {
        match self {
            CoinOperator::Single(_) => 1,
            CoinOperator::Double(_) => 2,
        }
    }

    pub fn as_double(&self) -> Option<&Matrix4<Complex64>> {
        match self {
            CoinOperator::Double(m) => Some(m),
            CoinOperator::Single(_) => None,
        }
    }

    /// Элемент `C[j][k][j'][k']` двумерной монеты
    pub fn tensor(&self, j: usize, k: usize, jp: usize, kp: usize) -> Option<Complex64> {
        self.as_double()
            .map(|m| m[(tensor_index(j, k), tensor_index(jp, kp))])
    }

    /// Диагностика: `C†C ≈ I` с точностью `tol`
    pub fn is_unitary(&self, tol: f64) -> bool {
        match self {
            CoinOperator::Single(m) => (m.adjoint() * m - Matrix2::identity()).norm() < tol,
            CoinOperator::Double(m) => (m.adjoint() * m - Matrix4::identity()).norm() < tol,
        }
    }
}
