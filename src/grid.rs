//! Плотный N-мерный массив, общий для амплитуд, вероятностей и токенов связей.
//!
//! Хранение row-major (`ndarray`, стандартная раскладка): последний индекс
//! меняется быстрее всего.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalkError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    data: ArrayD<T>,
}

impl<T: Copy + Default> Grid<T> {
    /// Создаёт сетку, заполненную нулевым значением типа
    pub fn zeros(shape: &[usize]) -> Result<Self> {
        Self::filled(shape, T::default())
    }

    pub fn filled(shape: &[usize], value: T) -> Result<Self> {
        if shape.is_empty() || shape.iter().any(|&n| n == 0) {
            return Err(WalkError::ShapeMismatch {
                expected: Vec::new(),
                found: shape.to_vec(),
            });
        }
        Ok(Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        })
    }

    /// Оборачивает готовый буфер; длина должна совпадать с произведением размеров
    pub fn from_vec(shape: &[usize], data: Vec<T>) -> Result<Self> {
        let found = vec![data.len()];
        if shape.is_empty() {
            return Err(WalkError::ShapeMismatch { expected: Vec::new(), found });
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| WalkError::ShapeMismatch {
            expected: shape.to_vec(),
            found,
        })?;
        Ok(Self { data })
    }

    /// Обнуляет все элементы
    pub fn clear(&mut self) {
        self.fill(T::default());
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Копирует содержимое другой сетки той же формы
    pub fn copy_from(&mut self, other: &Grid<T>) -> Result<()> {
        self.ensure_same_shape(other)?;
        self.data.assign(&other.data);
        Ok(())
    }
}

impl<T> Grid<T> {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn rank(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.shape() == other.shape()
    }

    pub fn ensure_same_shape<U>(&self, other: &Grid<U>) -> Result<()> {
        if self.same_shape(other) {
            Ok(())
        } else {
            Err(WalkError::ShapeMismatch {
                expected: self.shape().to_vec(),
                found: other.shape().to_vec(),
            })
        }
    }

    /// `None`, если индекс вне сетки или другой размерности
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.data.get(index)
    }

    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    // сетка создаётся только в стандартной раскладке, срез есть всегда
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice().unwrap_or_default()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_slice_mut().unwrap_or_default()
    }

    pub fn iter(&self) -> ndarray::iter::Iter<'_, T, IxDyn> {
        self.data.iter()
    }
}

impl Grid<f64> {
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
}
