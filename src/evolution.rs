//! Один когерентный шаг блуждания: монета, затем условный сдвиг.
//!
//! Токен связи `L` каждой ветви используется дважды: как сдвиг позиции
//! (`L = 0` оставляет частицу на месте, то есть отражает её) и как
//! селектор строки монеты (`j + L`). Для всех топологий `j + L` лежит в
//! `{0, 1}`, так как токен ветви `j` равен либо `(-1)^j`, либо 0.

use log::debug;
use nalgebra::{Matrix2, Matrix4};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::coin::{tensor_index, CoinOperator};
use crate::error::{Result, WalkError};
use crate::lattice::{Lattice, ScanMode, Topology};
use crate::links::{LinkState, LinkToken};
use crate::state::WalkState;

/// Состояние и буфер того же размера.
/// После каждого шага буферы меняются местами, а новый буфер обнуляется.
#[derive(Debug, Clone)]
pub struct StepBuffers {
    state: WalkState,
    scratch: WalkState,
}

impl StepBuffers {
    pub fn new(state: WalkState) -> Result<Self> {
        let scratch = WalkState::zeros(*state.lattice())?;
        Ok(Self { state, scratch })
    }

    pub fn state(&self) -> &WalkState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WalkState {
        &mut self.state
    }

    pub fn into_state(self) -> WalkState {
        self.state
    }

    /// Заменяет состояние (новое испытание), буфер при этом обнуляется
    pub fn reset(&mut self, state: WalkState) -> Result<()> {
        if !state.same_shape(&self.scratch) {
            return Err(WalkError::ShapeMismatch {
                expected: self.scratch.amplitudes().shape().to_vec(),
                found: state.amplitudes().shape().to_vec(),
            });
        }
        self.state = state;
        self.scratch.clear();
        Ok(())
    }

    pub(crate) fn split(&mut self) -> (&WalkState, &mut WalkState) {
        (&self.state, &mut self.scratch)
    }

    /// Передаёт буфер в состояние и готовит освободившийся буфер к следующему шагу
    pub(crate) fn commit(&mut self) {
        std::mem::swap(&mut self.state, &mut self.scratch);
        self.scratch.clear();
    }
}

#[inline]
fn coin_row(bit: usize, token: LinkToken) -> usize {
    let row = bit as isize + token as isize;
    debug_assert!((0..2).contains(&row), "токен {} выводит ветвь {} за таблицу монеты", token, bit);
    row as usize
}

#[inline]
fn shifted(index: usize, token: LinkToken) -> usize {
    (index as isize + token as isize) as usize
}

#[inline]
fn wrapped(index: usize, token: LinkToken, n: usize) -> usize {
    (index as isize + token as isize).rem_euclid(n as isize) as usize
}

#[inline]
fn offset_2d(n: usize, m: usize, k: usize, coin: usize) -> usize {
    (m * n + k) * 4 + coin
}

#[derive(Debug, Clone)]
pub struct Evolution {
    lattice: Lattice,
    coin: CoinOperator,
    mode: ScanMode,
}

impl Evolution {
    pub fn new(lattice: Lattice, coin: CoinOperator, mode: ScanMode) -> Result<Self> {
        if coin.dims() != lattice.dims() {
            return Err(WalkError::DimensionMismatch {
                expected: lattice.dims(),
                found: coin.dims(),
            });
        }
        debug!(
            "Эволюция: решётка {} max={} extra={}, режим {:?}",
            lattice.topology(),
            lattice.max(),
            lattice.extra(),
            mode
        );
        Ok(Self { lattice, coin, mode })
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn coin(&self) -> &CoinOperator {
        &self.coin
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Выполняет шаг `iteration` (отсчёт с нуля) и меняет буферы местами
    pub fn step(&self, buffers: &mut StepBuffers, links: &LinkState, iteration: usize) -> Result<()> {
        if buffers.state().lattice() != &self.lattice || links.lattice() != &self.lattice {
            return Err(WalkError::Config(
                "состояние, связи и эволюция построены для разных решёток".to_string(),
            ));
        }
        let span = self.lattice.span(iteration, self.mode);
        let (lo, hi) = (*span.start(), *span.end());
        {
            let (old, new) = buffers.split();
            let old = old.as_slice();
            let new = new.as_mut_slice();
            match (self.lattice.topology(), &self.coin) {
                (Topology::Line | Topology::Segment | Topology::Cycle, CoinOperator::Single(c)) => {
                    self.step_1d(c, old, new, links.primary(), lo, hi)
                }
                (Topology::Natural, CoinOperator::Double(c)) => {
                    self.step_natural(c, old, new, links.primary(), lo, hi)
                }
                (Topology::Diagonal, CoinOperator::Double(c)) => {
                    let second = links.secondary().ok_or_else(|| {
                        WalkError::Config("у диагональной решётки нет второго массива связей".to_string())
                    })?;
                    self.step_diagonal(c, old, new, links.primary(), second, lo, hi)
                }
                (Topology::Torus, CoinOperator::Double(c)) => {
                    self.step_torus(c, old, new, links.primary())
                }
                (topology, coin) => {
                    return Err(WalkError::DimensionMismatch {
                        expected: topology.dims(),
                        found: coin.dims(),
                    })
                }
            }
        }
        buffers.commit();
        Ok(())
    }

    fn step_1d(
        &self,
        c: &Matrix2<Complex64>,
        old: &[Complex64],
        new: &mut [Complex64],
        tokens: &[LinkToken],
        lo: usize,
        hi: usize,
    ) {
        let n = self.lattice.axis_len();
        let periodic = self.lattice.topology().is_periodic();
        new[lo * 2..(hi + 1) * 2]
            .par_chunks_mut(2)
            .enumerate()
            .for_each(|(i, out)| {
                let m = lo + i;
                for j in 0..2 {
                    let token = tokens[m * 2 + j];
                    let src = if periodic { wrapped(m, token, n) } else { shifted(m, token) };
                    let row = coin_row(j, token);
                    out[1 - j] = c[(row, 0)] * old[src * 2] + c[(row, 1)] * old[src * 2 + 1];
                }
            });
    }

    /// Натуральная решётка: ветви (0,0),(1,1) двигаются по y, ветви (0,1),(1,0) по x
    fn step_natural(
        &self,
        c: &Matrix4<Complex64>,
        old: &[Complex64],
        new: &mut [Complex64],
        tokens: &[LinkToken],
        lo: usize,
        hi: usize,
    ) {
        let n = self.lattice.axis_len();
        new[lo * n * 4..(hi + 1) * n * 4]
            .par_chunks_mut(n * 4)
            .enumerate()
            .for_each(|(i, row_out)| {
                let m = lo + i;
                for k in lo..=hi {
                    for j in 0..2 {
                        for d in 0..2 {
                            let token = tokens[offset_2d(n, m, k, tensor_index(j, d))];
                            let (sm, sk) = if j == d {
                                (m, shifted(k, token))
                            } else {
                                (shifted(m, token), k)
                            };
                            let row = tensor_index(coin_row(j, token), (d as isize + token as isize).unsigned_abs() % 2);
                            let src = &old[offset_2d(n, sm, sk, 0)..offset_2d(n, sm, sk, 0) + 4];
                            let value: Complex64 = (0..4).map(|col| c[(row, col)] * src[col]).sum();
                            row_out[k * 4 + tensor_index(1 - j, 1 - d)] = value;
                        }
                    }
                }
            });
    }

    /// Диагональная решётка: оба индекса монеты сдвигают по своей оси, токены из двух массивов
    #[allow(clippy::too_many_arguments)]
    fn step_diagonal(
        &self,
        c: &Matrix4<Complex64>,
        old: &[Complex64],
        new: &mut [Complex64],
        first: &[LinkToken],
        second: &[LinkToken],
        lo: usize,
        hi: usize,
    ) {
        let n = self.lattice.axis_len();
        new[lo * n * 4..(hi + 1) * n * 4]
            .par_chunks_mut(n * 4)
            .enumerate()
            .for_each(|(i, row_out)| {
                let m = lo + i;
                for k in lo..=hi {
                    for j in 0..2 {
                        for d in 0..2 {
                            let offset = offset_2d(n, m, k, tensor_index(j, d));
                            let (l1, l2) = (first[offset], second[offset]);
                            let (sm, sk) = (shifted(m, l1), shifted(k, l2));
                            let row = tensor_index(coin_row(j, l1), coin_row(d, l2));
                            let base = offset_2d(n, sm, sk, 0);
                            let value: Complex64 = (0..4).map(|col| c[(row, col)] * old[base + col]).sum();
                            row_out[k * 4 + tensor_index(1 - j, 1 - d)] = value;
                        }
                    }
                }
            });
    }

    /// Тор: амплитуда толкается к соседу, поэтому обход последовательный
    fn step_torus(&self, c: &Matrix4<Complex64>, old: &[Complex64], new: &mut [Complex64], tokens: &[LinkToken]) {
        let n = self.lattice.axis_len();
        for m in 0..n {
            for k in 0..n {
                let base = offset_2d(n, m, k, 0);
                for j in 0..2 {
                    for d in 0..2 {
                        let token = tokens[base + tensor_index(j, d)];
                        let row = tensor_index(j, d);
                        let value: Complex64 = (0..4).map(|col| c[(row, col)] * old[base + col]).sum();
                        let (tm, tk) = if j == d {
                            (m, wrapped(k, token, n))
                        } else {
                            (wrapped(m, token, n), k)
                        };
                        let tj = 1 - coin_row(j, token);
                        let td = 1 - (d as isize + token as isize).unsigned_abs() % 2;
                        new[offset_2d(n, tm, tk, tensor_index(tj, td))] = value;
                    }
                }
            }
        }
    }
}
