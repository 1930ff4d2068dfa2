//! Токены связей (формализм разорванных связей, PRA 74 012312).
//!
//! Токен хранит номинальный сдвиг ветви монеты: ±1 для открытой связи и
//! 0 для разорванной. Эволюция использует его одновременно как сдвиг
//! позиции и как селектор строки монеты, поэтому отражение на разрыве
//! получается без ветвлений. Разрыв всегда парный: обнуляется и токен
//! ветви, и встречный токен соседа.

pub mod defects;

pub use defects::LinkDefect;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::Grid;
use crate::lattice::{Lattice, Topology};

pub type LinkToken = i8;

/// Вероятности случайного разрыва связей.
/// В 1D используется только `a`; в 2D `a` и `b` относятся к двум семействам связей.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakProbabilities {
    pub a: f64,
    pub b: f64,
}

impl BreakProbabilities {
    pub fn any(&self) -> bool {
        self.a > 0.0 || self.b > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct LinkState {
    lattice: Lattice,
    primary: Grid<LinkToken>,
    /// Второй массив токенов, только у диагональной решётки
    secondary: Option<Grid<LinkToken>>,
}

#[inline]
fn nominal(bit: usize) -> LinkToken {
    if bit == 0 {
        1
    } else {
        -1
    }
}

impl LinkState {
    /// Все связи открыты; стенки отрезка закрыты
    pub fn new(lattice: Lattice) -> Result<Self> {
        let shape = lattice.shape();
        let primary = Grid::zeros(&shape)?;
        let secondary = if lattice.topology() == Topology::Diagonal {
            Some(Grid::zeros(&shape)?)
        } else {
            None
        };
        let mut links = Self { lattice, primary, secondary };
        links.reset();
        Ok(links)
    }

    /// Возвращает все связи в открытое состояние
    pub fn reset(&mut self) {
        let coins = self.lattice.coins();
        let two_dim = self.lattice.dims() == 2;
        for (offset, token) in self.primary.as_mut_slice().iter_mut().enumerate() {
            let coin = offset % coins;
            let j = if two_dim { coin / 2 } else { coin };
            *token = nominal(j);
        }
        if let Some(secondary) = self.secondary.as_mut() {
            for (offset, token) in secondary.as_mut_slice().iter_mut().enumerate() {
                *token = nominal(offset % 2);
            }
        }
        self.enforce_walls();
    }

    /// Концы отрезка остаются постоянными стенками
    fn enforce_walls(&mut self) {
        if self.lattice.topology() == Topology::Segment {
            let last = self.lattice.axis_len() - 1;
            let tokens = self.primary.as_mut_slice();
            tokens[last * 2] = 0;
            tokens[1] = 0;
        }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Плоский массив токенов в том же порядке, что и амплитуды
    #[inline]
    pub fn primary(&self) -> &[LinkToken] {
        self.primary.as_slice()
    }

    #[inline]
    pub fn secondary(&self) -> Option<&[LinkToken]> {
        self.secondary.as_ref().map(|g| g.as_slice())
    }

    pub fn token(&self, index: &[usize]) -> Option<LinkToken> {
        self.primary.get(index).copied()
    }

    pub fn secondary_token(&self, index: &[usize]) -> Option<LinkToken> {
        self.secondary.as_ref().and_then(|g| g.get(index).copied())
    }

    /// Число разорванных ветвей (нулевых токенов)
    pub fn broken_count(&self) -> usize {
        self.primary.iter().filter(|&&t| t == 0).count()
    }

    #[inline]
    fn offset_2d(&self, m: usize, n: usize, j: usize, k: usize) -> usize {
        ((m * self.lattice.axis_len() + n) * 2 + j) * 2 + k
    }

    fn sever_1d(&mut self, m: usize, j: usize) {
        self.primary.as_mut_slice()[m * 2 + j] = 0;
    }

    pub(crate) fn sever(&mut self, m: usize, n: usize, j: usize, k: usize) {
        let offset = self.offset_2d(m, n, j, k);
        self.primary.as_mut_slice()[offset] = 0;
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.as_mut_slice()[offset] = 0;
        }
    }

    /// Разрывает каждую связь независимо с заданной вероятностью.
    /// Порядок розыгрышей фиксирован, чтобы прогон воспроизводился по зерну.
    pub fn break_random<R: Rng + ?Sized>(&mut self, rng: &mut R, probs: BreakProbabilities) {
        let axis = self.lattice.axis_len();
        match self.lattice.topology() {
            Topology::Line | Topology::Segment => {
                for m in 0..axis - 1 {
                    if rng.gen::<f64>() < probs.a {
                        self.sever_1d(m, 0);
                        self.sever_1d(m + 1, 1);
                    }
                }
            }
            Topology::Cycle => {
                for m in 0..axis {
                    if rng.gen::<f64>() < probs.a {
                        self.sever_1d(m, 0);
                        self.sever_1d((m + 1) % axis, 1);
                    }
                }
            }
            Topology::Diagonal => {
                let edge = axis - 1;
                for m in 0..edge {
                    for n in 0..edge {
                        if rng.gen::<f64>() < probs.a {
                            self.sever(m, n, 0, 0);
                            self.sever(m + 1, n + 1, 1, 1);
                        }
                    }
                }
                for m in 1..=edge {
                    for n in 0..edge {
                        if rng.gen::<f64>() < probs.b {
                            self.sever(m, n, 1, 0);
                            self.sever(m - 1, n + 1, 0, 1);
                        }
                    }
                }
            }
            Topology::Natural => {
                let edge = axis - 1;
                for m in 0..edge {
                    for n in 0..edge {
                        if rng.gen::<f64>() < probs.a {
                            self.sever(m, n, 0, 1);
                            self.sever(m + 1, n, 1, 0);
                        }
                        if rng.gen::<f64>() < probs.b {
                            self.sever(m, n, 0, 0);
                            self.sever(m, n + 1, 1, 1);
                        }
                    }
                }
                // последняя строка и последний столбец
                for m in 0..edge {
                    if rng.gen::<f64>() < probs.a {
                        self.sever(m, edge, 0, 1);
                        self.sever(m + 1, edge, 1, 0);
                    }
                }
                for n in 0..edge {
                    if rng.gen::<f64>() < probs.b {
                        self.sever(edge, n, 0, 0);
                        self.sever(edge, n + 1, 1, 1);
                    }
                }
            }
            Topology::Torus => {
                for m in 0..axis {
                    for n in 0..axis {
                        if rng.gen::<f64>() < probs.a {
                            self.sever(m, n, 0, 1);
                            self.sever((m + 1) % axis, n, 1, 0);
                        }
                        if rng.gen::<f64>() < probs.b {
                            self.sever(m, n, 0, 0);
                            self.sever(m, (n + 1) % axis, 1, 1);
                        }
                    }
                }
            }
        }
        self.enforce_walls();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_open_links_carry_nominal_shift() {
        let lattice = Lattice::new(Topology::Line, 4, 1).unwrap();
        let links = LinkState::new(lattice).unwrap();
        assert_eq!(links.token(&[3, 0]), Some(1));
        assert_eq!(links.token(&[3, 1]), Some(-1));
        assert_eq!(links.broken_count(), 0);

        let diag = Lattice::new(Topology::Diagonal, 2, 1).unwrap();
        let links = LinkState::new(diag).unwrap();
        assert_eq!(links.token(&[1, 2, 1, 0]), Some(-1));
        assert_eq!(links.secondary_token(&[1, 2, 1, 0]), Some(1));
        assert_eq!(links.secondary_token(&[1, 2, 0, 1]), Some(-1));

        let natural = Lattice::new(Topology::Natural, 2, 1).unwrap();
        assert!(LinkState::new(natural).unwrap().secondary().is_none());
    }

    #[test]
    fn test_segment_walls_survive_reroll() {
        let lattice = Lattice::new(Topology::Segment, 6, 0).unwrap();
        let mut links = LinkState::new(lattice).unwrap();
        assert_eq!(links.token(&[5, 0]), Some(0));
        assert_eq!(links.token(&[0, 1]), Some(0));
        let mut rng = StdRng::seed_from_u64(3);
        links.reset();
        links.break_random(&mut rng, BreakProbabilities { a: 0.5, b: 0.0 });
        assert_eq!(links.token(&[5, 0]), Some(0));
        assert_eq!(links.token(&[0, 1]), Some(0));
    }

    #[test]
    fn test_breaks_are_paired() {
        let lattice = Lattice::new(Topology::Cycle, 7, 0).unwrap();
        let mut links = LinkState::new(lattice).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        links.break_random(&mut rng, BreakProbabilities { a: 0.4, b: 0.0 });
        for m in 0..7 {
            let right = links.token(&[m, 0]).unwrap();
            let left = links.token(&[(m + 1) % 7, 1]).unwrap();
            assert_eq!(right == 0, left == 0, "связь {}-{}", m, (m + 1) % 7);
        }

        let natural = Lattice::new(Topology::Natural, 3, 1).unwrap();
        let mut links = LinkState::new(natural).unwrap();
        links.break_random(&mut rng, BreakProbabilities { a: 0.3, b: 0.3 });
        for m in 0..6 {
            for n in 0..7 {
                let a = links.token(&[m, n, 0, 1]).unwrap();
                let b = links.token(&[m + 1, n, 1, 0]).unwrap();
                assert_eq!(a == 0, b == 0);
            }
        }
    }

    #[test]
    fn test_full_break_probability_severs_everything() {
        let lattice = Lattice::new(Topology::Torus, 4, 0).unwrap();
        let mut links = LinkState::new(lattice).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        links.break_random(&mut rng, BreakProbabilities { a: 1.0, b: 1.0 });
        assert_eq!(links.broken_count(), 4 * 4 * 4);
        links.reset();
        assert_eq!(links.broken_count(), 0);
    }

    #[test]
    fn test_same_seed_same_links() {
        let lattice = Lattice::new(Topology::Diagonal, 4, 1).unwrap();
        let mut a = LinkState::new(lattice).unwrap();
        let mut b = LinkState::new(lattice).unwrap();
        a.break_random(&mut StdRng::seed_from_u64(42), BreakProbabilities { a: 0.2, b: 0.1 });
        b.break_random(&mut StdRng::seed_from_u64(42), BreakProbabilities { a: 0.2, b: 0.1 });
        assert_eq!(a.primary(), b.primary());
        assert_eq!(a.secondary(), b.secondary());
    }
}
