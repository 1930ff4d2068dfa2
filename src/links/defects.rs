//! Постоянно разорванные связи, заданные точками и отрезками (только 2D).

use serde::{Deserialize, Serialize};

use super::LinkState;
use crate::error::{Result, WalkError};
use crate::lattice::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkDefect {
    /// Изолировать один узел
    Point { x: i64, y: i64 },
    /// Изолировать все узлы горизонтального, вертикального или диагонального отрезка
    Line { x0: i64, y0: i64, x1: i64, y1: i64 },
}

/// Точки отрезка с наклоном 0, ∞ или ±1; `None` для любого другого наклона
pub fn straight_line(from: (i64, i64), to: (i64, i64)) -> Option<Vec<(i64, i64)>> {
    let dx = (to.0 - from.0).abs();
    let dy = (to.1 - from.1).abs();
    if dx != 0 && dy != 0 && dx != dy {
        return None;
    }
    let step_x = (to.0 - from.0).signum();
    let step_y = (to.1 - from.1).signum();
    Some(
        (0..=dx.max(dy))
            .map(|t| (from.0 + step_x * t, from.1 + step_y * t))
            .collect(),
    )
}

impl LinkDefect {
    /// Узлы, которые изолирует дефект
    pub fn sites(&self) -> Result<Vec<(i64, i64)>> {
        match *self {
            LinkDefect::Point { x, y } => Ok(vec![(x, y)]),
            LinkDefect::Line { x0, y0, x1, y1 } => straight_line((x0, y0), (x1, y1)).ok_or_else(|| {
                WalkError::Config(format!(
                    "отрезок ({}, {}) - ({}, {}) должен быть горизонтальным, вертикальным или под 45°",
                    x0, y0, x1, y1
                ))
            }),
        }
    }
}

impl LinkState {
    /// Разрывает все связи узлов, перечисленных в дефектах
    pub fn apply_defects(&mut self, defects: &[LinkDefect]) -> Result<()> {
        let dims = self.lattice.dims();
        if dims != 2 {
            return Err(WalkError::DimensionMismatch { expected: 2, found: dims });
        }
        for defect in defects {
            for (x, y) in defect.sites()? {
                let m = self.lattice.index_of(x);
                let n = self.lattice.index_of(y);
                match (m, n) {
                    (Some(m), Some(n)) => self.isolate(m, n),
                    _ => {
                        return Err(WalkError::SiteOutOfRange(format!(
                            "разорванная связь в ({}, {})",
                            x, y
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn isolate(&mut self, m: usize, n: usize) {
        let lattice = self.lattice;
        for j in 0..2 {
            for k in 0..2 {
                self.sever(m, n, j, k);
                let aj = if j == 0 { 1 } else { -1 };
                let ak = if k == 0 { 1 } else { -1 };
                let (dx, dy) = match lattice.topology() {
                    Topology::Diagonal => (aj, ak),
                    _ if j == k => (0, aj),
                    _ => (aj, 0),
                };
                // на краю решётки встречного токена нет
                if let (Some(mm), Some(nn)) = (lattice.neighbour(m, dx), lattice.neighbour(n, dy)) {
                    self.sever(mm, nn, 1 - j, 1 - k);
                }
            }
        }
    }
}
