//! Оценка стационарного распределения по невозмущённому блужданию.

use log::{debug, info};

use crate::error::{Result, WalkError};
use crate::evolution::{Evolution, StepBuffers};
use crate::grid::Grid;
use crate::links::LinkState;
use crate::state::WalkState;
use crate::WALK_TOL;

/// Среднее по времени распределение за `steps` шагов без детекторов и декогеренции.
///
/// Связи используются как есть (постоянные дефекты учитываются, случайные
/// разрывы нет). Сумма результата должна быть равна 1 с точностью `WALK_TOL`.
pub fn estimate_stationary(
    evolution: &Evolution,
    initial: &WalkState,
    links: &LinkState,
    steps: usize,
) -> Result<Grid<f64>> {
    if steps == 0 {
        return Err(WalkError::Config(
            "для оценки стационарного распределения нужен хотя бы один шаг".to_string(),
        ));
    }
    info!("Оценка стационарного распределения: {} шагов", steps);

    let mut buffers = StepBuffers::new(initial.clone())?;
    let mut average = Grid::zeros(&initial.lattice().site_shape())?;
    for t in 0..steps {
        evolution.step(&mut buffers, links, t)?;
        let coins = initial.lattice().coins();
        for (acc, amplitudes) in average
            .as_mut_slice()
            .iter_mut()
            .zip(buffers.state().as_slice().chunks(coins))
        {
            *acc += amplitudes.iter().map(|a| a.norm_sqr()).sum::<f64>();
        }
    }
    let scale = 1.0 / steps as f64;
    average.as_mut_slice().iter_mut().for_each(|p| *p *= scale);

    let total = average.sum();
    debug!("Сумма стационарного распределения: {:e}", total);
    if (total - 1.0).abs() > WALK_TOL {
        return Err(WalkError::StationaryNotNormalized(total));
    }
    Ok(average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::CoinOperator;
    use crate::lattice::{Lattice, ScanMode, Topology};
    use crate::state::StateKind;

    #[test]
    fn test_cycle_estimate_is_normalized() {
        let lattice = Lattice::new(Topology::Cycle, 9, 0).unwrap();
        let evolution = Evolution::new(lattice, CoinOperator::hadamard_1d(), ScanMode::LightCone).unwrap();
        let links = LinkState::new(lattice).unwrap();
        let initial = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        let estimate = estimate_stationary(&evolution, &initial, &links, 300).unwrap();
        assert_eq!(estimate.shape(), &[9]);
        assert!((estimate.sum() - 1.0).abs() < WALK_TOL);
        assert!(estimate.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_torus_estimate_spreads() {
        let lattice = Lattice::new(Topology::Torus, 5, 0).unwrap();
        let evolution = Evolution::new(lattice, CoinOperator::grover_2d(), ScanMode::LightCone).unwrap();
        let links = LinkState::new(lattice).unwrap();
        let initial = WalkState::initial(lattice, StateKind::Grover, None).unwrap();
        let estimate = estimate_stationary(&evolution, &initial, &links, 50).unwrap();
        assert!(estimate.iter().filter(|&&p| p > 0.0).count() > 1);
    }

    #[test]
    fn test_leaking_line_is_rejected() {
        // после двух шагов носитель занимает все обновляемые строки,
        // на третьем амплитуда уходит в крайние и теряется
        let lattice = Lattice::new(Topology::Line, 3, 0).unwrap();
        let evolution = Evolution::new(lattice, CoinOperator::hadamard_1d(), ScanMode::LightCone).unwrap();
        let links = LinkState::new(lattice).unwrap();
        let initial = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        assert!(matches!(
            estimate_stationary(&evolution, &initial, &links, 40),
            Err(WalkError::StationaryNotNormalized(_))
        ));
        assert!(estimate_stationary(&evolution, &initial, &links, 0).is_err());
    }
}
