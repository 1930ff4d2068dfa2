use super::*;
use crate::coin::CoinKind;
use crate::config::parse_keyword_options;
use crate::evolution::{Evolution, StepBuffers};
use crate::lattice::{ScanMode, Topology};
use crate::links::{BreakProbabilities, LinkDefect};
use crate::measure::Detector;
use crate::screen::ScreenSpec;
use crate::state::StateKind;
use num_complex::Complex64;

fn options(topology: Topology, steps: usize) -> WalkOptions {
    let mut options = WalkOptions::defaults(topology.dims());
    options.topology = topology;
    options.steps = steps;
    if topology.is_open() {
        options.max = steps + options.extra;
    } else {
        options.extra = 0;
        options.max = steps.max(4);
    }
    options.seed = Some(2024);
    options
}

#[test]
fn test_hadamard_line_double_peak() {
    let report = Simulation::new(options(Topology::Line, 100)).unwrap().run().unwrap();
    let probs = report.average.as_slice();
    let origin = report.lattice.origin();

    for x in 0..=100 {
        let diff = (probs[origin + x] - probs[origin - x]).abs();
        assert!(diff < WALK_TOL, "асимметрия в x={}: {}", x, diff);
        if x % 2 == 1 {
            assert!(probs[origin + x] < 1e-20);
        }
    }

    // средние по окнам чётных узлов растут от центра к пикам
    let window = |from: usize, to: usize| -> f64 {
        let sites: Vec<f64> = (from..=to).step_by(2).map(|x| probs[origin + x]).collect();
        sites.iter().sum::<f64>() / sites.len() as f64
    };
    let (inner, middle, outer) = (window(2, 20), window(22, 40), window(42, 60));
    assert!(inner < middle && middle < outer, "{} {} {}", inner, middle, outer);

    let (peak, p_peak) = (0..=100)
        .map(|x| (x, probs[origin + x]))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    assert!((60..=76).contains(&peak), "пик в {}", peak);
    assert!(p_peak > 5.0 * probs[origin]);
    assert!(probs[origin + 90..].iter().all(|&p| p < p_peak / 10.0));

    let last = report.statistics.last().unwrap();
    assert_eq!(last.iteration, 100);
    assert!(last.mean_x.abs() < WALK_TOL);
    assert!(last.variance > 1000.0);
}

#[test]
fn test_cycle_keeps_norm_for_thousand_steps() {
    let lattice = Lattice::new(Topology::Cycle, 8, 0).unwrap();
    let evolution = Evolution::new(lattice, CoinOperator::hadamard_1d(), ScanMode::LightCone).unwrap();
    let links = LinkState::new(lattice).unwrap();
    let mut buffers = StepBuffers::new(WalkState::initial(lattice, StateKind::Hadamard, None).unwrap()).unwrap();
    for t in 0..1000 {
        evolution.step(&mut buffers, &links, t).unwrap();
        let total = buffers.state().total_probability();
        assert!((total - 1.0).abs() < WALK_TOL, "шаг {}: {}", t, total);
    }
}

#[test]
fn test_segment_walker_stays_inside() {
    let mut opts = options(Topology::Segment, 60);
    opts.max = 7;
    opts.checks.norm = true;
    let report = Simulation::new(opts).unwrap().run().unwrap();
    assert_eq!(report.average.shape(), &[7]);
    assert!((report.average.sum() - 1.0).abs() < WALK_TOL);
    assert!(report.statistics.iter().all(|r| (0.0..=6.0).contains(&r.mean_x)));
}

#[test]
fn test_same_seed_same_report() {
    let mut opts = options(Topology::Natural, 15);
    opts.coin = CoinKind::Grover;
    opts.state = StateKind::Grover;
    opts.experiments = 3;
    opts.break_probabilities = BreakProbabilities { a: 0.1, b: 0.05 };
    opts.decoherence = 0.02;
    opts.detectors = vec![Detector::new(1, 0), Detector::new(-2, 1)];
    opts.steps_after_measure = 2;
    opts.defects = vec![LinkDefect::Point { x: 3, y: 3 }];

    let first = Simulation::new(opts.clone()).unwrap().run().unwrap();
    let second = Simulation::new(opts.clone()).unwrap().run().unwrap();
    assert_eq!(first.last_state, second.last_state);
    assert_eq!(first.detections, second.detections);
    assert_eq!(first.statistics, second.statistics);
    assert_eq!(first.average, second.average);

    opts.seed = Some(2025);
    let other = Simulation::new(opts).unwrap().run().unwrap();
    assert!(other.detections != first.detections || other.last_state != first.last_state);
}

#[test]
fn test_detector_click_shortens_trial() {
    let mut opts = options(Topology::Line, 40);
    opts.detectors = vec![Detector::new(0, 0)];
    opts.steps_after_measure = 3;
    let report = Simulation::new(opts).unwrap().run().unwrap();

    // конец испытания определяет последнее срабатывание
    let click = report.detections.iter().rev().find(|d| d.outcome > 0);
    let executed = report.detections.len();
    match click {
        Some(event) => assert_eq!(executed, (event.iteration - 1 + 3).min(40).max(event.iteration)),
        None => assert_eq!(executed, 40),
    }
    assert_eq!(report.statistics.len(), executed);
    assert!((report.last_state.total_probability() - 1.0).abs() < WALK_TOL);
}

#[test]
fn test_origin_detector_probability_after_steps() {
    let lattice = Lattice::new(Topology::Line, 5, 1).unwrap();
    let state = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
    let detectors = DetectorSet::new(&lattice, &[Detector::new(0, 0)]).unwrap();
    let probs = detectors.outcome_probabilities(&state);
    let direct = state.get(&[5], 0).norm_sqr() + state.get(&[5], 1).norm_sqr();
    assert!((probs[1] - direct).abs() < 1e-15);
    assert!((probs[1] - 1.0).abs() < 1e-12);

    // шаг, затем измерение: после двух шагов частица снова может быть в начале
    let evolution = Evolution::new(lattice, CoinOperator::hadamard_1d(), ScanMode::LightCone).unwrap();
    let links = LinkState::new(lattice).unwrap();
    let mut buffers = StepBuffers::new(state).unwrap();
    for t in 0..2 {
        evolution.step(&mut buffers, &links, t).unwrap();
    }
    let stepped = buffers.state().clone();
    let direct = stepped.get(&[5], 0).norm_sqr() + stepped.get(&[5], 1).norm_sqr();
    assert!(direct > 0.1 && direct < 0.9);

    let mut rng = StdRng::seed_from_u64(11);
    let detection = measure_detectors(buffers.state_mut(), &detectors, &mut rng).unwrap();
    assert!((detection.probabilities[1] - direct).abs() < 1e-12);
    assert!((detection.probabilities[0] - (1.0 - direct)).abs() < 1e-12);

    let collapsed = buffers.state();
    assert!((collapsed.total_probability() - 1.0).abs() < 1e-12);
    let at_origin = collapsed.site_probability(5);
    if detection.clicked() {
        assert!((at_origin - 1.0).abs() < 1e-12);
    } else {
        assert_eq!(at_origin, 0.0);
    }
}

#[test]
fn test_keyword_run_without_lattice_margin() {
    let options =
        parse_keyword_options("BEGIN LATTEXTRA 0 STEPS 10 CHECK STATEPROB SEED 7 END", 1).unwrap();
    assert_eq!((options.max, options.extra), (10, 0));
    let report = Simulation::new(options).unwrap().run().unwrap();
    assert_eq!(report.statistics.len(), 10);
    // на последнем шаге крайние пути уходят в необновляемые строки
    let total = report.last_state.total_probability();
    assert!(total > 0.99 && total <= 1.0 + WALK_TOL, "{}", total);
}

#[test]
fn test_diagonal_parity_with_noise() {
    let mut opts = options(Topology::Diagonal, 12);
    opts.coin = CoinKind::Fourier;
    opts.state = StateKind::Fourier;
    opts.break_probabilities = BreakProbabilities { a: 0.2, b: 0.2 };
    opts.decoherence = 0.05;
    let report = Simulation::new(opts).unwrap().run().unwrap();
    let n = report.lattice.axis_len();
    for m in 0..n {
        for k in 0..n {
            if (m + k) % 2 == 1 {
                assert_eq!(*report.average.get(&[m, k]).unwrap(), 0.0);
            }
        }
    }
}

#[test]
fn test_mixing_distances_on_cycle() {
    let mut opts = options(Topology::Cycle, 50);
    opts.max = 11;
    opts.mixing_steps = 500;
    let report = Simulation::new(opts).unwrap().run().unwrap();
    let stationary = report.stationary.as_ref().unwrap();
    assert!((stationary.sum() - 1.0).abs() < WALK_TOL);
    assert_eq!(report.statistics.len(), 50);
    assert!(report.statistics.iter().all(|r| r.tvd >= 0.0 && r.tvd <= 2.0 + WALK_TOL));
    assert!(report.statistics[49].tvd < report.statistics[0].tvd);
}

#[test]
fn test_strict_mode_rejects_disturbed_mixing() {
    let mut opts = options(Topology::Cycle, 10);
    opts.mixing_steps = 20;
    opts.decoherence = 0.1;
    assert!(Simulation::new(opts.clone()).unwrap().run().is_ok());
    opts.strict = true;
    assert!(matches!(
        Simulation::new(opts).unwrap().run(),
        Err(WalkError::Config(_))
    ));
}

#[test]
fn test_norm_check_aborts_trial() {
    let mut opts = options(Topology::Segment, 5);
    opts.max = 2;
    opts.state = StateKind::Custom;
    opts.custom_state = Some(vec![Complex64::new(1.0, 0.0); 4]);
    opts.checks.norm = true;
    assert!(matches!(
        Simulation::new(opts).unwrap().run(),
        Err(WalkError::NormDrift { iteration: 0, .. })
    ));
}

#[test]
fn test_symmetry_check_passes_for_symmetric_walk() {
    let mut opts = options(Topology::Line, 30);
    opts.checks.norm = true;
    opts.checks.symmetry_x = true;
    assert!(Simulation::new(opts.clone()).unwrap().run().is_ok());

    opts.state = StateKind::Custom;
    let mut amplitudes = vec![Complex64::new(0.0, 0.0); 2 * 63];
    amplitudes[30] = Complex64::new(1.0, 0.0);
    opts.custom_state = Some(amplitudes);
    assert!(matches!(
        Simulation::new(opts).unwrap().run(),
        Err(WalkError::Asymmetric { axis: 'x', .. })
    ));
}

#[test]
fn test_screen_collects_intensity() {
    let mut opts = options(Topology::Natural, 8);
    opts.screen = Some(ScreenSpec { from: (-8, 4), to: (8, 4) });
    let report = Simulation::new(opts).unwrap().run().unwrap();
    let screen = report.screen.unwrap();
    assert_eq!(screen.len(), 17);
    assert!(screen.intensity().iter().any(|&v| v > 0.0));
}
