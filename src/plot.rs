//! SVG-графики результатов (plotters).

use std::error::Error;
use std::path::{Path, PathBuf};

use log::{info, warn};
use plotters::prelude::*;

use crate::error::{Result, WalkError};
use crate::grid::Grid;
use crate::lattice::Lattice;
use crate::output::OutputFiles;
use crate::screen::ObservationScreen;
use crate::simulation::SimulationReport;
use crate::statistics::StatisticsRecord;

type PlotResult = std::result::Result<(), Box<dyn Error>>;

const SIZE: (u32, u32) = (1000, 700);

fn plot_error(path: &Path, err: Box<dyn Error>) -> WalkError {
    WalkError::Plot(format!("{}: {}", path.display(), err))
}

fn upper(max: f64) -> f64 {
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

fn draw_line(path: &Path, title: &str, x_desc: &str, y_desc: &str, points: &[(f64, f64)]) -> PlotResult {
    let (x0, x1) = points
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &(x, _)| (lo.min(x), hi.max(x)));
    let (x0, x1) = if x0 < x1 { (x0, x1) } else { (x0 - 1.0, x0 + 1.0) };
    let y_max = points.iter().fold(0.0f64, |acc, &(_, y)| acc.max(y));

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x0..x1, 0.0..upper(y_max))?;
    chart.configure_mesh().x_desc(x_desc).y_desc(y_desc).draw()?;
    chart.draw_series(LineSeries::new(points.iter().copied(), &BLUE))?;
    root.present()?;
    Ok(())
}

fn draw_heat_map(path: &Path, title: &str, lattice: &Lattice, probs: &Grid<f64>) -> PlotResult {
    let n = lattice.axis_len();
    let (lo, hi) = (lattice.coordinate(0), lattice.coordinate(n - 1) + 1);
    let p_max = probs.iter().fold(0.0f64, |acc, &p| acc.max(p));

    let root = SVGBackend::new(path, (SIZE.1, SIZE.1)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(lo..hi, lo..hi)?;
    chart.configure_mesh().x_desc("x").y_desc("y").disable_mesh().draw()?;
    for (site, &p) in probs.iter().enumerate().filter(|(_, &p)| p > 0.0) {
        let x = lattice.coordinate(site / n);
        let y = lattice.coordinate(site % n);
        let t = if p_max > 0.0 { (p / p_max).clamp(0.0, 1.0) } else { 0.0 };
        let color = HSLColor((240.0 - 240.0 * t) / 360.0, 0.85, 0.22 + 0.50 * t);
        chart.draw_series(std::iter::once(Rectangle::new([(x, y), (x + 1, y + 1)], color.filled())))?;
    }
    root.present()?;
    Ok(())
}

/// Распределение вероятностей: линия в 1D, тепловая карта в 2D
pub fn plot_distribution(path: &Path, title: &str, lattice: &Lattice, probs: &Grid<f64>) -> Result<()> {
    let drawn = if lattice.dims() == 1 {
        let points: Vec<(f64, f64)> = probs
            .iter()
            .enumerate()
            .map(|(m, &p)| (lattice.coordinate(m) as f64, p))
            .collect();
        draw_line(path, title, "x", "P(x)", &points)
    } else {
        draw_heat_map(path, title, lattice, probs)
    };
    drawn.map_err(|e| plot_error(path, e))
}

/// Дисперсия по шагам
pub fn plot_variance(path: &Path, records: &[StatisticsRecord]) -> Result<()> {
    let points: Vec<(f64, f64)> = records
        .iter()
        .map(|r| (r.iteration as f64, r.variance))
        .collect();
    draw_line(path, "Variance", "step", "variance", &points).map_err(|e| plot_error(path, e))
}

pub fn plot_screen(path: &Path, screen: &ObservationScreen) -> Result<()> {
    let points: Vec<(f64, f64)> = screen
        .intensity()
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();
    draw_line(path, "Observation screen", "index", "intensity", &points).map_err(|e| plot_error(path, e))
}

/// Рисует все графики прогона; неудачный график только предупреждение
pub fn plot_report(files: &OutputFiles, report: &SimulationReport) -> Vec<PathBuf> {
    let mut jobs: Vec<(PathBuf, Result<()>)> = Vec::new();

    let path = files.plot("");
    let result = plot_distribution(&path, "Probability distribution", &report.lattice, &report.average);
    jobs.push((path, result));

    if !report.statistics.is_empty() {
        let path = files.plot("var");
        let result = plot_variance(&path, &report.statistics);
        jobs.push((path, result));
    }
    if let Some(stationary) = &report.stationary {
        let path = files.plot("pb");
        let result = plot_distribution(&path, "Stationary distribution", &report.lattice, stationary);
        jobs.push((path, result));
    }
    if let Some(screen) = report.screen.as_ref().filter(|s| !s.is_empty()) {
        let path = files.plot("screen");
        let result = plot_screen(&path, screen);
        jobs.push((path, result));
    }

    jobs.into_iter()
        .filter_map(|(path, result)| match result {
            Ok(()) => {
                info!("График {}", path.display());
                Some(path)
            }
            Err(err) => {
                warn!("{}", err);
                None
            }
        })
        .collect()
}
