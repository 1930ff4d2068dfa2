//! Файлы результатов: распределения, волновая функция, статистика, экран.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::WalkOptions;
use crate::error::Result;
use crate::grid::Grid;
use crate::lattice::Lattice;
use crate::screen::ObservationScreen;
use crate::simulation::SimulationReport;
use crate::state::WalkState;
use crate::statistics::StatisticsRecord;
use crate::WALK_TOL;

/// Имена выходных файлов, производные от имени входного файла
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    dir: PathBuf,
    stem: String,
}

impl OutputFiles {
    /// Файлы кладутся в `dir`, а без него рядом с входным файлом
    pub fn new(input: &Path, dir: Option<&Path>) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "qwalk".to_string());
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Self { dir, stem }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.stem, suffix))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data(&self) -> PathBuf {
        self.with_suffix(".dat")
    }

    pub fn wave(&self) -> PathBuf {
        self.with_suffix("-wave.dat")
    }

    pub fn stationary(&self) -> PathBuf {
        self.with_suffix("-pb.dat")
    }

    pub fn statistics(&self) -> PathBuf {
        self.with_suffix(".sta")
    }

    pub fn screen(&self) -> PathBuf {
        self.with_suffix("-screen.dat")
    }

    pub fn report(&self) -> PathBuf {
        self.with_suffix("-report.json")
    }

    /// SVG-график; пустой `kind` даёт основной график распределения
    pub fn plot(&self, kind: &str) -> PathBuf {
        if kind.is_empty() {
            self.with_suffix(".svg")
        } else {
            self.with_suffix(&format!("-{}.svg", kind))
        }
    }
}

/// Число в формате `%e`: шесть знаков мантиссы и порядок со знаком
pub fn sci(value: f64) -> String {
    let text = format!("{:.6e}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => format!(
                "{}e{}{:02}",
                mantissa,
                if exp < 0 { '-' } else { '+' },
                exp.abs()
            ),
            Err(_) => text,
        },
        None => text,
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    info!("Запись {}", path.display());
    Ok(BufWriter::new(File::create(path)?))
}

/// Комментарий `#` с параметрами прогона
pub fn write_header<W: Write>(out: &mut W, options: &WalkOptions, seed: u64) -> Result<()> {
    let lattice = options.lattice()?;
    writeln!(out, "#Output generated by qwalk ({}D)", lattice.dims())?;
    writeln!(out, "# Simulation options ({}D):", lattice.dims())?;
    writeln!(out, "#  Coin: {}.", options.coin)?;
    writeln!(out, "#  Initial state: {}.", options.state)?;
    writeln!(out, "#  Lattice type: {}.", lattice.topology())?;
    if !options.defects.is_empty() {
        writeln!(out, "#  Using {} permanent broken link defects.", options.defects.len())?;
    }
    if options.checks.norm {
        writeln!(out, "#  Sum of probabilities checked in each iteration.")?;
    }
    if options.checks.symmetry_x {
        writeln!(out, "#  x-Symmetry of probabilities checked in each iteration.")?;
    }
    if options.checks.symmetry_y {
        writeln!(out, "#  y-Symmetry of probabilities checked in each iteration.")?;
    }
    if lattice.dims() == 1 {
        writeln!(out, "#  Probability of broken links: {:.6}", options.break_probabilities.a)?;
    } else {
        writeln!(
            out,
            "#  Probability of broken links: {:.6}, {:.6}",
            options.break_probabilities.a, options.break_probabilities.b
        )?;
    }
    writeln!(out, "#  Probability of measurement: {:.6}", options.decoherence)?;
    writeln!(out, "#  Number of experiments: {}", options.experiments)?;
    writeln!(out, "#  Number of steps: {}", options.steps)?;
    if options.mixing_enabled() {
        writeln!(
            out,
            "#  Steps to approximate stationary distribution: {}",
            options.mixing_steps
        )?;
    }
    let (low, high) = (lattice.coordinate(0), lattice.coordinate(lattice.axis_len() - 1));
    if lattice.dims() == 1 {
        writeln!(out, "#  Lattice size: {}..{} in X axis.", low, high)?;
    } else {
        writeln!(
            out,
            "#  Lattice size: {}..{} in X axis and {}..{} in Y axis.",
            low, high, low, high
        )?;
    }
    writeln!(out, "#  Random seed: {}", seed)?;
    writeln!(out)?;
    Ok(())
}

/// Строки `x p` (1D) или `x y p` (2D) для ненулевых вероятностей.
/// В 2D после каждой непустой строки решётки идёт пустая строка.
pub fn write_probabilities<W: Write>(out: &mut W, lattice: &Lattice, probs: &Grid<f64>) -> Result<()> {
    let n = lattice.axis_len();
    let data = probs.as_slice();
    if lattice.dims() == 1 {
        for (m, &p) in data.iter().enumerate().filter(|(_, &p)| p > 0.0) {
            writeln!(out, "{}\t{}", lattice.coordinate(m), sci(p))?;
        }
    } else {
        for (m, row) in data.chunks(n).enumerate() {
            let mut written = false;
            for (k, &p) in row.iter().enumerate().filter(|(_, &p)| p > 0.0) {
                writeln!(out, "{}\t{}\t{}", lattice.coordinate(m), lattice.coordinate(k), sci(p))?;
                written = true;
            }
            if written {
                writeln!(out)?;
            }
        }
    }
    if (probs.sum() - 1.0).abs() > WALK_TOL {
        warn!("Записанное распределение не нормировано: сумма {:e}", probs.sum());
    }
    Ok(())
}

/// Ненулевые амплитуды: `x coin re im` (1D) или `x y j k re im` (2D)
pub fn write_wave<W: Write>(out: &mut W, state: &WalkState) -> Result<()> {
    let lattice = state.lattice();
    let n = lattice.axis_len();
    let coins = lattice.coins();
    for (offset, a) in state.as_slice().iter().enumerate() {
        if a.norm_sqr() == 0.0 {
            continue;
        }
        let (site, coin) = (offset / coins, offset % coins);
        if lattice.dims() == 1 {
            writeln!(out, "{}\t{}\t{}\t{}", lattice.coordinate(site), coin, sci(a.re), sci(a.im))?;
        } else {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                lattice.coordinate(site / n),
                lattice.coordinate(site % n),
                coin / 2,
                coin % 2,
                sci(a.re),
                sci(a.im)
            )?;
        }
    }
    Ok(())
}

pub fn write_statistics<W: Write>(out: &mut W, records: &[StatisticsRecord]) -> Result<()> {
    writeln!(out, "#Iter\tMean X\t\tMean Y\t\tVariance\tStd deviation\tTVD\tTVD (unif)")?;
    writeln!(out)?;
    for r in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.iteration,
            sci(r.mean_x),
            sci(r.mean_y),
            sci(r.variance),
            sci(r.std_deviation()),
            sci(r.tvd),
            sci(r.tvd_uniform)
        )?;
    }
    Ok(())
}

pub fn write_screen<W: Write>(out: &mut W, screen: &ObservationScreen) -> Result<()> {
    writeln!(out, "#Index\tX\tY\tIntensity")?;
    for (index, x, y, value) in screen.rows() {
        writeln!(out, "{}\t{}\t{}\t{}", index, x, y, sci(value))?;
    }
    Ok(())
}

/// Записывает все файлы прогона и возвращает их пути
pub fn write_report(
    files: &OutputFiles,
    options: &WalkOptions,
    report: &SimulationReport,
    json: bool,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let path = files.data();
    let mut out = create(&path)?;
    write_header(&mut out, options, report.seed)?;
    write_probabilities(&mut out, &report.lattice, &report.average)?;
    out.flush()?;
    written.push(path);

    let path = files.wave();
    let mut out = create(&path)?;
    write_header(&mut out, options, report.seed)?;
    write_wave(&mut out, &report.last_state)?;
    out.flush()?;
    written.push(path);

    let path = files.statistics();
    let mut out = create(&path)?;
    write_statistics(&mut out, &report.statistics)?;
    out.flush()?;
    written.push(path);

    if let Some(stationary) = &report.stationary {
        let path = files.stationary();
        let mut out = create(&path)?;
        write_header(&mut out, options, report.seed)?;
        write_probabilities(&mut out, &report.lattice, stationary)?;
        out.flush()?;
        written.push(path);
    }

    if let Some(screen) = &report.screen {
        let path = files.screen();
        let mut out = create(&path)?;
        write_screen(&mut out, screen)?;
        out.flush()?;
        written.push(path);
    }

    if json {
        let path = files.report();
        let mut out = create(&path)?;
        serde_json::to_writer_pretty(&mut out, report)?;
        out.flush()?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Topology;
    use crate::screen::ScreenSpec;
    use crate::state::StateKind;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_file_names() {
        let files = OutputFiles::new(Path::new("runs/hadamard.in"), None);
        assert_eq!(files.data(), PathBuf::from("runs/hadamard.dat"));
        assert_eq!(files.wave(), PathBuf::from("runs/hadamard-wave.dat"));
        assert_eq!(files.stationary(), PathBuf::from("runs/hadamard-pb.dat"));
        assert_eq!(files.statistics(), PathBuf::from("runs/hadamard.sta"));
        assert_eq!(files.screen(), PathBuf::from("runs/hadamard-screen.dat"));
        assert_eq!(files.plot(""), PathBuf::from("runs/hadamard.svg"));

        let files = OutputFiles::new(Path::new("runs/hadamard.in"), Some(Path::new("out")));
        assert_eq!(files.plot("var"), PathBuf::from("out/hadamard-var.svg"));
    }

    #[test]
    fn test_sci_matches_printf() {
        assert_eq!(sci(1.5), "1.500000e+00");
        assert_eq!(sci(0.000123), "1.230000e-04");
        assert_eq!(sci(0.0), "0.000000e+00");
        assert_eq!(sci(-2.5e12), "-2.500000e+12");
    }

    #[test]
    fn test_probabilities_1d() {
        let lattice = Lattice::new(Topology::Line, 2, 1).unwrap();
        let state = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        let mut out = Vec::new();
        write_probabilities(&mut out, &lattice, &state.probabilities().unwrap()).unwrap();
        assert_eq!(text(out), "0\t1.000000e+00\n");
    }

    #[test]
    fn test_probabilities_2d_blank_lines() {
        let lattice = Lattice::new(Topology::Torus, 3, 0).unwrap();
        let mut probs = Grid::zeros(&lattice.site_shape()).unwrap();
        *probs.get_mut(&[0, 1]).unwrap() = 0.5;
        *probs.get_mut(&[0, 2]).unwrap() = 0.25;
        *probs.get_mut(&[2, 0]).unwrap() = 0.25;
        let mut out = Vec::new();
        write_probabilities(&mut out, &lattice, &probs).unwrap();
        let text = text(out);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["0\t1\t5.000000e-01", "0\t2\t2.500000e-01", "", "2\t0\t2.500000e-01", ""]
        );
    }

    #[test]
    fn test_wave_lists_nonzero_amplitudes() {
        let lattice = Lattice::new(Topology::Line, 1, 1).unwrap();
        let state = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        let mut out = Vec::new();
        write_wave(&mut out, &state).unwrap();
        let text = text(out);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0\t0\t7.071068e-01"));
        assert!(lines[1].starts_with("0\t1\t0.000000e+00\t7.071068e-01"));
    }

    #[test]
    fn test_statistics_and_screen() {
        let record = StatisticsRecord {
            iteration: 3,
            mean_x: 0.0,
            mean_y: 0.0,
            variance: 4.0,
            tvd: 0.5,
            tvd_uniform: 1.0,
        };
        let mut out = Vec::new();
        write_statistics(&mut out, &[record]).unwrap();
        let written = text(out);
        assert!(written.starts_with("#Iter\tMean X\t\tMean Y\t\tVariance"));
        assert!(written.ends_with("3\t0.000000e+00\t0.000000e+00\t4.000000e+00\t2.000000e+00\t5.000000e-01\t1.000000e+00\n"));

        let lattice = Lattice::new(Topology::Natural, 2, 1).unwrap();
        let state = WalkState::initial(lattice, StateKind::Hadamard, None).unwrap();
        let mut screen = ObservationScreen::new(&lattice, ScreenSpec { from: (-1, 0), to: (1, 0) }).unwrap();
        screen.update(&state);
        let mut out = Vec::new();
        write_screen(&mut out, &screen).unwrap();
        assert_eq!(text(out), "#Index\tX\tY\tIntensity\n1\t0\t0\t1.000000e+00\n");
    }

    #[test]
    fn test_header_describes_run() {
        let mut options = WalkOptions::defaults(2);
        options.max = 11;
        options.steps = 10;
        options.mixing_steps = 50;
        let mut out = Vec::new();
        write_header(&mut out, &options, 42).unwrap();
        let text = text(out);
        assert!(text.lines().all(|l| l.is_empty() || l.starts_with('#')));
        assert!(text.contains("#  Random seed: 42"));
        assert!(text.contains("-11..11 in X axis"));
        assert!(text.contains("stationary distribution: 50"));
    }
}
