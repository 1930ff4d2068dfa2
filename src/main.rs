use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};

use qwalk::config::{read_keyword_file, WalkOptions};
use qwalk::output::{write_report, OutputFiles};
use qwalk::plot::plot_report;
use qwalk::{Simulation, WalkError};

#[derive(Parser)]
#[command(name = "qwalk", version, about = "Дискретные квантовые блуждания на решётках")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Блуждание на прямой, кольце или отрезке
    Walk1d(RunArgs),
    /// Блуждание на двумерной решётке
    Walk2d(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Файл опций: ключевые слова BEGIN ... END или JSON (*.json)
    input: PathBuf,
    /// Каталог для файлов результатов
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    no_plots: bool,
    /// Физические предупреждения становятся ошибками
    #[arg(long)]
    strict: bool,
    /// Дополнительно сохранить полный отчёт в JSON
    #[arg(long)]
    json_report: bool,
}

fn load_options(path: &Path, dims: usize) -> Result<WalkOptions, WalkError> {
    let options = if path.extension().map_or(false, |ext| ext == "json") {
        WalkOptions::from_json_file(path)?
    } else {
        read_keyword_file(path, dims)?
    };
    if options.dims() != dims {
        return Err(WalkError::DimensionMismatch {
            expected: dims,
            found: options.dims(),
        });
    }
    Ok(options)
}

fn run(args: RunArgs, dims: usize) -> Result<(), WalkError> {
    let mut options = load_options(&args.input, dims)?;

    let env_seed: Option<u64> = env::var("QWALK_SEED").ok().and_then(|s| s.parse().ok());
    if let Some(seed) = args.seed.or(env_seed) {
        options.seed = Some(seed);
    }
    if args.strict {
        options.strict = true;
    }
    let output_dir = args
        .output_dir
        .or_else(|| env::var("QWALK_OUTPUT_DIR").ok().map(PathBuf::from));

    let simulation = Simulation::new(options)?;
    let report = simulation.run()?;

    let files = OutputFiles::new(&args.input, output_dir.as_deref());
    let written = write_report(&files, simulation.options(), &report, args.json_report)?;
    info!("Записано файлов: {}", written.len());
    if !args.no_plots {
        let plots = plot_report(&files, &report);
        info!("Построено графиков: {}", plots.len());
    }
    Ok(())
}

fn main() -> ExitCode {
    let env = Env::default().filter_or("RUST_LOG", "info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Walk1d(args) => run(args, 1),
        Command::Walk2d(args) => run(args, 2),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
