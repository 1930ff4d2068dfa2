//! Симулятор дискретных квантовых блужданий на одномерных и двумерных решётках.

pub mod coin;
pub mod config;
pub mod error;
pub mod evolution;
pub mod grid;
pub mod lattice;
pub mod links;
pub mod measure;
pub mod output;
pub mod plot;
pub mod screen;
pub mod simulation;
pub mod state;
pub mod statistics;

pub use coin::{CoinKind, CoinOperator};
pub use config::WalkOptions;
pub use error::{Result, WalkError};
pub use evolution::{Evolution, StepBuffers};
pub use grid::Grid;
pub use lattice::{Lattice, ScanMode, Topology};
pub use links::{BreakProbabilities, LinkDefect, LinkState};
pub use simulation::{Simulation, SimulationReport};
pub use state::{StateKind, WalkState};

/// Допуск проверок нормы и симметрии
pub const WALK_TOL: f64 = 1e-4;
