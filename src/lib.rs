//! Cellular fluid simulation on a character grid.
//!
//! Each cell is a wall (`#`), passable air, or a fluid species tagged
//! by its character. A tick applies gravity and pressure-driven
//! acceleration, redistributes velocity through bounded flow
//! propagation, and then moves fluid probabilistically between
//! neighboring cells. The pressure, velocity, and velocity-flow
//! scalars are configured independently at runtime from textual
//! selectors (`FLOAT`, `DOUBLE`, `FIXED(N,K)`, `FAST_FIXED(N,K)`).
//!
//! Runs are deterministic for a given grid, selector triple, and seed.
//! The full engine state can be written to and restored from a textual
//! checkpoint stream; with `--checkpoint N` the binary writes one next
//! to the input file every N ticks (0 disables this, and is the
//! default).

mod density;
mod dir_field;
mod error;
mod factory;
mod field;
mod fixed;
mod grid;
mod numeric;
mod selector;
mod sim;

pub use density::{parse_override, DensityTable, DEFAULT_DENSITY};
pub use dir_field::{delta_index, reverse, DirField2, DELTAS};
pub use error::SimError;
pub use factory::{build_simulator, Simulation};
pub use field::Field2;
pub use fixed::{FastFixed, Fixed};
pub use grid::Grid2;
pub use numeric::{cast, Num};
pub use selector::NumType;
pub use sim::{CheckpointConfig, Simulator, DEFAULT_SEED};
