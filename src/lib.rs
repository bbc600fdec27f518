// src/lib.rs

// Trapezoidal motion queue ("trapq") for a Klipper-style motion host.
// Upstream kinematics queue moves with `TrapQ::append`; step generation
// finalizes elapsed moves and pulls them back out of history.

pub mod configfile;
pub mod coord;
pub mod ffi; // C ABI wrappers around TrapQ
pub mod trapq;

pub use configfile::{ConfigError, Configfile};
pub use coord::{Coord, NUM_AXES};
pub use trapq::{Move, PullMove, TrapQ, TrapqConfig, TrapqError, NEVER_TIME};
