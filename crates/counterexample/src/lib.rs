#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod choice_holes;
mod counterexample;
mod critical_holes;
mod io_holes;
mod quotient_bounds;
mod random_sketch;
mod resolved_chain;
mod shortcut;
mod waves;

pub use choice_holes::*;
pub use counterexample::*;
pub use critical_holes::*;
pub use io_holes::*;
pub use quotient_bounds::*;
pub use random_sketch::*;
pub use resolved_chain::*;
pub use shortcut::*;
pub use waves::*;
