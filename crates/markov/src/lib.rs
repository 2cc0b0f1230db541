#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod checker;
mod dtmc;
mod dtmc_builder;
mod io_drn;
mod labelling;
mod property;
mod random_dtmc;
mod reachability;

pub use checker::*;
pub use dtmc::*;
pub use dtmc_builder::*;
pub use io_drn::*;
pub use labelling::*;
pub use property::*;
pub use random_dtmc::*;
pub use reachability::*;
