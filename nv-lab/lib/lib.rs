#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Analysis and simulation tools for NV-center experiments: camera beam-waist
//! fitting, static field estimation from ODMR transitions, mechanically
//! dressed spin states, shaped-pulse two-level dynamics, and a three-axis
//! positioner session.

pub mod error;
pub mod utils;
pub mod config;
pub mod spin;
pub mod optim;
pub mod pulse;
pub mod rabi;
pub mod beam;
pub mod field;
pub mod dressed;
pub mod positioner;

pub use ndarray_npy as npy;
#[doc(hidden)]
pub use num_complex;
