//! 光流测速与航位推算
//!
//! Ground speed of a UAV from downward-looking video, integrated with the
//! logged heading into a position anchored at the first GPS fix.
//!
//! nalgebra
//! https://docs.rs/nalgebra/latest/nalgebra/
//!
//! ndarray
//! https://docs.rs/ndarray/latest/ndarray/all.html
pub mod camera;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod dead_reckoning; // 航位推算
pub mod error;
pub mod filter;
pub mod frame;
pub mod geodesy;
pub mod global_types;
pub mod optical_flow; // 光流
pub mod session;
pub mod sync;
pub mod terrain;

pub use error::{NavError, Result};
