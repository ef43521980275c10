//! Per-lake time series extraction from satellite and climate image
//! collections.

pub mod assembler;
pub mod backend;
pub mod bbox;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod export;
pub mod geometry;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod reducer;
pub mod sat_bands;
