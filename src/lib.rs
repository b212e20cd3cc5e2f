//! Post-processing and linking core for APEX-MODFLOW projects: links APEX
//! subbasins to MODFLOW grid cells, puts simulation outputs on their dates
//! and scores them against observations.

pub mod config;
pub mod error;
pub mod grid;
pub mod io;
pub mod linking;
pub mod logging;
pub mod postprocess;
pub mod series;
pub mod stats;
