//! Headless driver: evolves a two-deme population and renders every frame
//! through the headless backend.

pub mod config;
pub mod driver;
pub mod placement;
pub mod timing;

pub use config::{HostConfig, VegetationConfig};
pub use driver::{RunSummary, Simulation};
pub use timing::FrameTiming;
