//! GPU-resident incompressible fluid solver for an interactive cursor
//! background.
//!
//! The solver runs the classic stable-fluids scheme entirely on the GPU:
//! semi-Lagrangian advection, vorticity confinement, and a Jacobi pressure
//! projection over half-float field textures, with pointer movement injected
//! as Gaussian splats of velocity and dye. [`FluidEngine`] owns the whole
//! thing and exposes a small lifecycle plus event-sink API; the embedding
//! window loop calls [`FluidEngine::advance`] and [`FluidEngine::render`]
//! once per frame.

pub mod color;
pub mod config;
pub mod error;
pub mod gpu;
pub mod input;

mod engine;
mod pipeline;

pub use config::{ConfigOverrides, PassSet, SimulationConfig};
pub use engine::{CaptureImage, FluidEngine, MAX_DT};
pub use error::FluidError;
pub use gpu::{create_instance, CapabilityProfile, GpuContext};
pub use input::Splat;
