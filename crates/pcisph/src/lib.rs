//! Predictive-Corrective Incompressible SPH (PCISPH) fluid solver.
//!
//! A CPU, rayon-parallel implementation of the PCISPH method: fluid particles
//! advance under gravity, viscosity and surface tension while an iterative
//! pressure-correction loop keeps the fluid incompressible, coupled to static
//! boundary particles that represent solid geometry. The solver adapts its
//! timestep every substep and recovers from numerical shocks by rolling back
//! to a snapshot one substep in the past.
//!
//! This crate is framework-agnostic and handles simulation only. Scene
//! parsing, particle generation from geometry, meshing and rendering are the
//! callers' business; they feed bulk particle data in at construction and
//! read positions back per frame.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use pcisph::{PcisphSolver, SimulationParams};
//!
//! let mut solver = PcisphSolver::new(SimulationParams {
//!     particle_radius: 0.025,
//!     ..SimulationParams::default()
//! });
//!
//! // Sample the walls of a unit box as boundary particles.
//! let spacing = 0.05;
//! let mut positions = Vec::new();
//! let mut normals = Vec::new();
//! let steps = (1.0 / spacing) as i32 + 1;
//! for a in 0..steps {
//!     for b in 0..steps {
//!         let (u, v) = (a as f32 * spacing, b as f32 * spacing);
//!         for (p, n) in [
//!             (Vec3::new(u, v, 0.0), Vec3::Z),
//!             (Vec3::new(u, v, 1.0), Vec3::NEG_Z),
//!             (Vec3::new(u, 0.0, v), Vec3::Y),
//!             (Vec3::new(u, 1.0, v), Vec3::NEG_Y),
//!             (Vec3::new(0.0, u, v), Vec3::X),
//!             (Vec3::new(1.0, u, v), Vec3::NEG_X),
//!         ] {
//!             positions.push(p);
//!             normals.push(n);
//!         }
//!     }
//! }
//! solver.add_boundary_particles(&positions, &normals);
//!
//! // A small block of fluid above the floor.
//! let mut fluid = Vec::new();
//! for i in 0..4 {
//!     for j in 0..4 {
//!         for k in 0..4 {
//!             fluid.push(Vec3::new(
//!                 0.4 + i as f32 * 0.05,
//!                 0.5 + j as f32 * 0.05,
//!                 0.4 + k as f32 * 0.05,
//!             ));
//!         }
//!     }
//! }
//! solver.add_fluid_particles(&fluid);
//!
//! solver.init();
//! let diagnostics = solver.step();
//! assert!(!diagnostics.shock);
//! assert_eq!(solver.fluid_positions().len(), 64);
//! ```

pub mod constants;
pub mod diagnostics;
pub mod grid;
pub mod kernels;
pub mod params;
pub mod particle;
pub mod solver;

pub use diagnostics::StepDiagnostics;
pub use glam::Vec3;
pub use grid::{Aabb, SpatialGrid};
pub use kernels::Kernel;
pub use params::{KernelParams, ParticleParams, SimulationParams};
pub use particle::{BoundaryMesh, BoundaryParticles, FluidParticles};
pub use solver::PcisphSolver;
