//! Solver constants and configuration defaults.
//!
//! All simulation modules use these constants instead of defining their own.
//! The tuning values (packing corrections, iteration counts, timestep and
//! shock margins) were calibrated experimentally; changing them shifts the
//! stability envelope of the whole solver, so they live in one place.

use glam::Vec3;

/// Default fluid particle radius in meters.
pub const DEFAULT_PARTICLE_RADIUS: f32 = 0.01;

/// Default rest density in kg/m^3 (water).
pub const DEFAULT_REST_DENSITY: f32 = 1000.0;

/// Default gravity vector in m/s^2.
pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, -9.8, 0.0);

/// Default surface tension coefficient.
pub const DEFAULT_SURFACE_TENSION: f32 = 1.0;

/// Default viscosity coefficient.
pub const DEFAULT_VISCOSITY: f32 = 0.0;

/// Default initial timestep in seconds. The solver adapts it every substep.
pub const DEFAULT_TIME_STEP: f32 = 0.001;

/// Default maximum allowed compression, as a fraction of rest density.
pub const DEFAULT_COMPRESSION_THRESHOLD: f32 = 0.02;

/// Kernel support radius as a multiple of the particle radius.
pub const KERNEL_SCALE: f32 = 4.0;

/// Packing correction for the fluid particle mass.
///
/// mass = restDensity * diameter^3 / MASS_PACKING_CORRECTION. A settled
/// particle arrangement is denser than a cubic lattice at diameter spacing.
pub const MASS_PACKING_CORRECTION: f32 = 1.15;

/// Packing correction for boundary particle masses (surface sampling).
pub const BOUNDARY_MASS_CORRECTION: f32 = 1.17;

/// Minimum number of predictive-corrective pressure iterations per substep.
pub const MIN_PRESSURE_ITERATIONS: usize = 3;

/// Pressure iteration cap for ordinary substeps.
pub const PRESSURE_ITERATION_CAP: usize = 100;

/// Pressure iteration cap for the one-time initial relaxation pass.
pub const RELAX_ITERATION_CAP: usize = 10000;

/// Velocity restitution applied when pushing particles back inside the
/// boundary box.
pub const COLLISION_RESTITUTION: f32 = 0.5;

/// Squared-distance threshold below which a particle pair is treated as a
/// self pair and skipped in force accumulation. Kernel gradients divide by
/// the separation distance and blow up at zero.
pub const SELF_PAIR_EPSILON: f32 = 1e-7;

/// Timestep growth factor when all stability margins hold comfortably.
pub const TIME_STEP_GROWTH: f32 = 1.002;

/// Timestep shrink factor when any stability margin is violated.
pub const TIME_STEP_SHRINK: f32 = 0.998;
