//! Simulation configuration and derived per-particle/kernel parameters.

use glam::Vec3;
use std::f32::consts::PI;

use crate::constants::{
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_GRAVITY, DEFAULT_PARTICLE_RADIUS, DEFAULT_REST_DENSITY,
    DEFAULT_SURFACE_TENSION, DEFAULT_TIME_STEP, DEFAULT_VISCOSITY, KERNEL_SCALE,
    MASS_PACKING_CORRECTION,
};

/// User-facing solver configuration. Every field has a working default, so a
/// caller can override only what a scene needs.
#[derive(Clone, Copy, Debug)]
pub struct SimulationParams {
    /// Fluid particle radius in meters.
    pub particle_radius: f32,
    /// Incompressible reference density; density error is measured against it.
    pub rest_density: f32,
    /// Gravity acceleration applied to every fluid particle.
    pub gravity: Vec3,
    /// Surface tension scale (cohesion + curvature forces).
    pub surface_tension: f32,
    /// Viscosity scale.
    pub viscosity: f32,
    /// Initial timestep; adapted every substep afterwards.
    pub time_step: f32,
    /// Maximum allowed compression as a fraction of rest density. Drives the
    /// pressure-loop exit threshold and the shock detector.
    pub compression_threshold: f32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            particle_radius: DEFAULT_PARTICLE_RADIUS,
            rest_density: DEFAULT_REST_DENSITY,
            gravity: DEFAULT_GRAVITY,
            surface_tension: DEFAULT_SURFACE_TENSION,
            viscosity: DEFAULT_VISCOSITY,
            time_step: DEFAULT_TIME_STEP,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }
}

/// Physical parameters of a single fluid particle, derived once from the
/// configuration and immutable afterwards.
#[derive(Clone, Copy, Debug)]
pub struct ParticleParams {
    pub radius: f32,
    pub diameter: f32,
    pub mass: f32,
    pub mass_squared: f32,
    pub inv_mass: f32,
}

impl ParticleParams {
    pub fn new(radius: f32, rest_density: f32) -> Self {
        assert!(radius > 0.0, "particle radius must be positive, got {}", radius);
        assert!(
            rest_density > 0.0,
            "rest density must be positive, got {}",
            rest_density
        );
        let diameter = 2.0 * radius;
        let mass = rest_density * diameter.powi(3) / MASS_PACKING_CORRECTION;
        Self {
            radius,
            diameter,
            mass,
            mass_squared: mass * mass,
            inv_mass: 1.0 / mass,
        }
    }
}

/// Kernel support parameters derived from the particle radius.
#[derive(Clone, Copy, Debug)]
pub struct KernelParams {
    /// Support radius h; also the spatial grid cell size.
    pub radius: f32,
    pub radius_squared: f32,
    /// Expected number of particles inside one kernel support at rest
    /// packing. Consumers use it to size reconstruction buffers.
    pub capacity: usize,
}

impl KernelParams {
    pub fn new(particle: &ParticleParams) -> Self {
        let radius = KERNEL_SCALE * particle.radius;
        let capacity =
            ((4.0 / 3.0 * PI * radius.powi(3)) / particle.diameter.powi(3)).ceil() as usize;
        Self {
            radius,
            radius_squared: radius * radius,
            capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = SimulationParams::default();
        assert_eq!(params.particle_radius, 0.01);
        assert_eq!(params.rest_density, 1000.0);
        assert_eq!(params.gravity, Vec3::new(0.0, -9.8, 0.0));
        assert_eq!(params.time_step, 0.001);
    }

    #[test]
    fn test_particle_mass_formula() {
        let p = ParticleParams::new(0.01, 1000.0);
        // m = 1000 * 0.02^3 / 1.15
        let expected = 1000.0 * 0.02f32.powi(3) / 1.15;
        assert!((p.mass - expected).abs() < 1e-9, "mass = {}", p.mass);
        assert!((p.mass * p.inv_mass - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kernel_support_scale() {
        let p = ParticleParams::new(0.01, 1000.0);
        let k = KernelParams::new(&p);
        assert_eq!(k.radius, 0.04);
        assert!((k.radius_squared - 0.0016).abs() < 1e-9);
        // Sphere of radius 2d holds roughly 4/3*pi*8 = 33.5 diameter cubes.
        assert_eq!(k.capacity, 34);
    }

    #[test]
    #[should_panic(expected = "particle radius must be positive")]
    fn test_rejects_nonpositive_radius() {
        ParticleParams::new(0.0, 1000.0);
    }
}
