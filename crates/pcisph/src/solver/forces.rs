//! Non-pressure force initialization: viscosity, surface tension, gravity.

use glam::Vec3;
use rayon::prelude::*;

use crate::constants::SELF_PAIR_EPSILON;
use crate::particle::FluidParticles;

use super::PcisphSolver;

impl PcisphSolver {
    /// Accumulate the forces that stay fixed through the pressure loop:
    /// viscosity (relative-velocity weighted Laplacian), surface tension
    /// (cohesion plus curvature, each scaled by the density ratio
    /// K(i,j) = 2 rho0 / (rho_i + rho_j), following [3]) and gravity.
    /// Pressures and pressure forces reset to zero afterwards, as the
    /// correction loop in [1] requires.
    pub(super) fn init_forces(&mut self) {
        let fluid_grid = &self.fluid_grid;
        let kernel = &self.kernel;
        let radius = self.support.radius;
        let rest_density = self.params.rest_density;
        let gravity = self.params.gravity;
        let mass = self.particle.mass;
        let mass_squared = self.particle.mass_squared;
        let viscosity_scale = self.params.viscosity * mass_squared * kernel.viscosity_laplace_c;
        let cohesion_scale = -self.params.surface_tension * mass_squared * kernel.surface_tension_c;
        let curvature_scale = -self.params.surface_tension * mass;

        let FluidParticles {
            positions,
            velocities,
            densities,
            normals,
            forces,
            pressures,
            pressure_forces,
            ..
        } = &mut self.fluid;
        let positions = &*positions;
        let velocities = &*velocities;
        let densities = &*densities;
        let normals = &*normals;

        forces
            .par_iter_mut()
            .zip(pressures.par_iter_mut())
            .zip(pressure_forces.par_iter_mut())
            .enumerate()
            .for_each(|(i, ((force, pressure), pressure_force))| {
                let mut viscosity = Vec3::ZERO;
                let mut cohesion = Vec3::ZERO;
                let mut curvature = Vec3::ZERO;

                fluid_grid.query(radius, positions, positions[i], |j, r, r2| {
                    if r2 < SELF_PAIR_EPSILON {
                        return;
                    }
                    let rn = r2.sqrt();

                    viscosity -= (velocities[i] - velocities[j])
                        * (kernel.viscosity_laplace(rn) / densities[j]);

                    let k_ij = 2.0 * rest_density / (densities[i] + densities[j]);
                    cohesion += k_ij * (r / rn) * kernel.surface_tension(rn);
                    curvature += k_ij * (normals[i] - normals[j]);
                });

                viscosity *= viscosity_scale / densities[i];
                cohesion *= cohesion_scale;
                curvature *= curvature_scale;

                *force = cohesion + curvature + viscosity + mass * gravity;
                *pressure = 0.0;
                *pressure_force = Vec3::ZERO;
            });
    }
}
