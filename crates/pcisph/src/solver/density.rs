//! Boundary activation, boundary masses, density and normal computation.

use glam::Vec3;
use rayon::prelude::*;

use crate::constants::BOUNDARY_MASS_CORRECTION;
use crate::particle::{BoundaryParticles, FluidParticles};

use super::PcisphSolver;

impl PcisphSolver {
    /// Mark the boundary particles that currently have at least one fluid
    /// particle within kernel support. Far boundary particles skip the
    /// per-substep density work.
    pub(super) fn activate_boundary_particles(&mut self) {
        let fluid_grid = &self.fluid_grid;
        let fluid_positions = &self.fluid.positions;
        let radius = self.support.radius;

        let BoundaryParticles {
            positions, active, ..
        } = &mut self.boundary;
        let positions = &*positions;

        active.par_iter_mut().enumerate().for_each(|(i, active)| {
            *active = fluid_grid.has_neighbor(radius, fluid_positions, positions[i]);
        });
    }

    /// Give every boundary particle a mass from its local sample packing,
    /// following [2] eq. 4-5: the denser the surface sampling around a
    /// particle, the smaller its share of the wall's volume.
    pub(super) fn update_boundary_masses(&mut self) {
        let grid = &self.boundary_grid;
        let kernel = &self.kernel;
        let radius = self.support.radius;
        let rest_density = self.params.rest_density;

        let BoundaryParticles {
            positions, masses, ..
        } = &mut self.boundary;
        let positions = &*positions;

        masses.par_iter_mut().enumerate().for_each(|(i, mass)| {
            let mut weight = 0.0;
            grid.query(radius, positions, positions[i], |_j, _r, r2| {
                weight += kernel.poly6(r2);
            });
            *mass = rest_density / (kernel.poly6_c * weight) / BOUNDARY_MASS_CORRECTION;
        });
    }

    /// Poly6-weighted density sums for boundary and fluid particles. Both
    /// sides see both particle sets, so fluid particles near a wall do not
    /// under-count their neighborhood.
    pub(super) fn update_densities(&mut self) {
        let fluid_grid = &self.fluid_grid;
        let boundary_grid = &self.boundary_grid;
        let kernel = &self.kernel;
        let radius = self.support.radius;
        let particle_mass = self.particle.mass;

        {
            let fluid_positions = &self.fluid.positions;
            let BoundaryParticles {
                positions,
                masses,
                densities,
                active,
                ..
            } = &mut self.boundary;
            let positions = &*positions;
            let masses = &*masses;
            let active = &*active;

            densities.par_iter_mut().enumerate().for_each(|(i, density)| {
                if !active[i] {
                    return;
                }
                let mut fluid_term = 0.0;
                fluid_grid.query(radius, fluid_positions, positions[i], |_j, _r, r2| {
                    fluid_term += kernel.poly6(r2);
                });
                let mut boundary_term = 0.0;
                boundary_grid.query(radius, positions, positions[i], |j, _r, r2| {
                    boundary_term += kernel.poly6(r2) * masses[j];
                });
                *density = kernel.poly6_c * (particle_mass * fluid_term + boundary_term);
            });
        }

        let boundary_positions = &self.boundary.positions;
        let boundary_masses = &self.boundary.masses;
        let FluidParticles {
            positions,
            densities,
            ..
        } = &mut self.fluid;
        let positions = &*positions;

        densities.par_iter_mut().enumerate().for_each(|(i, density)| {
            let mut fluid_term = 0.0;
            fluid_grid.query(radius, positions, positions[i], |_j, _r, r2| {
                fluid_term += kernel.poly6(r2);
            });
            let mut boundary_term = 0.0;
            boundary_grid.query(radius, boundary_positions, positions[i], |j, _r, r2| {
                boundary_term += kernel.poly6(r2) * boundary_masses[j];
            });
            *density = kernel.poly6_c * (particle_mass * fluid_term + boundary_term);
        });
    }

    /// Curvature-weighted surface normals, following [3]: the gradient sum is
    /// near zero deep inside the fluid and grows where the neighborhood is
    /// one-sided.
    pub(super) fn update_normals(&mut self) {
        let fluid_grid = &self.fluid_grid;
        let kernel = &self.kernel;
        let radius = self.support.radius;
        let scale = self.support.radius * self.particle.mass * kernel.poly6_grad_c;

        let FluidParticles {
            positions,
            densities,
            normals,
            ..
        } = &mut self.fluid;
        let positions = &*positions;
        let densities = &*densities;

        normals.par_iter_mut().enumerate().for_each(|(i, normal)| {
            let mut sum = Vec3::ZERO;
            fluid_grid.query(radius, positions, positions[i], |j, r, r2| {
                sum += kernel.poly6_grad(r, r2) / densities[j];
            });
            *normal = scale * sum;
        });
    }
}
