//! The predictive-corrective pressure loop passes.
//!
//! Each iteration predicts motion from the current total force, measures the
//! resulting density error against predicted positions, folds the error into
//! per-particle pressures through the density-variance scale factor, and
//! rebuilds the pressure forces. The loop in `solver::mod` repeats this until
//! the maximum density error converges.

use glam::Vec3;
use rayon::prelude::*;

use crate::constants::SELF_PAIR_EPSILON;
use crate::particle::FluidParticles;

use super::PcisphSolver;

impl PcisphSolver {
    /// Semi-implicit Euler prediction into the second buffer; the current
    /// buffers stay untouched so the loop can re-predict from the same state.
    pub(super) fn predict_velocity_and_position(&mut self) {
        let dt = self.time_step;
        let inv_mass = self.particle.inv_mass;

        let FluidParticles {
            positions,
            velocities,
            new_positions,
            new_velocities,
            forces,
            pressure_forces,
            ..
        } = &mut self.fluid;
        let positions = &*positions;
        let velocities = &*velocities;
        let forces = &*forces;
        let pressure_forces = &*pressure_forces;

        new_velocities
            .par_iter_mut()
            .zip(new_positions.par_iter_mut())
            .enumerate()
            .for_each(|(i, (v_new, p_new))| {
                let acceleration = inv_mass * (forces[i] + pressure_forces[i]);
                *v_new = velocities[i] + acceleration * dt;
                *p_new = positions[i] + *v_new * dt;
            });
    }

    /// Pressure response per unit of density error, from the analytic
    /// integral of the squared kernel gradient over a reference lattice of
    /// particles at diameter spacing inside the support radius ([1] eq. 8).
    /// Depends on the timestep, so it is refreshed every iteration.
    pub(super) fn update_density_variance_scale(&mut self) {
        let kernel = &self.kernel;
        let kernel_radius = self.support.radius;
        let kernel_radius_sq = self.support.radius_squared;
        let particle_radius = self.particle.radius;
        let spacing = 2.0 * particle_radius;
        let reach = kernel_radius + particle_radius;

        let mut grad_sum = Vec3::ZERO;
        let mut grad_dot_sum = 0.0f32;
        let mut x = -reach;
        while x <= reach {
            let mut y = -reach;
            while y <= reach {
                let mut z = -reach;
                while z <= reach {
                    let r = Vec3::new(x, y, z);
                    let r2 = r.length_squared();
                    if r2 < kernel_radius_sq {
                        let grad = kernel.poly6_grad_c * kernel.poly6_grad(r, r2);
                        grad_sum += grad;
                        grad_dot_sum += grad.dot(grad);
                    }
                    z += spacing;
                }
                y += spacing;
            }
            x += spacing;
        }

        let beta =
            2.0 * ((self.particle.mass * self.time_step) / self.params.rest_density).powi(2);
        self.density_variance_scale =
            -1.0 / (beta * (-grad_sum.dot(grad_sum) - grad_dot_sum));
    }

    /// Estimate predicted densities and fold the positive part of the error
    /// into pressures. Fluid neighborhoods come from the stale grid topology
    /// measured at predicted positions (`query_pair`); boundary contributions
    /// query the static boundary grid at the predicted position directly.
    /// Tracks the maximum and mean error across all particles through
    /// per-worker accumulators combined in a final max/sum fold.
    pub(super) fn update_pressures(&mut self) {
        let fluid_grid = &self.fluid_grid;
        let boundary_grid = &self.boundary_grid;
        let kernel = &self.kernel;
        let radius = self.support.radius;
        let mass = self.particle.mass;
        let rest_density = self.params.rest_density;
        let scale = self.density_variance_scale;

        let boundary_positions = &self.boundary.positions;
        let boundary_masses = &self.boundary.masses;
        let FluidParticles {
            positions,
            new_positions,
            pressures,
            ..
        } = &mut self.fluid;
        let positions = &*positions;
        let new_positions = &*new_positions;
        let count = positions.len();

        let (max_variation, variation_sum) = pressures
            .par_iter_mut()
            .enumerate()
            .fold(
                || (0.0f32, 0.0f32),
                |(max_local, sum_local), (i, pressure)| {
                    let mut fluid_term = 0.0;
                    fluid_grid.query_pair(
                        radius,
                        new_positions,
                        positions[i],
                        new_positions[i],
                        |_j, _r, r2| {
                            fluid_term += kernel.poly6(r2);
                        },
                    );
                    let mut density = kernel.poly6_c * mass * fluid_term;

                    let mut boundary_term = 0.0;
                    boundary_grid.query(
                        radius,
                        boundary_positions,
                        new_positions[i],
                        |j, _r, r2| {
                            boundary_term += kernel.poly6(r2) * boundary_masses[j];
                        },
                    );
                    density += kernel.poly6_c * boundary_term;

                    let variation = (density - rest_density).max(0.0);
                    *pressure += scale * variation;

                    (max_local.max(variation), sum_local + variation)
                },
            )
            .reduce(|| (0.0, 0.0), |a, b| (a.0.max(b.0), a.1 + b.1));

        self.max_density_variance = max_variation;
        self.avg_density_variance = variation_sum / count as f32;
    }

    /// Rebuild pressure forces from the updated pressures with the spiky
    /// gradient kernel. Fluid pairs are symmetrized; boundary coupling is
    /// one-sided, with the wall taking the fluid particle's own pressure.
    pub(super) fn update_pressure_forces(&mut self) {
        let fluid_grid = &self.fluid_grid;
        let boundary_grid = &self.boundary_grid;
        let kernel = &self.kernel;
        let radius = self.support.radius;
        let mass = self.particle.mass;
        let mass_squared = self.particle.mass_squared;

        let boundary_positions = &self.boundary.positions;
        let boundary_masses = &self.boundary.masses;
        let boundary_densities = &self.boundary.densities;
        let FluidParticles {
            positions,
            densities,
            pressures,
            pressure_forces,
            ..
        } = &mut self.fluid;
        let positions = &*positions;
        let densities = &*densities;
        let pressures = &*pressures;

        pressure_forces
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, pressure_force)| {
                let mut accum = Vec3::ZERO;

                fluid_grid.query(radius, positions, positions[i], |j, r, r2| {
                    if r2 < SELF_PAIR_EPSILON {
                        return;
                    }
                    let rn = r2.sqrt();
                    let density_i = densities[i];
                    let density_j = densities[j];
                    accum -= mass_squared
                        * (pressures[i] / (density_i * density_i)
                            + pressures[j] / (density_j * density_j))
                        * kernel.spiky_grad_c
                        * kernel.spiky_grad(r, rn);
                });

                boundary_grid.query(radius, boundary_positions, positions[i], |j, r, r2| {
                    if r2 < SELF_PAIR_EPSILON {
                        return;
                    }
                    let rn = r2.sqrt();
                    let density_i = densities[i];
                    let density_j = boundary_densities[j];
                    accum -= mass
                        * boundary_masses[j]
                        * (pressures[i] / (density_i * density_i)
                            + pressures[i] / (density_j * density_j))
                        * kernel.spiky_grad_c
                        * kernel.spiky_grad(r, rn);
                });

                *pressure_force = accum;
            });
    }
}
