//! Predictive-corrective incompressible SPH solver.
//!
//! One adaptive substep runs a fixed pipeline:
//! 1. Rebuild the fluid spatial grid and permute fluid attributes
//! 2. Refresh boundary active flags
//! 3. Compute fluid and boundary densities (two-way coupled)
//! 4. Compute surface normals
//! 5. Initialize viscosity, surface tension and gravity forces
//! 6. Predictive-corrective pressure loop until the density error converges
//! 7. Integrate and swap position/velocity buffers
//! 8. Resolve boundary-box collisions
//! 9. Adapt the timestep
//! 10. Detect shocks, rolling back to the snapshot state when one fires
//!
//! References:
//! [1] Solenthaler, Pajarola 2009 "Predictive-Corrective Incompressible SPH"
//! [2] Akinci et al. 2012 "Versatile Rigid-Fluid Coupling for Incompressible SPH"
//! [3] Akinci et al. 2013 "Versatile Surface Tension and Adhesion for SPH Fluids"

mod density;
mod forces;
mod pressure;

use glam::Vec3;
use log::{debug, trace};
use rayon::prelude::*;

use crate::constants::{
    COLLISION_RESTITUTION, PRESSURE_ITERATION_CAP, MIN_PRESSURE_ITERATIONS, RELAX_ITERATION_CAP,
    TIME_STEP_GROWTH, TIME_STEP_SHRINK,
};
use crate::diagnostics::StepDiagnostics;
use crate::grid::{Aabb, SpatialGrid};
use crate::kernels::Kernel;
use crate::params::{KernelParams, ParticleParams, SimulationParams};
use crate::particle::{BoundaryMesh, BoundaryParticles, FluidParticles};

/// PCISPH fluid solver. Owns all particle state and both spatial grids.
///
/// Lifecycle: construct with [`PcisphSolver::new`], bulk-load particles with
/// the `add_*` methods, then call [`PcisphSolver::init`] once. After that,
/// [`PcisphSolver::update`] / [`PcisphSolver::step`] advance the simulation;
/// particle counts are fixed for the solver's lifetime.
pub struct PcisphSolver {
    params: SimulationParams,
    particle: ParticleParams,
    support: KernelParams,
    kernel: Kernel,

    fluid: FluidParticles,
    boundary: BoundaryParticles,
    boundary_meshes: Vec<BoundaryMesh>,

    fluid_grid: SpatialGrid,
    boundary_grid: SpatialGrid,
    /// World box spanned by the boundary particles; collision response keeps
    /// every fluid particle inside it.
    bounds: Aabb,

    initialized: bool,

    // Dynamic per-substep state. The timestep only changes between substeps,
    // through adaptation or shock rollback.
    time: f32,
    time_step: f32,
    time_before_shock: f32,
    density_variance_scale: f32,
    max_density_variance: f32,
    avg_density_variance: f32,
    prev_max_density_variance: f32,
    max_velocity: f32,
    max_force: f32,
    max_density_variance_threshold: f32,
    avg_density_variance_threshold: f32,
}

impl PcisphSolver {
    /// Create an empty solver from configuration. Derived constants (particle
    /// mass, kernel support, kernel coefficients, density-variance
    /// thresholds) are fixed here and never change afterwards.
    pub fn new(params: SimulationParams) -> Self {
        let particle = ParticleParams::new(params.particle_radius, params.rest_density);
        let support = KernelParams::new(&particle);
        let kernel = Kernel::new(support.radius);

        let avg_threshold = params.compression_threshold * params.rest_density;

        // Real grids are built in init() once the boundary box is known.
        let placeholder = Aabb {
            min: Vec3::ZERO,
            max: Vec3::splat(support.radius),
        };

        Self {
            params,
            particle,
            support,
            kernel,
            fluid: FluidParticles::default(),
            boundary: BoundaryParticles::default(),
            boundary_meshes: Vec::new(),
            fluid_grid: SpatialGrid::new(placeholder, support.radius),
            boundary_grid: SpatialGrid::new(placeholder, support.radius),
            bounds: placeholder,
            initialized: false,
            time: 0.0,
            time_step: params.time_step,
            time_before_shock: 0.0,
            density_variance_scale: 0.0,
            max_density_variance: 0.0,
            avg_density_variance: 0.0,
            prev_max_density_variance: 0.0,
            max_velocity: 0.0,
            max_force: 0.0,
            max_density_variance_threshold: 10.0 * avg_threshold,
            avg_density_variance_threshold: avg_threshold,
        }
    }

    /// Bulk-append fluid particles (construction phase only).
    pub fn add_fluid_particles(&mut self, positions: &[Vec3]) {
        assert!(!self.initialized, "particles must be added before init()");
        self.fluid.append(positions);
    }

    /// Bulk-append boundary particles with surface normals (construction
    /// phase only).
    pub fn add_boundary_particles(&mut self, positions: &[Vec3], normals: &[Vec3]) {
        assert!(!self.initialized, "particles must be added before init()");
        self.boundary.append(positions, normals);
    }

    /// Store a boundary mesh for external rendering. The solver never reads
    /// it.
    pub fn add_boundary_mesh(&mut self, mesh: BoundaryMesh) {
        self.boundary_meshes.push(mesh);
    }

    /// Finalize construction: compute the world box, build both grids, give
    /// boundary particles their masses, and relax the initial particle
    /// distribution. Fails fast on malformed input; there is no meaningful
    /// partially constructed solver.
    pub fn init(&mut self) {
        assert!(!self.initialized, "init() may only run once");
        assert!(
            !self.boundary.is_empty(),
            "no boundary particles; the simulation domain would be unbounded"
        );
        assert!(!self.fluid.is_empty(), "no fluid particles to simulate");
        assert!(
            self.fluid.positions.iter().all(|p| p.is_finite()),
            "fluid positions contain non-finite values"
        );
        assert!(
            self.boundary.positions.iter().all(|p| p.is_finite())
                && self.boundary.normals.iter().all(|n| n.is_finite()),
            "boundary samples contain non-finite values"
        );

        self.bounds = Aabb::from_points(&self.boundary.positions);
        self.fluid_grid = SpatialGrid::new(self.bounds, self.support.radius);
        self.boundary_grid = SpatialGrid::new(self.bounds, self.support.radius);

        // Boundary particles never move; their grid is built exactly once.
        self.boundary_grid.update(&self.boundary.positions);
        self.boundary.apply_order(self.boundary_grid.order());
        self.update_boundary_masses();

        self.initialized = true;

        self.rebuild_fluid_grid();
        self.update_densities();
        if let (Some(min), Some(max)) = (
            self.fluid.densities.iter().copied().reduce(f32::min),
            self.fluid.densities.iter().copied().reduce(f32::max),
        ) {
            debug!(
                "initial fluid density range: {:.1} .. {:.1} (rest {})",
                min, max, self.params.rest_density
            );
        }

        self.fluid
            .positions_before_shock
            .copy_from_slice(&self.fluid.positions);
        self.fluid
            .velocities_before_shock
            .copy_from_slice(&self.fluid.velocities);

        // Relax the initial distribution with the large iteration cap, then
        // reset velocities and clocks so the scene starts at rest.
        self.substep(RELAX_ITERATION_CAP);
        for v in &mut self.fluid.velocities {
            *v = Vec3::ZERO;
        }
        self.time = 0.0;
        self.time_before_shock = 0.0;
    }

    /// Advance the simulation by `dt`, running adaptive substeps until the
    /// internal clock reaches the target time.
    pub fn update(&mut self, dt: f32) {
        let target = self.time + dt;
        while self.time < target {
            self.step();
        }
    }

    /// Run one adaptive substep and report its diagnostics.
    pub fn step(&mut self) -> StepDiagnostics {
        assert!(self.initialized, "init() must run before stepping");
        self.substep(PRESSURE_ITERATION_CAP)
    }

    fn substep(&mut self, max_iterations: usize) -> StepDiagnostics {
        self.rebuild_fluid_grid();
        self.activate_boundary_particles();
        self.update_densities();
        self.update_normals();
        self.init_forces();

        let mut iterations = 0;
        while iterations < max_iterations {
            self.predict_velocity_and_position();
            self.update_density_variance_scale();
            self.update_pressures();
            self.update_pressure_forces();
            iterations += 1;
            if iterations >= MIN_PRESSURE_ITERATIONS
                && self.max_density_variance < self.max_density_variance_threshold
            {
                break;
            }
        }

        self.integrate();
        self.enforce_bounds();

        let measured_max_velocity = self.max_velocity;
        let measured_max_force = self.max_force;

        // Guard the stability quotients below against division by zero.
        self.max_velocity = self.max_velocity.max(1e-8);
        self.max_force = self.max_force.max(1e-8);

        self.adjust_time_step();
        let shock = self.detect_shock();

        // Refresh the snapshot: after the integration swap, the "new" buffers
        // hold the state this substep started from. Record it together with
        // the pre-advance clock, then advance time.
        self.time_before_shock = self.time;
        std::mem::swap(
            &mut self.fluid.new_positions,
            &mut self.fluid.positions_before_shock,
        );
        std::mem::swap(
            &mut self.fluid.new_velocities,
            &mut self.fluid.velocities_before_shock,
        );
        self.time += self.time_step;

        StepDiagnostics {
            pressure_iterations: iterations,
            fluid_particles: self.fluid.len(),
            boundary_particles: self.boundary.len(),
            max_density_variance: self.max_density_variance,
            avg_density_variance: self.avg_density_variance,
            max_velocity: measured_max_velocity,
            max_force: measured_max_force,
            shock,
            time_step: self.time_step,
            time: self.time,
        }
    }

    fn rebuild_fluid_grid(&mut self) {
        self.fluid_grid.update(&self.fluid.positions);
        self.fluid.apply_order(self.fluid_grid.order());
    }

    /// Final integration from total force, tracking the velocity and force
    /// maxima the timestep and shock policies feed on, then buffer swap.
    fn integrate(&mut self) {
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

        let (max_force_sq, max_velocity_sq) = new_velocities
            .par_iter_mut()
            .zip(new_positions.par_iter_mut())
            .enumerate()
            .fold(
                || (0.0f32, 0.0f32),
                |(max_f, max_v), (i, (v_new, p_new))| {
                    let force = forces[i] + pressure_forces[i];
                    *v_new = velocities[i] + inv_mass * force * dt;
                    *p_new = positions[i] + *v_new * dt;
                    (
                        max_f.max(force.length_squared()),
                        max_v.max(velocities[i].length_squared()),
                    )
                },
            )
            .reduce(|| (0.0, 0.0), |a, b| (a.0.max(b.0), a.1.max(b.1)));

        self.max_force = max_force_sq.sqrt();
        self.max_velocity = max_velocity_sq.sqrt();

        std::mem::swap(&mut self.fluid.positions, &mut self.fluid.new_positions);
        std::mem::swap(&mut self.fluid.velocities, &mut self.fluid.new_velocities);
    }

    /// Push escaped particles back inside the boundary box. Each axis is
    /// handled independently: the particle moves back by the penetration
    /// depth along the face normal and loses the inward velocity component,
    /// scaled by the restitution coefficient. Multiple face violations apply
    /// additively.
    fn enforce_bounds(&mut self) {
        let bounds = self.bounds;
        let FluidParticles {
            positions,
            velocities,
            ..
        } = &mut self.fluid;

        positions
            .par_iter_mut()
            .zip(velocities.par_iter_mut())
            .for_each(|(p, v)| {
                if p.x < bounds.min.x {
                    bounce(p, v, Vec3::X, bounds.min.x - p.x);
                }
                if p.x > bounds.max.x {
                    bounce(p, v, Vec3::NEG_X, p.x - bounds.max.x);
                }
                if p.y < bounds.min.y {
                    bounce(p, v, Vec3::Y, bounds.min.y - p.y);
                }
                if p.y > bounds.max.y {
                    bounce(p, v, Vec3::NEG_Y, p.y - bounds.max.y);
                }
                if p.z < bounds.min.z {
                    bounce(p, v, Vec3::Z, bounds.min.z - p.z);
                }
                if p.z > bounds.max.z {
                    bounce(p, v, Vec3::NEG_Z, p.z - bounds.max.z);
                }
            });
    }

    /// Grow the timestep only when the force, velocity and density margins
    /// all hold with headroom; shrink it when any margin is violated. The
    /// margins and factors are tuned values.
    fn adjust_time_step(&mut self) {
        let kr = self.support.radius;
        let avg_threshold = self.avg_density_variance_threshold;
        let before = self.time_step;

        if 0.19 * (kr / self.max_force).sqrt() > self.time_step
            && self.max_density_variance < 4.5 * avg_threshold
            && self.avg_density_variance < 0.9 * avg_threshold
            && 0.39 * kr / self.max_velocity > self.time_step
        {
            self.time_step *= TIME_STEP_GROWTH;
        }
        if 0.2 * (kr / self.max_force).sqrt() < self.time_step
            || self.max_density_variance > 5.5 * avg_threshold
            || self.avg_density_variance >= avg_threshold
            || 0.4 * kr / self.max_velocity <= self.time_step
        {
            self.time_step *= TIME_STEP_SHRINK;
        }

        if self.time_step != before {
            trace!("timestep adapted {} -> {}", before, self.time_step);
        }
    }

    /// Shock test: density variance growing faster than a full threshold in
    /// one substep, exceeding the absolute threshold, or the velocity-derived
    /// stability bound falling under the current timestep. On shock, clamp
    /// the timestep to the tighter of the force/velocity bounds and roll
    /// position, velocity and time back to the snapshot.
    fn detect_shock(&mut self) -> bool {
        let threshold = self.max_density_variance_threshold;
        let growth = self.max_density_variance - self.prev_max_density_variance > threshold;
        let absolute = self.max_density_variance > threshold;
        let velocity_bound = 0.45 * self.support.radius / self.max_velocity < self.time_step;

        if growth || absolute || velocity_bound {
            self.time_step = (0.2 * (self.support.radius / self.max_force).sqrt())
                .min(0.25 * self.support.radius / self.max_velocity);
            self.time = self.time_before_shock;
            self.fluid
                .positions
                .copy_from_slice(&self.fluid.positions_before_shock);
            self.fluid
                .velocities
                .copy_from_slice(&self.fluid.velocities_before_shock);
            debug!(
                "shock rollback at t={} (growth={}, absolute={}, velocity={}), timestep now {}",
                self.time, growth, absolute, velocity_bound, self.time_step
            );
            true
        } else {
            self.prev_max_density_variance = self.max_density_variance;
            false
        }
    }

    // --- Accessors -------------------------------------------------------

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Derived per-particle constants (radius, diameter, mass).
    pub fn particle_params(&self) -> ParticleParams {
        self.particle
    }

    /// Kernel support parameters (radius, expected neighbor capacity).
    pub fn kernel_params(&self) -> KernelParams {
        self.support
    }

    pub fn fluid_positions(&self) -> &[Vec3] {
        &self.fluid.positions
    }

    /// Mutable fluid velocities, for externally imposed velocity fields.
    pub fn fluid_velocities_mut(&mut self) -> &mut [Vec3] {
        &mut self.fluid.velocities
    }

    pub fn fluid_velocities(&self) -> &[Vec3] {
        &self.fluid.velocities
    }

    pub fn fluid_densities(&self) -> &[f32] {
        &self.fluid.densities
    }

    pub fn boundary_positions(&self) -> &[Vec3] {
        &self.boundary.positions
    }

    pub fn boundary_normals(&self) -> &[Vec3] {
        &self.boundary.normals
    }

    pub fn boundary_meshes(&self) -> &[BoundaryMesh] {
        &self.boundary_meshes
    }

    /// World bounding box spanned by the boundary particles.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Current adaptive timestep.
    pub fn time_step(&self) -> f32 {
        self.time_step
    }
}

#[inline]
fn bounce(p: &mut Vec3, v: &mut Vec3, normal: Vec3, depth: f32) {
    *p += normal * depth;
    *v -= (1.0 + COLLISION_RESTITUTION) * v.dot(normal) * normal;
}
