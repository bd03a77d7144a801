//! Per-substep diagnostics.

/// Snapshot of the solver's health after one adaptive substep, returned from
/// [`crate::PcisphSolver::step`]. Carries everything a caller needs to watch
/// convergence and stability without the solver keeping global mutable state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepDiagnostics {
    /// Pressure-correction iterations this substep ran.
    pub pressure_iterations: usize,
    pub fluid_particles: usize,
    pub boundary_particles: usize,
    /// Largest per-particle density error measured in the last pressure
    /// iteration.
    pub max_density_variance: f32,
    /// Mean per-particle density error from the last pressure iteration.
    pub avg_density_variance: f32,
    /// Largest pre-integration fluid velocity magnitude.
    pub max_velocity: f32,
    /// Largest total force magnitude at integration.
    pub max_force: f32,
    /// True when this substep detected a shock and rolled back to the
    /// snapshot state. Not an error; the solver already recovered.
    pub shock: bool,
    /// Timestep after adaptation (the value the next substep will use).
    pub time_step: f32,
    /// Simulation time after this substep.
    pub time: f32,
}
