//! Particle attribute storage for the fluid and boundary sets.
//!
//! Attributes live in parallel arrays (one slot per particle) so the solver
//! passes can iterate a single attribute without touching the rest. Every
//! array of one particle class has the same length; `append` grows them in
//! lockstep and `apply_order` permutes the advected arrays through one shared
//! scratch buffer, so the arrays cannot drift out of sync.

use glam::Vec3;

/// Fluid particle attributes. Position/velocity are double-buffered: the
/// pressure loop predicts into `new_positions`/`new_velocities` while the
/// current buffers stay untouched, and integration swaps the buffers. The
/// `*_before_shock` buffers hold the rollback snapshot, one completed substep
/// in the past.
#[derive(Default)]
pub struct FluidParticles {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub new_positions: Vec<Vec3>,
    pub new_velocities: Vec<Vec3>,
    pub positions_before_shock: Vec<Vec3>,
    pub velocities_before_shock: Vec<Vec3>,
    pub densities: Vec<f32>,
    pub pressures: Vec<f32>,
    /// Non-pressure forces accumulated this substep (viscosity, surface
    /// tension, gravity).
    pub forces: Vec<Vec3>,
    pub pressure_forces: Vec<Vec3>,
    /// Curvature-weighted surface orientation vectors.
    pub normals: Vec<Vec3>,
    /// Gather buffer for `apply_order`.
    pub(crate) scratch: Vec<Vec3>,
}

impl FluidParticles {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Bulk-append particles at rest. All attribute arrays grow in lockstep.
    pub fn append(&mut self, positions: &[Vec3]) {
        self.positions.extend_from_slice(positions);
        let n = self.len();
        self.velocities.resize(n, Vec3::ZERO);
        self.new_positions.resize(n, Vec3::ZERO);
        self.new_velocities.resize(n, Vec3::ZERO);
        self.positions_before_shock.resize(n, Vec3::ZERO);
        self.velocities_before_shock.resize(n, Vec3::ZERO);
        self.densities.resize(n, 0.0);
        self.pressures.resize(n, 0.0);
        self.forces.resize(n, Vec3::ZERO);
        self.pressure_forces.resize(n, Vec3::ZERO);
        self.normals.resize(n, Vec3::ZERO);
    }

    /// Apply a grid permutation to the advected state. Slot `k` receives the
    /// element at old index `order[k]`.
    ///
    /// Only the current position/velocity buffers carry state across the grid
    /// rebuild; densities, normals and forces are recomputed from scratch
    /// each substep, and the prediction buffers are overwritten before they
    /// are read. The shock snapshot keeps its own ordering and is restored as
    /// a complete coherent state.
    pub fn apply_order(&mut self, order: &[u32]) {
        debug_assert_eq!(order.len(), self.len());
        permute(&mut self.positions, order, &mut self.scratch);
        permute(&mut self.velocities, order, &mut self.scratch);
    }
}

/// Static boundary particle attributes. Positions and normals are fixed for
/// the simulation's lifetime; masses are computed once from the local sample
/// packing; densities and active flags are refreshed every substep.
#[derive(Default)]
pub struct BoundaryParticles {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub masses: Vec<f32>,
    pub densities: Vec<f32>,
    /// True iff any fluid particle currently lies within kernel support.
    /// Inactive particles skip the per-substep density work.
    pub active: Vec<bool>,
    pub(crate) scratch: Vec<Vec3>,
}

impl BoundaryParticles {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Bulk-append boundary samples with their surface normals.
    pub fn append(&mut self, positions: &[Vec3], normals: &[Vec3]) {
        assert_eq!(
            positions.len(),
            normals.len(),
            "boundary positions and normals differ in length: {} vs {}",
            positions.len(),
            normals.len()
        );
        self.positions.extend_from_slice(positions);
        self.normals.extend_from_slice(normals);
        let n = self.len();
        self.masses.resize(n, 0.0);
        self.densities.resize(n, 0.0);
        self.active.resize(n, false);
    }

    /// Apply the boundary grid permutation (once, at construction).
    pub fn apply_order(&mut self, order: &[u32]) {
        debug_assert_eq!(order.len(), self.len());
        permute(&mut self.positions, order, &mut self.scratch);
        permute(&mut self.normals, order, &mut self.scratch);
    }
}

/// Triangle mesh describing a boundary solid. The solver never reads it; it
/// is stored so renderers can draw the geometry the boundary particles were
/// sampled from.
#[derive(Clone, Debug)]
pub struct BoundaryMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

fn permute(values: &mut Vec<Vec3>, order: &[u32], scratch: &mut Vec<Vec3>) {
    scratch.clear();
    scratch.extend(order.iter().map(|&i| values[i as usize]));
    std::mem::swap(values, scratch);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_arrays_in_lockstep() {
        let mut fluid = FluidParticles::default();
        fluid.append(&[Vec3::ZERO, Vec3::ONE]);
        fluid.append(&[Vec3::new(2.0, 0.0, 0.0)]);

        assert_eq!(fluid.len(), 3);
        assert_eq!(fluid.velocities.len(), 3);
        assert_eq!(fluid.densities.len(), 3);
        assert_eq!(fluid.pressure_forces.len(), 3);
        assert_eq!(fluid.normals.len(), 3);
        assert_eq!(fluid.positions_before_shock.len(), 3);
    }

    #[test]
    fn test_apply_order_permutes_position_and_velocity_together() {
        let mut fluid = FluidParticles::default();
        fluid.append(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ]);
        fluid.velocities[0] = Vec3::new(0.0, 1.0, 0.0);
        fluid.velocities[2] = Vec3::new(0.0, 3.0, 0.0);

        fluid.apply_order(&[2, 0, 1]);

        assert_eq!(fluid.positions[0], Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(fluid.velocities[0], Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(fluid.positions[1], Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(fluid.velocities[1], Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    #[should_panic(expected = "differ in length")]
    fn test_boundary_append_rejects_mismatched_normals() {
        let mut boundary = BoundaryParticles::default();
        boundary.append(&[Vec3::ZERO, Vec3::ONE], &[Vec3::Y]);
    }
}
