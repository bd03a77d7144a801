//! Uniform-cell spatial index for radius-bounded neighbor queries.
//!
//! The grid covers a fixed axis-aligned box with cells whose edge length
//! equals the kernel support radius. `lookup` only ever visits the block of
//! cells touching [pos - r, pos + r], so a query radius larger than the cell
//! size would silently miss neighbors; every solver query passes the same
//! radius the grid was initialized with.
//!
//! Rebuilding produces a canonical permutation of particle indices (counting
//! sort by cell id). The caller applies that one permutation to every
//! co-indexed attribute array, which keeps the arrays synchronized by
//! construction. The grid itself never touches particle data.

use glam::{IVec3, Vec3};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An empty box that any `expand` call will overwrite.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Smallest box containing all points. Panics on an empty slice.
    pub fn from_points(points: &[Vec3]) -> Self {
        assert!(!points.is_empty(), "cannot bound an empty point set");
        let mut bounds = Self::empty();
        for &p in points {
            bounds.expand(p);
        }
        bounds
    }

    /// Grow the box to contain `p`.
    pub fn expand(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Per-axis size.
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Uniform spatial grid over one particle set.
///
/// After `update`, cell `c` owns the index range
/// `[cell_offsets[c], cell_offsets[c + 1])` of the reordered particle arrays.
pub struct SpatialGrid {
    bounds: Aabb,
    cell_size: f32,
    inv_cell_size: f32,
    /// Cells per axis, rounded up to a power of two for growth headroom.
    size: IVec3,
    /// Prefix-sum bucket boundaries, length numCells + 1.
    cell_offsets: Vec<u32>,
    /// Canonical permutation from the last `update`: slot k of the reordered
    /// arrays holds old index `order[k]`.
    order: Vec<u32>,
    /// Scratch: per-particle linear cell id.
    cell_ids: Vec<u32>,
    /// Scratch: per-cell write cursor during the gather.
    cursors: Vec<u32>,
}

impl SpatialGrid {
    /// Create a grid over `bounds` with the given cell size. The cell size
    /// must equal the radius used in all subsequent queries.
    pub fn new(bounds: Aabb, cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive, got {}", cell_size);
        let extents = bounds.extents();
        assert!(
            extents.min_element() >= 0.0 && extents.is_finite(),
            "grid bounds are degenerate: {:?}",
            bounds
        );
        let size = IVec3::new(
            next_power_of_two((extents.x / cell_size).floor() as u32 + 1),
            next_power_of_two((extents.y / cell_size).floor() as u32 + 1),
            next_power_of_two((extents.z / cell_size).floor() as u32 + 1),
        );
        let num_cells = (size.x * size.y * size.z) as usize;
        Self {
            bounds,
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            size,
            cell_offsets: vec![0; num_cells + 1],
            order: Vec::new(),
            cell_ids: Vec::new(),
            cursors: vec![0; num_cells],
        }
    }

    /// Cell coordinate of a position, clamped into the grid so that particles
    /// that drift outside the box before collision response still land in a
    /// border cell instead of indexing out of bounds.
    #[inline]
    fn cell_of(&self, pos: Vec3) -> IVec3 {
        let rel = (pos - self.bounds.min) * self.inv_cell_size;
        IVec3::new(
            (rel.x.floor() as i32).clamp(0, self.size.x - 1),
            (rel.y.floor() as i32).clamp(0, self.size.y - 1),
            (rel.z.floor() as i32).clamp(0, self.size.z - 1),
        )
    }

    #[inline]
    fn linear(&self, cell: IVec3) -> usize {
        (cell.z * self.size.x * self.size.y + cell.y * self.size.x + cell.x) as usize
    }

    /// Rebuild bucket offsets and the canonical permutation from current
    /// positions. Invalidates all previous particle indices; the caller must
    /// apply `order()` to every co-indexed array before the next query.
    pub fn update(&mut self, positions: &[Vec3]) {
        let n = positions.len();
        let num_cells = self.cursors.len();

        self.cell_ids.clear();
        for &p in positions {
            let c = self.linear(self.cell_of(p)) as u32;
            self.cell_ids.push(c);
        }

        self.cell_offsets.fill(0);
        for &c in &self.cell_ids {
            self.cell_offsets[c as usize + 1] += 1;
        }
        for c in 0..num_cells {
            self.cell_offsets[c + 1] += self.cell_offsets[c];
        }

        self.cursors.copy_from_slice(&self.cell_offsets[..num_cells]);
        self.order.resize(n, 0);
        for (i, &c) in self.cell_ids.iter().enumerate() {
            let cursor = &mut self.cursors[c as usize];
            self.order[*cursor as usize] = i as u32;
            *cursor += 1;
        }
    }

    /// Permutation computed by the last `update`. Slot `k` of the reordered
    /// arrays takes the element at old index `order()[k]`.
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Visit every particle index whose cell intersects the box
    /// [pos - radius, pos + radius], clipped to the grid. `visit` returns
    /// false to stop early.
    pub fn lookup<F: FnMut(usize) -> bool>(&self, pos: Vec3, radius: f32, mut visit: F) {
        debug_assert!(
            radius <= self.cell_size * (1.0 + 1e-5),
            "query radius {} exceeds cell size {}",
            radius,
            self.cell_size
        );
        let min = self.cell_of(pos - Vec3::splat(radius));
        let max = self.cell_of(pos + Vec3::splat(radius));
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    let c = self.linear(IVec3::new(x, y, z));
                    for j in self.cell_offsets[c]..self.cell_offsets[c + 1] {
                        if !visit(j as usize) {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Call `func(j, r, r2)` for every particle within `radius` of `p`,
    /// where `r = p - positions[j]`. Self pairs are not filtered; callers
    /// accumulating forces skip near-zero separations themselves.
    #[inline]
    pub fn query<F: FnMut(usize, Vec3, f32)>(
        &self,
        radius: f32,
        positions: &[Vec3],
        p: Vec3,
        mut func: F,
    ) {
        let r2_max = radius * radius;
        self.lookup(p, radius, |j| {
            let r = p - positions[j];
            let r2 = r.length_squared();
            if r2 < r2_max {
                func(j, r, r2);
            }
            true
        });
    }

    /// Like `query`, but walks the cell topology of the *last rebuild*
    /// (around `p_old`) while measuring separations against predicted
    /// positions (`p_new` vs `positions_new[j]`). Used only inside the
    /// pressure-correction loop, where rebuilding the grid every iteration
    /// would cost more than the bounded neighborhood error it avoids. No
    /// radius margin is added for the drift between the two position sets.
    #[inline]
    pub fn query_pair<F: FnMut(usize, Vec3, f32)>(
        &self,
        radius: f32,
        positions_new: &[Vec3],
        p_old: Vec3,
        p_new: Vec3,
        mut func: F,
    ) {
        let r2_max = radius * radius;
        self.lookup(p_old, radius, |j| {
            let r = p_new - positions_new[j];
            let r2 = r.length_squared();
            if r2 < r2_max {
                func(j, r, r2);
            }
            true
        });
    }

    /// True iff at least one particle lies within `radius` of `p`. Existence
    /// check only; there is no self exclusion.
    pub fn has_neighbor(&self, radius: f32, positions: &[Vec3], p: Vec3) -> bool {
        let r2_max = radius * radius;
        let mut found = false;
        self.lookup(p, radius, |j| {
            if (p - positions[j]).length_squared() < r2_max {
                found = true;
                return false;
            }
            true
        });
        found
    }
}

#[inline]
fn next_power_of_two(v: u32) -> i32 {
    v.next_power_of_two() as i32
}
