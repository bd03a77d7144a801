//! Property-based tests for the spatial grid.
//!
//! The solver's density and force passes silently produce wrong physics if a
//! neighbor query ever misses a true neighbor, so the no-false-negative
//! property gets checked across random particle sets.

use glam::Vec3;
use pcisph::{Aabb, SpatialGrid};
use proptest::prelude::*;

const RADIUS: f32 = 0.15;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn query_never_misses_a_pair_within_radius(
        points in prop::collection::vec(
            (0.0f32..1.0, 0.0f32..1.0, 0.0f32..1.0),
            2..100,
        )
    ) {
        let positions: Vec<Vec3> = points
            .iter()
            .map(|&(x, y, z)| Vec3::new(x, y, z))
            .collect();

        let mut grid = SpatialGrid::new(
            Aabb { min: Vec3::ZERO, max: Vec3::ONE },
            RADIUS,
        );
        grid.update(&positions);
        let sorted: Vec<Vec3> = grid
            .order()
            .iter()
            .map(|&i| positions[i as usize])
            .collect();

        for (i, &p) in sorted.iter().enumerate() {
            let mut seen = vec![false; sorted.len()];
            grid.query(RADIUS, &sorted, p, |j, _r, _r2| {
                seen[j] = true;
            });
            for (j, &q) in sorted.iter().enumerate() {
                if (p - q).length_squared() < RADIUS * RADIUS {
                    prop_assert!(
                        seen[j],
                        "pair ({}, {}) at distance {} was not reported",
                        i,
                        j,
                        (p - q).length()
                    );
                }
            }
        }
    }

    #[test]
    fn permutation_is_a_bijection(
        points in prop::collection::vec(
            (0.0f32..1.0, 0.0f32..1.0, 0.0f32..1.0),
            1..100,
        )
    ) {
        let positions: Vec<Vec3> = points
            .iter()
            .map(|&(x, y, z)| Vec3::new(x, y, z))
            .collect();

        let mut grid = SpatialGrid::new(
            Aabb { min: Vec3::ZERO, max: Vec3::ONE },
            RADIUS,
        );
        grid.update(&positions);

        let mut hit = vec![false; positions.len()];
        for &i in grid.order() {
            prop_assert!(!hit[i as usize], "index {} appears twice", i);
            hit[i as usize] = true;
        }
        prop_assert!(hit.iter().all(|&h| h), "permutation dropped an index");
    }
}
