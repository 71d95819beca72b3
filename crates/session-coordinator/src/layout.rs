//! Grid layout projection from roster size.
//!
//! | Remote participants | Grid |
//! |---------------------|------|
//! | 0 (local only), 1   | 1×1  |
//! | 2                   | 1×2  |
//! | 3–4                 | 2×2  |
//! | 5–6                 | 2×3  |
//! | 7–9                 | 3×3  |
//! | 10–12               | 3×4  |
//! | n > 12              | `ceil(n / ceil(sqrt n))` × `ceil(sqrt n)` |

use serde::Serialize;

/// Grid shape consumed by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LayoutDescriptor {
    pub rows: u32,
    pub columns: u32,
}

impl LayoutDescriptor {
    /// Number of tiles the grid can hold.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.rows as u64 * self.columns as u64
    }
}

impl Default for LayoutDescriptor {
    fn default() -> Self {
        project(0)
    }
}

/// Map a roster size to its grid shape. Total and deterministic.
#[must_use]
pub fn project(roster_size: usize) -> LayoutDescriptor {
    let (rows, columns) = match roster_size {
        0 | 1 => (1, 1),
        2 => (1, 2),
        3 | 4 => (2, 2),
        5 | 6 => (2, 3),
        7..=9 => (3, 3),
        10..=12 => (3, 4),
        n => near_square(n),
    };
    LayoutDescriptor { rows, columns }
}

fn near_square(n: usize) -> (u32, u32) {
    let n = u64::try_from(n).unwrap_or(u64::MAX);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let mut columns = ((n as f64).sqrt() as u64).max(1);
    // Correct float rounding in both directions
    while columns.saturating_mul(columns) < n {
        columns += 1;
    }
    while columns > 1 && (columns - 1).saturating_mul(columns - 1) >= n {
        columns -= 1;
    }
    let rows = n.div_ceil(columns);
    (
        u32::try_from(rows).unwrap_or(u32::MAX),
        u32::try_from(columns).unwrap_or(u32::MAX),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_banding_for_small_rosters() {
        let expected = [
            (0, 1, 1),
            (1, 1, 1),
            (2, 1, 2),
            (3, 2, 2),
            (4, 2, 2),
            (5, 2, 3),
            (6, 2, 3),
            (7, 3, 3),
        ];
        for (size, rows, columns) in expected {
            assert_eq!(
                project(size),
                LayoutDescriptor { rows, columns },
                "roster size {size}"
            );
        }
    }

    #[test]
    fn test_projection_is_deterministic() {
        for size in 0..=7 {
            assert_eq!(project(size), project(size));
        }
    }

    #[test]
    fn test_capacity_is_non_decreasing_and_sufficient() {
        let mut previous = 0;
        for size in 0..=200 {
            let capacity = project(size).capacity();
            assert!(capacity >= previous, "capacity shrank at size {size}");
            assert!(capacity >= size as u64, "size {size} does not fit");
            previous = capacity;
        }
    }

    #[test]
    fn test_large_rosters_stay_near_square() {
        assert_eq!(project(13), LayoutDescriptor { rows: 4, columns: 4 });
        assert_eq!(project(17), LayoutDescriptor { rows: 4, columns: 5 });
        assert_eq!(project(100), LayoutDescriptor { rows: 10, columns: 10 });
    }

    #[test]
    fn test_zero_is_single_tile() {
        assert_eq!(LayoutDescriptor::default(), LayoutDescriptor { rows: 1, columns: 1 });
    }
}
