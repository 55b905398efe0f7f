//! Axis remapping between the rig convention and the JBeam/COLLADA convention
//!
//! Rigs use X=right, Y=forward, Z=up. The target uses X=right, Y=up,
//! Z=forward. The mapping `(x, y, z) -> (x, z, y)` is an orthonormal axis
//! permutation, so positions, normals, rotations and scales all go through
//! the same function and applying it twice is the identity.

use serde::{Deserialize, Serialize};

/// Which way coordinates flow out of the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateTransform {
    /// Swap Y and Z
    #[default]
    SourceToTarget,
    /// Leave values in the source convention
    Identity,
}

impl CoordinateTransform {
    pub fn apply<T: Copy>(self, v: [T; 3]) -> [T; 3] {
        match self {
            CoordinateTransform::SourceToTarget => swap_yz(v),
            CoordinateTransform::Identity => v,
        }
    }

    pub fn is_identity(self) -> bool {
        self == CoordinateTransform::Identity
    }

    /// The Y/Z swap is a reflection: triangle winding has to be reversed to
    /// keep faces pointing outwards
    pub fn flips_winding(self) -> bool {
        self == CoordinateTransform::SourceToTarget
    }

    /// COLLADA `up_axis` value describing the output of this transform
    pub fn up_axis(self) -> &'static str {
        match self {
            CoordinateTransform::SourceToTarget => "Y_UP",
            CoordinateTransform::Identity => "Z_UP",
        }
    }
}

#[inline]
pub fn swap_yz<T: Copy>([x, y, z]: [T; 3]) -> [T; 3] {
    [x, z, y]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_swaps_y_and_z() {
        let t = CoordinateTransform::SourceToTarget;
        assert_eq!(t.apply([1.0, 2.0, 3.0]), [1.0, 3.0, 2.0]);
        assert_eq!(CoordinateTransform::Identity.apply([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_swap_is_a_reflection() {
        // determinant of the permutation matrix
        let [a, b, c] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]].map(|v| CoordinateTransform::SourceToTarget.apply(v));
        let det = a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0]) + a[2] * (b[0] * c[1] - b[1] * c[0]);
        assert_eq!(det, -1.0);
        assert!(CoordinateTransform::SourceToTarget.flips_winding());
        assert!(!CoordinateTransform::Identity.flips_winding());
    }

    #[test]
    fn test_up_axis() {
        assert_eq!(CoordinateTransform::default().up_axis(), "Y_UP");
        assert_eq!(CoordinateTransform::Identity.up_axis(), "Z_UP");
    }

    proptest! {
        #[test]
        fn prop_transform_is_self_inverse(v in prop::array::uniform3(any::<f64>().prop_filter("finite", |x| x.is_finite()))) {
            let t = CoordinateTransform::SourceToTarget;
            let back = t.apply(t.apply(v));
            prop_assert_eq!(back[0].to_bits(), v[0].to_bits());
            prop_assert_eq!(back[1].to_bits(), v[1].to_bits());
            prop_assert_eq!(back[2].to_bits(), v[2].to_bits());
        }

        #[test]
        fn prop_f32_normals_survive_round_trip(v in prop::array::uniform3(-1.0f32..1.0f32)) {
            let t = CoordinateTransform::SourceToTarget;
            prop_assert_eq!(t.apply(t.apply(v)), v);
        }
    }
}
