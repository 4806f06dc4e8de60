// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Spatial transforms by coordinate remapping.
//!
//! A field is moved by substituting the inverse mapping for `x`, `y` and `z`:
//! to move a shape by `+v`, space is sampled at `p - v`.

use crate::error::{Error, Result};
use crate::tree::Tree;
use nalgebra::{Matrix4, Vector3};

pub fn translate(shape: &Tree, offset: &Vector3<f32>) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&(x - offset.x), &(y - offset.y), &(z - offset.z))
}

/// Apply an affine `matrix` (column-vector convention, translation in the
/// last column). Singular matrices are rejected.
pub fn transform(shape: &Tree, matrix: &Matrix4<f32>) -> Result<Tree> {
    let inv = matrix.try_inverse().ok_or_else(|| {
        Error::InvalidArgument("cannot transform by a singular matrix".into())
    })?;
    let (x, y, z) = Tree::axes(shape.kernel());
    let row = |r: usize| &x * inv[(r, 0)] + &y * inv[(r, 1)] + &z * inv[(r, 2)] + inv[(r, 3)];
    shape.remap(&row(0), &row(1), &row(2))
}

/// Scale about the origin. Zero factors are rejected.
pub fn scale(shape: &Tree, factors: &Vector3<f32>) -> Result<Tree> {
    transform(shape, &Matrix4::new_nonuniform_scaling(factors))
}

/// Rotate about the z axis by `angle` radians
pub fn rotate_z(shape: &Tree, angle: f32) -> Result<Tree> {
    transform(shape, &Matrix4::from_euler_angles(0.0, 0.0, angle))
}

/// Mirror across the plane `x = offset`
pub fn reflect_x(shape: &Tree, offset: f32) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&(2.0 * offset - x), &y, &z)
}

/// Mirror across the plane `y = offset`
pub fn reflect_y(shape: &Tree, offset: f32) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&x, &(2.0 * offset - y), &z)
}

/// Mirror across the plane `z = offset`
pub fn reflect_z(shape: &Tree, offset: f32) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&x, &y, &(2.0 * offset - z))
}

/// Mirror across the plane `x = y`
pub fn reflect_xy(shape: &Tree) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&y, &x, &z)
}

/// Mirror across the plane `y = z`
pub fn reflect_yz(shape: &Tree) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&x, &z, &y)
}

/// Mirror across the plane `x = z`
pub fn reflect_xz(shape: &Tree) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&z, &y, &x)
}

/// Fold the positive-x half of the shape onto the negative half
pub fn symmetric_x(shape: &Tree) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&x.abs(), &y, &z)
}

pub fn symmetric_y(shape: &Tree) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&x, &y.abs(), &z)
}

pub fn symmetric_z(shape: &Tree) -> Result<Tree> {
    let (x, y, z) = Tree::axes(shape.kernel());
    shape.remap(&x, &y, &z.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csg::{cuboid, sphere};
    use crate::kernel::ArenaKernel;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_translate_moves_forward() {
        let kernel = ArenaKernel::shared();
        let s = sphere(&kernel, 1.0, Point3::origin()).unwrap();
        let moved = translate(&s, &Vector3::new(3.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(moved.eval([3.0, 0.0, 0.0]).unwrap(), -1.0);
        assert!(moved.eval([0.0, 0.0, 0.0]).unwrap() > 0.0);
    }

    #[test]
    fn test_transform_matches_translate() {
        let kernel = ArenaKernel::shared();
        let s = sphere(&kernel, 1.0, Point3::origin()).unwrap();
        let v = Vector3::new(0.5, -1.0, 2.0);
        let a = translate(&s, &v).unwrap();
        let b = transform(&s, &Matrix4::new_translation(&v)).unwrap();
        for p in [[0.0, 0.0, 0.0], [0.5, -1.0, 2.0], [1.0, 1.0, 1.0]] {
            assert_relative_eq!(a.eval(p).unwrap(), b.eval(p).unwrap(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let kernel = ArenaKernel::shared();
        let s = sphere(&kernel, 1.0, Point3::origin()).unwrap();
        assert!(matches!(
            scale(&s, &Vector3::new(1.0, 0.0, 1.0)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rotate_and_reflect() {
        let kernel = ArenaKernel::shared();
        let bar =
            cuboid(&kernel, Point3::new(1.0, -0.1, -0.1), Point3::new(2.0, 0.1, 0.1)).unwrap();

        let turned = rotate_z(&bar, std::f32::consts::FRAC_PI_2).unwrap();
        assert!(turned.eval([0.0, 1.5, 0.0]).unwrap() < 0.0);
        assert!(turned.eval([1.5, 0.0, 0.0]).unwrap() > 0.0);

        let mirrored = reflect_x(&bar, 0.0).unwrap();
        assert!(mirrored.eval([-1.5, 0.0, 0.0]).unwrap() < 0.0);

        let swapped = reflect_xy(&bar).unwrap();
        assert!(swapped.eval([0.0, 1.5, 0.0]).unwrap() < 0.0);

        let both = symmetric_x(&bar).unwrap();
        assert!(both.eval([-1.5, 0.0, 0.0]).unwrap() < 0.0);
        assert!(both.eval([1.5, 0.0, 0.0]).unwrap() < 0.0);
    }
}
