// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shape primitives as signed-distance-style fields: negative inside,
//! positive outside, zero on the surface

use super::transforms::translate;
use crate::error::Result;
use crate::kernel::KernelRef;
use crate::tree::Tree;
use nalgebra::{Point3, Vector3};

/// Infinite cylinder of radius `radius` around the z axis; a disc in the
/// xy plane
pub fn circle(kernel: &KernelRef, radius: f32) -> Result<Tree> {
    let (x, y, _) = Tree::axes(kernel);
    ((x.square() + y.square()).sqrt() - radius).validated()
}

fn distance_to(kernel: &KernelRef, p: &Point3<f32>) -> Tree {
    let (x, y, z) = Tree::axes(kernel);
    ((x - p.x).square() + (y - p.y).square() + (z - p.z).square()).sqrt()
}

pub fn sphere(kernel: &KernelRef, radius: f32, center: Point3<f32>) -> Result<Tree> {
    (distance_to(kernel, &center) - radius).validated()
}

/// Axis-aligned box with corners `lower` and `upper`
pub fn cuboid(kernel: &KernelRef, lower: Point3<f32>, upper: Point3<f32>) -> Result<Tree> {
    let (x, y, z) = Tree::axes(kernel);
    let span_x = (lower.x - &x).max(&(&x - upper.x));
    let span_y = (lower.y - &y).max(&(&y - upper.y));
    let span_z = (lower.z - &z).max(&(&z - upper.z));
    span_x.max(&span_y).max(&span_z).validated()
}

/// Ellipsoid as the set of points whose distances to the two foci sum to
/// less than `radius`
pub fn ellipsoid(
    kernel: &KernelRef,
    focus_a: Point3<f32>,
    focus_b: Point3<f32>,
    radius: f32,
) -> Result<Tree> {
    (distance_to(kernel, &focus_a) + distance_to(kernel, &focus_b) - radius).validated()
}

/// Clip a 2D shape in the xy plane to the slab `z_lo..=z_hi`
pub fn extrude(shape: &Tree, z_lo: f32, z_hi: f32) -> Result<Tree> {
    let z = Tree::z(shape.kernel());
    let slab = (z_lo - &z).max(&(&z - z_hi));
    shape.max(&slab).validated()
}

/// Cylinder of height `height` standing on `base` along +z
pub fn cylinder(kernel: &KernelRef, radius: f32, height: f32, base: Point3<f32>) -> Result<Tree> {
    let disc = translate(&circle(kernel, radius)?, &Vector3::new(base.x, base.y, base.z))?;
    extrude(&disc, base.z, base.z + height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ArenaKernel;

    #[test]
    fn test_primitives_are_negative_inside_positive_outside() {
        let kernel = ArenaKernel::shared();
        let origin = Point3::origin();
        let far = [10.0, 10.0, 10.0];

        let shapes = [
            (sphere(&kernel, 1.0, origin).unwrap(), [0.0, 0.0, 0.0]),
            (
                cuboid(&kernel, Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 2.0, 3.0)).unwrap(),
                [0.0, 1.0, 2.0],
            ),
            (cylinder(&kernel, 0.5, 2.0, Point3::new(1.0, 0.0, -1.0)).unwrap(), [1.0, 0.0, 0.0]),
            (
                ellipsoid(&kernel, Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), 3.0)
                    .unwrap(),
                [0.0, 0.0, 0.0],
            ),
        ];

        for (shape, inside) in &shapes {
            assert!(shape.eval(*inside).unwrap() < 0.0, "{} at {:?}", shape, inside);
            assert!(shape.eval(far).unwrap() > 0.0, "{} far away", shape);
        }
    }

    #[test]
    fn test_sphere_distance() {
        let kernel = ArenaKernel::shared();
        let s = sphere(&kernel, 1.0, Point3::new(0.0, 0.0, 2.0)).unwrap();
        assert!((s.eval([0.0, 0.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!((s.eval([0.0, 0.0, 2.0]).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_extrude_caps() {
        let kernel = ArenaKernel::shared();
        let slab = extrude(&circle(&kernel, 1.0).unwrap(), 0.0, 1.0).unwrap();
        assert!(slab.eval([0.0, 0.0, 0.5]).unwrap() < 0.0);
        assert!(slab.eval([0.0, 0.0, 1.5]).unwrap() > 0.0);
        assert!(slab.eval([0.0, 0.0, -0.5]).unwrap() > 0.0);
    }
}
