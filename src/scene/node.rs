// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shape nodes: operation, placement and cached evaluation state

use crate::csg;
use crate::error::{Error, Result};
use crate::geometry::Mesh;
use crate::kernel::{Axis, KernelRef};
use crate::render::RenderSlot;
use crate::tree::Tree;
use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;

/// Stable index of a shape within its [`Scene`](super::Scene)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub(crate) usize);

impl ShapeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

/// How many children an operation consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Primitive; takes no children
    Nonary,
    /// Uses its first enabled child
    Unary,
    /// Combines every enabled child
    Nary,
}

fn default_shell_offset() -> f32 {
    0.025
}

fn default_blend_amount() -> f32 {
    0.1
}

fn default_mirror_axis() -> Axis {
    Axis::X
}

/// Operation of a shape node. Primitives are unit-sized and placed by the
/// node's transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ShapeOp {
    /// Infinite z-aligned column of radius 0.5
    Circle,
    /// Sphere of radius 0.5
    Sphere,
    /// Cube spanning ±0.5
    #[serde(alias = "box")]
    Cuboid,
    /// Radius 0.5, height 1, centred on the origin
    Cylinder,
    /// Child placed by this node's transform only
    Transform,
    Inverse,
    Mirror {
        #[serde(default = "default_mirror_axis")]
        axis: Axis,
    },
    Shell {
        #[serde(default = "default_shell_offset")]
        offset: f32,
    },
    Union,
    Intersection,
    /// First child minus the rest
    Difference,
    Blend {
        #[serde(default = "default_blend_amount")]
        amount: f32,
    },
}

impl ShapeOp {
    pub fn arity(&self) -> Arity {
        match self {
            ShapeOp::Circle | ShapeOp::Sphere | ShapeOp::Cuboid | ShapeOp::Cylinder => {
                Arity::Nonary
            }
            ShapeOp::Transform
            | ShapeOp::Inverse
            | ShapeOp::Mirror { .. }
            | ShapeOp::Shell { .. } => Arity::Unary,
            ShapeOp::Union
            | ShapeOp::Intersection
            | ShapeOp::Difference
            | ShapeOp::Blend { .. } => Arity::Nary,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShapeOp::Circle => "circle",
            ShapeOp::Sphere => "sphere",
            ShapeOp::Cuboid => "cuboid",
            ShapeOp::Cylinder => "cylinder",
            ShapeOp::Transform => "transform",
            ShapeOp::Inverse => "inverse",
            ShapeOp::Mirror { .. } => "mirror",
            ShapeOp::Shell { .. } => "shell",
            ShapeOp::Union => "union",
            ShapeOp::Intersection => "intersection",
            ShapeOp::Difference => "difference",
            ShapeOp::Blend { .. } => "blend",
        }
    }

    /// Reject a child count this operation can never use
    pub(crate) fn check_children(&self, count: usize) -> Result<()> {
        let limit = match self.arity() {
            Arity::Nonary => 0,
            Arity::Unary => 1,
            Arity::Nary => return Ok(()),
        };
        if count > limit {
            return Err(Error::InvalidArgument(format!(
                "{} accepts at most {} child shape(s), got {}",
                self.name(),
                limit,
                count
            )));
        }
        Ok(())
    }

    pub(crate) fn digest(&self, state: &mut impl Hasher) {
        state.write(self.name().as_bytes());
        match self {
            ShapeOp::Mirror { axis } => state.write_u8(*axis as u8),
            ShapeOp::Shell { offset } => state.write_u32(offset.to_bits()),
            ShapeOp::Blend { amount } => state.write_u32(amount.to_bits()),
            _ => {}
        }
    }

    pub(crate) fn primitive(&self, kernel: &KernelRef) -> Result<Tree> {
        match self {
            ShapeOp::Circle => csg::circle(kernel, 0.5),
            ShapeOp::Sphere => csg::sphere(kernel, 0.5, Point3::origin()),
            ShapeOp::Cuboid => csg::cuboid(
                kernel,
                Point3::new(-0.5, -0.5, -0.5),
                Point3::new(0.5, 0.5, 0.5),
            ),
            ShapeOp::Cylinder => csg::cylinder(kernel, 0.5, 1.0, Point3::new(0.0, 0.0, -0.5)),
            other => Err(Error::InvalidArgument(format!(
                "{} is not a primitive",
                other.name()
            ))),
        }
    }

    pub(crate) fn apply(&self, child: &Tree) -> Result<Tree> {
        match self {
            ShapeOp::Transform => child.clone().validated(),
            ShapeOp::Inverse => csg::inverse(child),
            ShapeOp::Mirror { axis: Axis::X } => csg::symmetric_x(child),
            ShapeOp::Mirror { axis: Axis::Y } => csg::symmetric_y(child),
            ShapeOp::Mirror { axis: Axis::Z } => csg::symmetric_z(child),
            ShapeOp::Shell { offset } => csg::shell(child, *offset),
            other => Err(Error::InvalidArgument(format!(
                "{} does not take a single operand",
                other.name()
            ))),
        }
    }

    pub(crate) fn combine(&self, children: &[Tree]) -> Result<Tree> {
        match self {
            ShapeOp::Union => csg::union(children),
            ShapeOp::Intersection => csg::intersection(children),
            ShapeOp::Difference => csg::difference(children),
            ShapeOp::Blend { amount } => csg::blend_all(children, *amount),
            other => Err(Error::InvalidArgument(format!(
                "{} does not combine shapes",
                other.name()
            ))),
        }
    }
}

impl fmt::Display for ShapeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Placement relative to the parent shape. Rotation is Euler angles in
/// degrees, applied z then y then x.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTransform {
    pub translation: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl LocalTransform {
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Local-to-parent matrix: translate * rotate * scale
    pub fn to_matrix(&self) -> Matrix4<f32> {
        let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.rotation.x.to_radians());
        let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.rotation.y.to_radians());
        let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.rotation.z.to_radians());
        Matrix4::new_translation(&self.translation)
            * (rz * ry * rx).to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

/// Evaluation state of a node's cached tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeState {
    /// Cache matches the latest fingerprint
    Clean,
    /// Must be rebuilt on the next evaluation
    Dirty,
    /// Being rebuilt on the current call stack
    Evaluating,
}

/// Meshing parameters for a root shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSettings {
    /// Side of the cubic region, centred on the shape's world position
    pub bounds_size: f32,
    pub resolution: f32,
    pub splitting_angle: f32,
}

/// One shape in a [`Scene`](super::Scene)
#[derive(Debug)]
pub struct ShapeNode {
    pub(crate) name: String,
    pub(crate) op: ShapeOp,
    pub(crate) local: LocalTransform,
    pub(crate) enabled: bool,
    pub(crate) parent: Option<ShapeId>,
    pub(crate) children: Vec<ShapeId>,
    pub(crate) settings: MeshSettings,
    pub(crate) world: Matrix4<f32>,
    pub(crate) state: ShapeState,
    /// Fingerprint from the latest refresh
    pub(crate) observed: u64,
    /// Fingerprint the cached tree was built for
    pub(crate) built_for: Option<u64>,
    /// Fingerprint the last failed build was attempted for
    pub(crate) failed_for: Option<u64>,
    pub(crate) cached: Option<Tree>,
    /// Bumped whenever the cached tree or mesh settings change
    pub(crate) revision: u64,
    pub(crate) meshed_revision: Option<u64>,
    pub(crate) mesh: Option<Mesh>,
    pub(crate) render: RenderSlot,
}

impl ShapeNode {
    pub(crate) fn new(
        name: String,
        op: ShapeOp,
        parent: Option<ShapeId>,
        settings: MeshSettings,
    ) -> Self {
        let render = RenderSlot::new(name.clone());
        Self {
            name,
            op,
            local: LocalTransform::default(),
            enabled: true,
            parent,
            children: Vec::new(),
            settings,
            world: Matrix4::identity(),
            state: ShapeState::Dirty,
            observed: 0,
            built_for: None,
            failed_for: None,
            cached: None,
            revision: 0,
            meshed_revision: None,
            mesh: None,
            render,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &ShapeOp {
        &self.op
    }

    pub fn transform(&self) -> &LocalTransform {
        &self.local
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    pub fn children(&self) -> &[ShapeId] {
        &self.children
    }

    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    /// World matrix as of the last refresh
    pub fn world_matrix(&self) -> &Matrix4<f32> {
        &self.world
    }

    pub fn state(&self) -> ShapeState {
        self.state
    }

    /// Cached evaluation result; `None` when the shape has no geometry or
    /// has not been evaluated yet
    pub fn cached_tree(&self) -> Option<&Tree> {
        self.cached.as_ref()
    }

    /// Latest mesh delivered for this shape (roots only)
    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    /// True while a background render for this shape is outstanding
    pub fn is_rendering(&self) -> bool {
        self.render.is_busy()
    }

    /// The cached tree is current and, for roots, so is the mesh
    pub(crate) fn mesh_is_current(&self) -> bool {
        self.meshed_revision == Some(self.revision)
    }

    /// Transform applied to this node's tree: the full world placement for
    /// roots, the parent-relative one otherwise
    pub(crate) fn placement(&self) -> Matrix4<f32> {
        match self.parent {
            None => self.world,
            Some(_) => self.local.to_matrix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ArenaKernel;
    use approx::assert_relative_eq;

    #[test]
    fn test_arity() {
        assert_eq!(ShapeOp::Sphere.arity(), Arity::Nonary);
        assert_eq!(ShapeOp::Shell { offset: 0.1 }.arity(), Arity::Unary);
        assert_eq!(ShapeOp::Difference.arity(), Arity::Nary);
        assert!(ShapeOp::Sphere.check_children(1).is_err());
        assert!(ShapeOp::Inverse.check_children(1).is_ok());
        assert!(ShapeOp::Inverse.check_children(2).is_err());
        assert!(ShapeOp::Union.check_children(12).is_ok());
    }

    #[test]
    fn test_serde_names_and_defaults() {
        let op: ShapeOp = serde_json::from_str(r#"{"op":"box"}"#).unwrap();
        assert_eq!(op, ShapeOp::Cuboid);
        let op: ShapeOp = serde_json::from_str(r#"{"op":"shell"}"#).unwrap();
        assert_eq!(op, ShapeOp::Shell { offset: 0.025 });
        let op: ShapeOp = serde_json::from_str(r#"{"op":"mirror","axis":"z"}"#).unwrap();
        assert_eq!(op, ShapeOp::Mirror { axis: Axis::Z });
    }

    #[test]
    fn test_unit_primitives() {
        let kernel = ArenaKernel::shared();
        let sphere = ShapeOp::Sphere.primitive(&kernel).unwrap();
        assert_relative_eq!(sphere.eval([0.5, 0.0, 0.0]).unwrap(), 0.0, epsilon = 1e-6);

        let cylinder = ShapeOp::Cylinder.primitive(&kernel).unwrap();
        assert!(cylinder.eval([0.0, 0.0, 0.4]).unwrap() < 0.0);
        assert!(cylinder.eval([0.0, 0.0, 0.6]).unwrap() > 0.0);

        assert!(ShapeOp::Union.primitive(&kernel).is_err());
    }

    #[test]
    fn test_transform_matrix_order() {
        let local = LocalTransform {
            translation: Vector3::new(1.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 90.0),
            scale: Vector3::new(2.0, 1.0, 1.0),
        };
        // scale, then rotate x onto y, then translate
        let p = local.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.0, 2.0, 0.0), epsilon = 1e-5);
    }
}
