// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry Kernel contract and the in-process arena kernel.
//!
//! Everything above this module talks to the kernel through
//! [`GeometryKernel`] and opaque [`NodeHandle`]s. [`ArenaKernel`] is the
//! implementation shipped with the crate.

mod arena;
mod archive;
mod expr;
mod mesher;
mod opcode;
mod sexpr;
mod tape;

pub use arena::ArenaKernel;
pub use opcode::{opcode_arity, Axis, Opcode};
pub use tape::Tape;

use crate::error::Result;
use crate::geometry::BoundingBox;
use std::fmt;
use std::sync::Arc;

/// Shared reference to a kernel
pub type KernelRef = Arc<dyn GeometryKernel>;

/// Generation-checked handle to a tree node owned by a kernel.
///
/// A handle stays valid until released; after that every use fails with
/// `InvalidOperand` even if the slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeHandle {
    /// Handle that never refers to a node
    pub const INVALID: NodeHandle = NodeHandle {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "#invalid")
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

/// Triangle soup produced by a render. Owned by whoever received it; it is
/// released when dropped or handed back through
/// [`GeometryKernel::release_mesh`].
#[derive(Debug, Default, PartialEq)]
pub struct MeshBuffer {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshBuffer {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Narrow contract to the polygonization engine.
///
/// Builders fail with `InvalidOperand` when an operand handle is invalid or
/// released. Releasing is idempotent.
pub trait GeometryKernel: Send + Sync + fmt::Debug {
    fn build_constant(&self, value: f32) -> Result<NodeHandle>;
    fn build_variable(&self, axis: Axis) -> Result<NodeHandle>;
    fn build_unary(&self, op: Opcode, operand: NodeHandle) -> Result<NodeHandle>;
    fn build_binary(&self, op: Opcode, lhs: NodeHandle, rhs: NodeHandle) -> Result<NodeHandle>;

    /// Substitute the `x`, `y` and `z` variables of `tree`
    fn remap(
        &self,
        tree: NodeHandle,
        x: NodeHandle,
        y: NodeHandle,
        z: NodeHandle,
    ) -> Result<NodeHandle>;

    /// New independent handle to the same node
    fn retain_tree(&self, tree: NodeHandle) -> Result<NodeHandle>;
    fn release_tree(&self, tree: NodeHandle);
    fn is_valid(&self, tree: NodeHandle) -> bool;

    /// Identity-based equality: same node, or same opcode over the same
    /// operand nodes
    fn tree_eq(&self, a: NodeHandle, b: NodeHandle) -> bool;
    fn tree_opcode(&self, tree: NodeHandle) -> Result<Opcode>;
    fn constant_value(&self, tree: NodeHandle) -> Option<f32>;

    fn eval_point(&self, tree: NodeHandle, point: [f32; 3]) -> Result<f32>;

    /// Polygonize `tree` over `region`; `resolution` is the half-feature size
    /// at which subdivision stops
    fn render_mesh(
        &self,
        tree: NodeHandle,
        region: &BoundingBox,
        resolution: f32,
    ) -> Result<MeshBuffer>;

    fn release_mesh(&self, buffer: MeshBuffer) {
        drop(buffer);
    }

    fn print_tree(&self, tree: NodeHandle) -> Result<String>;
    fn parse_tree(&self, text: &str) -> Result<NodeHandle>;
    fn save_tree(&self, tree: NodeHandle) -> Result<Vec<u8>>;
    fn load_tree(&self, bytes: &[u8]) -> Result<NodeHandle>;

    fn opcode_from_name(&self, name: &str) -> Option<Opcode> {
        Opcode::from_name(name)
    }

    fn opcode_arity(&self, code: i32) -> Option<usize> {
        opcode_arity(code)
    }
}

/// True if both references point at the same kernel instance
pub fn same_kernel(a: &KernelRef, b: &KernelRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
