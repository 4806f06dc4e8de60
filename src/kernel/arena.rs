// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! In-process kernel backed by a slot arena of shared expression nodes

use super::expr::Expr;
use super::{archive, mesher, sexpr};
use super::{Axis, GeometryKernel, MeshBuffer, NodeHandle, Opcode, Tape};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use parking_lot::RwLock;
use std::sync::Arc;

/// Default cap on grid cells along one axis of a render
pub const DEFAULT_MAX_CELLS_PER_AXIS: u32 = 256;

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Arc<Expr>>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    fn insert(&mut self, node: Arc<Expr>) -> Result<NodeHandle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|&i| i != NodeHandle::INVALID.index)
                    .ok_or_else(|| Error::ResourceExhaustion("node arena is full".into()))?;
                self.slots.try_reserve(1).map_err(|_| {
                    Error::ResourceExhaustion("cannot grow node arena".into())
                })?;
                self.slots.push(Slot::default());
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.node = Some(node);
        self.live += 1;
        Ok(NodeHandle {
            index,
            generation: slot.generation,
        })
    }

    fn get(&self, handle: NodeHandle) -> Option<&Arc<Expr>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn remove(&mut self, handle: NodeHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.node.is_none() {
            return false;
        }
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        true
    }
}

/// Kernel that keeps every live tree in a generation-checked arena.
///
/// Slots hold `Arc`-shared immutable nodes, so releasing a handle only drops
/// that handle's reference; trees built on top of it keep their operands.
#[derive(Debug)]
pub struct ArenaKernel {
    arena: RwLock<Arena>,
    max_cells_per_axis: u32,
}

impl ArenaKernel {
    pub fn new() -> Self {
        Self::with_max_cells(DEFAULT_MAX_CELLS_PER_AXIS)
    }

    /// Kernel whose renders refuse grids finer than `max_cells_per_axis`
    pub fn with_max_cells(max_cells_per_axis: u32) -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            max_cells_per_axis: max_cells_per_axis.max(1),
        }
    }

    /// Shared reference, ready to hand to trees and scenes
    pub fn shared() -> super::KernelRef {
        Arc::new(Self::new())
    }

    /// Number of handles that have not been released
    pub fn live_handles(&self) -> usize {
        self.arena.read().live
    }

    /// Compile `tree` into an evaluation tape
    pub fn compile(&self, tree: NodeHandle) -> Result<Tape> {
        Ok(Tape::compile(&self.node(tree)?))
    }

    fn node(&self, handle: NodeHandle) -> Result<Arc<Expr>> {
        self.arena.read().get(handle).cloned().ok_or_else(|| {
            Error::InvalidOperand(format!("handle {} is not a live tree", handle))
        })
    }

    fn insert(&self, node: Arc<Expr>) -> Result<NodeHandle> {
        self.arena.write().insert(node)
    }
}

impl Default for ArenaKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryKernel for ArenaKernel {
    fn build_constant(&self, value: f32) -> Result<NodeHandle> {
        self.insert(Arc::new(Expr::Constant(value)))
    }

    fn build_variable(&self, axis: Axis) -> Result<NodeHandle> {
        self.insert(Arc::new(Expr::Var(axis)))
    }

    fn build_unary(&self, op: Opcode, operand: NodeHandle) -> Result<NodeHandle> {
        if op.arity() != 1 {
            return Err(Error::InvalidArgument(format!(
                "'{}' is not a unary operator",
                op
            )));
        }
        let a = self.node(operand)?;
        self.insert(Arc::new(Expr::Unary(op, a)))
    }

    fn build_binary(&self, op: Opcode, lhs: NodeHandle, rhs: NodeHandle) -> Result<NodeHandle> {
        if op.arity() != 2 {
            return Err(Error::InvalidArgument(format!(
                "'{}' is not a binary operator",
                op
            )));
        }
        let (a, b) = {
            let arena = self.arena.read();
            let fetch = |h: NodeHandle| {
                arena.get(h).cloned().ok_or_else(|| {
                    Error::InvalidOperand(format!("handle {} is not a live tree", h))
                })
            };
            (fetch(lhs)?, fetch(rhs)?)
        };
        self.insert(Arc::new(Expr::Binary(op, a, b)))
    }

    fn remap(
        &self,
        tree: NodeHandle,
        x: NodeHandle,
        y: NodeHandle,
        z: NodeHandle,
    ) -> Result<NodeHandle> {
        let root = self.node(tree)?;
        let (x, y, z) = (self.node(x)?, self.node(y)?, self.node(z)?);
        self.insert(Expr::remap(&root, &x, &y, &z))
    }

    fn retain_tree(&self, tree: NodeHandle) -> Result<NodeHandle> {
        let node = self.node(tree)?;
        self.insert(node)
    }

    fn release_tree(&self, tree: NodeHandle) {
        if !self.arena.write().remove(tree) {
            tracing::trace!(handle = %tree, "release of dead handle ignored");
        }
    }

    fn is_valid(&self, tree: NodeHandle) -> bool {
        self.arena.read().get(tree).is_some()
    }

    fn tree_eq(&self, a: NodeHandle, b: NodeHandle) -> bool {
        let arena = self.arena.read();
        match (arena.get(a), arena.get(b)) {
            (Some(a), Some(b)) => Expr::shallow_eq(a, b),
            _ => false,
        }
    }

    fn tree_opcode(&self, tree: NodeHandle) -> Result<Opcode> {
        Ok(self.node(tree)?.opcode())
    }

    fn constant_value(&self, tree: NodeHandle) -> Option<f32> {
        match self.arena.read().get(tree)?.as_ref() {
            Expr::Constant(value) => Some(*value),
            _ => None,
        }
    }

    fn eval_point(&self, tree: NodeHandle, point: [f32; 3]) -> Result<f32> {
        let tape = self.compile(tree)?;
        let mut scratch = Vec::with_capacity(tape.len());
        Ok(tape.eval(point, &mut scratch))
    }

    fn render_mesh(
        &self,
        tree: NodeHandle,
        region: &BoundingBox,
        resolution: f32,
    ) -> Result<MeshBuffer> {
        let tape = self.compile(tree)?;
        mesher::polygonize(&tape, region, resolution, self.max_cells_per_axis)
    }

    fn print_tree(&self, tree: NodeHandle) -> Result<String> {
        Ok(sexpr::print(&self.node(tree)?))
    }

    fn parse_tree(&self, text: &str) -> Result<NodeHandle> {
        self.insert(sexpr::parse(text)?)
    }

    fn save_tree(&self, tree: NodeHandle) -> Result<Vec<u8>> {
        Ok(archive::encode(&self.node(tree)?))
    }

    fn load_tree(&self, bytes: &[u8]) -> Result<NodeHandle> {
        self.insert(archive::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handles_are_rejected() {
        let kernel = ArenaKernel::new();
        let x = kernel.build_variable(Axis::X).unwrap();
        kernel.release_tree(x);
        assert!(!kernel.is_valid(x));

        // slot reuse bumps the generation
        let y = kernel.build_variable(Axis::Y).unwrap();
        assert_eq!(y.index, x.index);
        assert_ne!(y.generation, x.generation);
        assert!(matches!(
            kernel.build_unary(Opcode::Neg, x),
            Err(Error::InvalidOperand(_))
        ));

        // releasing the stale handle again must not free the new tree
        kernel.release_tree(x);
        assert!(kernel.is_valid(y));
        assert_eq!(kernel.live_handles(), 1);
    }

    #[test]
    fn test_release_keeps_dependents_alive() {
        let kernel = ArenaKernel::new();
        let x = kernel.build_variable(Axis::X).unwrap();
        let one = kernel.build_constant(1.0).unwrap();
        let sum = kernel.build_binary(Opcode::Add, x, one).unwrap();
        kernel.release_tree(x);
        kernel.release_tree(one);

        assert_eq!(kernel.eval_point(sum, [2.0, 0.0, 0.0]).unwrap(), 3.0);
        assert_eq!(kernel.live_handles(), 1);
    }

    #[test]
    fn test_wrong_arity_is_invalid_argument() {
        let kernel = ArenaKernel::new();
        let x = kernel.build_variable(Axis::X).unwrap();
        assert!(matches!(
            kernel.build_unary(Opcode::Add, x),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            kernel.build_binary(Opcode::Sqrt, x, x),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            kernel.build_binary(Opcode::Add, x, NodeHandle::INVALID),
            Err(Error::InvalidOperand(_))
        ));
    }

    #[test]
    fn test_retain_gives_independent_handle() {
        let kernel = ArenaKernel::new();
        let x = kernel.build_variable(Axis::X).unwrap();
        let kept = kernel.retain_tree(x).unwrap();
        kernel.release_tree(x);
        assert!(kernel.is_valid(kept));
        assert_eq!(kernel.tree_opcode(kept).unwrap(), Opcode::VarX);
    }
}
