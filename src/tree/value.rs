// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Expression tree value type

use super::context;
use crate::error::{Error, Result};
use crate::kernel::{same_kernel, Axis, KernelRef, NodeHandle, Opcode};
use std::fmt;
use std::path::Path;

/// Handle to an immutable expression tree held by a geometry kernel.
///
/// Cloning copies the handle, not the tree: clones share one kernel handle
/// and one release. A tree that failed to build carries an invalid handle,
/// so every later use of it fails; see [`Tree::validated`].
#[derive(Clone)]
pub struct Tree {
    kernel: KernelRef,
    handle: NodeHandle,
}

impl Tree {
    fn adopt(kernel: &KernelRef, handle: NodeHandle) -> Tree {
        let tree = Tree {
            kernel: kernel.clone(),
            handle,
        };
        context::register(&tree);
        tree
    }

    fn build(kernel: &KernelRef, handle: Result<NodeHandle>) -> Result<Tree> {
        handle.map(|handle| Tree::adopt(kernel, handle))
    }

    /// Tree carrying an invalid handle on `kernel`
    pub(crate) fn poisoned(kernel: &KernelRef) -> Tree {
        Tree {
            kernel: kernel.clone(),
            handle: NodeHandle::INVALID,
        }
    }

    fn or_poisoned(kernel: &KernelRef, built: Result<Tree>) -> Tree {
        built.unwrap_or_else(|err| {
            tracing::trace!(error = %err, "tree construction failed");
            Tree::poisoned(kernel)
        })
    }

    pub fn constant(kernel: &KernelRef, value: f32) -> Tree {
        Tree::or_poisoned(kernel, Tree::build(kernel, kernel.build_constant(value)))
    }

    pub fn var(kernel: &KernelRef, axis: Axis) -> Tree {
        Tree::or_poisoned(kernel, Tree::build(kernel, kernel.build_variable(axis)))
    }

    pub fn x(kernel: &KernelRef) -> Tree {
        Tree::var(kernel, Axis::X)
    }

    pub fn y(kernel: &KernelRef) -> Tree {
        Tree::var(kernel, Axis::Y)
    }

    pub fn z(kernel: &KernelRef) -> Tree {
        Tree::var(kernel, Axis::Z)
    }

    /// The coordinate variables `(x, y, z)` of `kernel`
    pub fn axes(kernel: &KernelRef) -> (Tree, Tree, Tree) {
        (Tree::x(kernel), Tree::y(kernel), Tree::z(kernel))
    }

    /// Constant on this tree's kernel
    pub fn lift(&self, value: f32) -> Tree {
        Tree::constant(&self.kernel, value)
    }

    fn check_same_kernel(&self, other: &Tree) -> Result<()> {
        if same_kernel(&self.kernel, &other.kernel) {
            Ok(())
        } else {
            Err(Error::InvalidOperand(format!(
                "tree {} belongs to a different kernel",
                other.handle
            )))
        }
    }

    pub fn unary(op: Opcode, operand: &Tree) -> Result<Tree> {
        let kernel = &operand.kernel;
        Tree::build(kernel, kernel.build_unary(op, operand.handle))
    }

    pub fn binary(op: Opcode, lhs: &Tree, rhs: &Tree) -> Result<Tree> {
        lhs.check_same_kernel(rhs)?;
        let kernel = &lhs.kernel;
        Tree::build(kernel, kernel.build_binary(op, lhs.handle, rhs.handle))
    }

    /// Substitute new expressions for the coordinate variables
    pub fn remap(&self, x: &Tree, y: &Tree, z: &Tree) -> Result<Tree> {
        for axis in [x, y, z] {
            self.check_same_kernel(axis)?;
        }
        Tree::build(
            &self.kernel,
            self.kernel
                .remap(self.handle, x.handle, y.handle, z.handle),
        )
    }

    pub(crate) fn apply_unary(&self, op: Opcode) -> Tree {
        Tree::or_poisoned(&self.kernel, Tree::unary(op, self))
    }

    pub(crate) fn apply_binary(&self, op: Opcode, rhs: &Tree) -> Tree {
        Tree::or_poisoned(&self.kernel, Tree::binary(op, self, rhs))
    }

    /// Combine with a literal without leaving the literal's handle behind
    pub(crate) fn apply_scalar(&self, op: Opcode, value: f32, scalar_first: bool) -> Tree {
        let kernel = &self.kernel;
        let built = kernel.build_constant(value).and_then(|constant| {
            let (lhs, rhs) = if scalar_first {
                (constant, self.handle)
            } else {
                (self.handle, constant)
            };
            let result = kernel.build_binary(op, lhs, rhs);
            kernel.release_tree(constant);
            result
        });
        Tree::or_poisoned(kernel, Tree::build(kernel, built))
    }

    /// `Ok(self)` if the handle is live, `InvalidOperand` otherwise
    pub fn validated(self) -> Result<Tree> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(Error::InvalidOperand(format!(
                "tree {} is invalid or released",
                self.handle
            )))
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.handle.is_invalid() && self.kernel.is_valid(self.handle)
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    pub fn kernel(&self) -> &KernelRef {
        &self.kernel
    }

    pub(crate) fn same_handle(&self, other: &Tree) -> bool {
        self.handle == other.handle && same_kernel(&self.kernel, &other.kernel)
    }

    /// O(1) identity comparison: the same node, or the same operator over the
    /// same operand nodes. `x + 1` and `1 + x` are not equal.
    pub fn structurally_eq(&self, other: &Tree) -> bool {
        same_kernel(&self.kernel, &other.kernel) && self.kernel.tree_eq(self.handle, other.handle)
    }

    pub fn opcode(&self) -> Result<Opcode> {
        self.kernel.tree_opcode(self.handle)
    }

    pub fn constant_value(&self) -> Option<f32> {
        self.kernel.constant_value(self.handle)
    }

    pub fn is_variable(&self) -> bool {
        self.opcode().map(|op| op.axis().is_some()).unwrap_or(false)
    }

    /// Evaluate the field at a point
    pub fn eval(&self, point: impl Into<[f32; 3]>) -> Result<f32> {
        self.kernel.eval_point(self.handle, point.into())
    }

    /// Second handle to the same tree, owned by the caller and not
    /// registered with any context
    pub fn retain(&self) -> Result<Tree> {
        let handle = self.kernel.retain_tree(self.handle)?;
        Ok(Tree {
            kernel: self.kernel.clone(),
            handle,
        })
    }

    /// Release the handle. Releasing twice, or releasing a tree its context
    /// already released, does nothing.
    pub fn dispose(&self) {
        if !self.handle.is_invalid() {
            self.kernel.release_tree(self.handle);
        }
    }

    pub fn to_sexpr(&self) -> Result<String> {
        self.kernel.print_tree(self.handle)
    }

    pub fn from_sexpr(kernel: &KernelRef, text: &str) -> Result<Tree> {
        Tree::build(kernel, kernel.parse_tree(text))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.kernel.save_tree(self.handle)
    }

    pub fn from_bytes(kernel: &KernelRef, bytes: &[u8]) -> Result<Tree> {
        Tree::build(kernel, kernel.load_tree(bytes))
    }

    /// Write the binary archive to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(kernel: &KernelRef, path: impl AsRef<Path>) -> Result<Tree> {
        let bytes = std::fs::read(path)?;
        Tree::from_bytes(kernel, &bytes)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tree({})", self.handle)
    }
}

/// Longest S-expression `Display` writes before eliding the rest
const DISPLAY_LIMIT: usize = 4096;

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self.to_sexpr() {
            Ok(text) => text,
            Err(_) => return write!(f, "<invalid tree {}>", self.handle),
        };
        if text.len() <= DISPLAY_LIMIT {
            return f.write_str(&text);
        }
        let mut end = DISPLAY_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        write!(f, "{} ... ({} bytes)", &text[..end], text.len())
    }
}
