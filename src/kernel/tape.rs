// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Flat evaluation tape compiled from an expression graph

use super::expr::{apply_binary, apply_unary, post_order, Expr};
use super::{Axis, Opcode};
use ahash::AHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Instr {
    Constant(f32),
    Var(Axis),
    Unary(Opcode, u32),
    Binary(Opcode, u32, u32),
}

/// Post-order instruction list; each shared node appears once
#[derive(Debug, Clone)]
pub struct Tape {
    instrs: Vec<Instr>,
}

impl Tape {
    pub(crate) fn compile(root: &Arc<Expr>) -> Self {
        let nodes = post_order(root);
        let mut slots: AHashMap<*const Expr, u32> = AHashMap::with_capacity(nodes.len());
        let slot = |slots: &AHashMap<*const Expr, u32>, node: &Arc<Expr>| {
            slots.get(&Arc::as_ptr(node)).copied().unwrap_or(0)
        };

        let mut instrs = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let instr = match node.as_ref() {
                Expr::Constant(value) => Instr::Constant(*value),
                Expr::Var(axis) => Instr::Var(*axis),
                Expr::Unary(op, a) => Instr::Unary(*op, slot(&slots, a)),
                Expr::Binary(op, a, b) => Instr::Binary(*op, slot(&slots, a), slot(&slots, b)),
            };
            slots.insert(Arc::as_ptr(node), instrs.len() as u32);
            instrs.push(instr);
        }

        Tape { instrs }
    }

    /// Number of distinct nodes in the tape
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Evaluate at a point. `scratch` is reused between calls to avoid
    /// reallocating per sample.
    pub fn eval(&self, point: [f32; 3], scratch: &mut Vec<f32>) -> f32 {
        scratch.clear();
        scratch.reserve(self.instrs.len());
        for instr in &self.instrs {
            let value = match *instr {
                Instr::Constant(value) => value,
                Instr::Var(axis) => point[axis.index()],
                Instr::Unary(op, a) => apply_unary(op, scratch[a as usize]),
                Instr::Binary(op, a, b) => {
                    apply_binary(op, scratch[a as usize], scratch[b as usize])
                }
            };
            scratch.push(value);
        }
        scratch.last().copied().unwrap_or(f32::NAN)
    }
}
