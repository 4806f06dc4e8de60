// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Immutable expression nodes shared between kernel handles

use super::{Axis, Opcode};
use ahash::{AHashMap, AHashSet};
use std::sync::{Arc, OnceLock};

/// Expression DAG node. Operands are `Arc`-shared and never mutated.
#[derive(Debug)]
pub(crate) enum Expr {
    Constant(f32),
    Var(Axis),
    Unary(Opcode, Arc<Expr>),
    Binary(Opcode, Arc<Expr>, Arc<Expr>),
}

impl Expr {
    pub fn opcode(&self) -> Opcode {
        match self {
            Expr::Constant(_) => Opcode::Constant,
            Expr::Var(axis) => axis.opcode(),
            Expr::Unary(op, _) | Expr::Binary(op, _, _) => *op,
        }
    }

    /// Identity-based equality: same node, or same operator over the
    /// same operand nodes. Never recurses.
    pub fn shallow_eq(a: &Arc<Expr>, b: &Arc<Expr>) -> bool {
        if Arc::ptr_eq(a, b) {
            return true;
        }
        match (a.as_ref(), b.as_ref()) {
            (Expr::Constant(x), Expr::Constant(y)) => x.to_bits() == y.to_bits(),
            (Expr::Var(x), Expr::Var(y)) => x == y,
            (Expr::Unary(op_a, a0), Expr::Unary(op_b, b0)) => {
                op_a == op_b && Arc::ptr_eq(a0, b0)
            }
            (Expr::Binary(op_a, a0, a1), Expr::Binary(op_b, b0, b1)) => {
                op_a == op_b && Arc::ptr_eq(a0, b0) && Arc::ptr_eq(a1, b1)
            }
            _ => false,
        }
    }

    /// Substitute the coordinate variables, producing a new graph.
    /// Shared sub-nodes stay shared in the output.
    pub fn remap(root: &Arc<Expr>, x: &Arc<Expr>, y: &Arc<Expr>, z: &Arc<Expr>) -> Arc<Expr> {
        let vars = [x, y, z];
        let mut mapped: AHashMap<*const Expr, Arc<Expr>> = AHashMap::new();
        let lookup = |mapped: &AHashMap<*const Expr, Arc<Expr>>, node: &Arc<Expr>| {
            mapped.get(&Arc::as_ptr(node)).cloned().unwrap_or_else(|| node.clone())
        };

        for node in post_order(root) {
            let out = match node.as_ref() {
                Expr::Constant(_) => node.clone(),
                Expr::Var(axis) => vars[axis.index()].clone(),
                Expr::Unary(op, a) => Arc::new(Expr::Unary(*op, lookup(&mapped, a))),
                Expr::Binary(op, a, b) => Arc::new(Expr::Binary(
                    *op,
                    lookup(&mapped, a),
                    lookup(&mapped, b),
                )),
            };
            mapped.insert(Arc::as_ptr(&node), out);
        }

        lookup(&mapped, root)
    }

    pub(crate) fn operands(&self) -> [Option<&Arc<Expr>>; 2] {
        match self {
            Expr::Constant(_) | Expr::Var(_) => [None, None],
            Expr::Unary(_, a) => [Some(a), None],
            Expr::Binary(_, a, b) => [Some(a), Some(b)],
        }
    }
}

/// Shared leaf swapped in for operands detached during drop
fn detached() -> Arc<Expr> {
    static DETACHED: OnceLock<Arc<Expr>> = OnceLock::new();
    DETACHED.get_or_init(|| Arc::new(Expr::Constant(0.0))).clone()
}

impl Expr {
    fn detach_operands(&mut self, into: &mut Vec<Arc<Expr>>) {
        let slots: [Option<&mut Arc<Expr>>; 2] = match self {
            Expr::Constant(_) | Expr::Var(_) => return,
            Expr::Unary(_, a) => [Some(a), None],
            Expr::Binary(_, a, b) => [Some(a), Some(b)],
        };
        let leaf = detached();
        for slot in slots.into_iter().flatten() {
            if !Arc::ptr_eq(slot, &leaf) {
                into.push(std::mem::replace(slot, leaf.clone()));
            }
        }
    }
}

// Operand chains can be millions of nodes deep; free them from a worklist
// instead of recursing through nested `Arc` drops.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_operands(&mut pending);
        while let Some(node) = pending.pop() {
            if let Some(mut inner) = Arc::into_inner(node) {
                inner.detach_operands(&mut pending);
            }
        }
    }
}

/// Distinct nodes reachable from `root`, operands before their users.
/// The root is always last. Iterative so deep fold chains cannot overflow
/// the stack.
pub(crate) fn post_order(root: &Arc<Expr>) -> Vec<Arc<Expr>> {
    let mut order = Vec::new();
    let mut seen: AHashSet<*const Expr> = AHashSet::new();
    let mut stack: Vec<(Arc<Expr>, bool)> = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        let key = Arc::as_ptr(&node);
        if expanded {
            if seen.insert(key) {
                order.push(node);
            }
            continue;
        }
        if seen.contains(&key) {
            continue;
        }
        let operands = node.operands();
        stack.push((node.clone(), true));
        // push right first so the left operand is emitted first
        for operand in operands.iter().rev().flatten() {
            if !seen.contains(&Arc::as_ptr(operand)) {
                stack.push(((*operand).clone(), false));
            }
        }
    }

    order
}

/// Apply a unary operator to a value
pub(crate) fn apply_unary(op: Opcode, a: f32) -> f32 {
    match op {
        Opcode::Square => a * a,
        Opcode::Sqrt => a.sqrt(),
        Opcode::Neg => -a,
        Opcode::Sin => a.sin(),
        Opcode::Cos => a.cos(),
        Opcode::Tan => a.tan(),
        Opcode::Asin => a.asin(),
        Opcode::Acos => a.acos(),
        Opcode::Atan => a.atan(),
        Opcode::Exp => a.exp(),
        Opcode::Abs => a.abs(),
        Opcode::Recip => 1.0 / a,
        Opcode::Log => a.ln(),
        _ => f32::NAN,
    }
}

/// Apply a binary operator to a pair of values
pub(crate) fn apply_binary(op: Opcode, a: f32, b: f32) -> f32 {
    match op {
        Opcode::Add => a + b,
        Opcode::Sub => a - b,
        Opcode::Mul => a * b,
        Opcode::Div => a / b,
        Opcode::Min => a.min(b),
        Opcode::Max => a.max(b),
        Opcode::Atan2 => a.atan2(b),
        Opcode::Pow => a.powf(b),
        Opcode::NthRoot => nth_root(a, b),
        // floored modulo: result takes the sign of the divisor
        Opcode::Mod => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        Opcode::NanFill => {
            if a.is_nan() {
                b
            } else {
                a
            }
        }
        Opcode::Compare => {
            if a < b {
                -1.0
            } else if a > b {
                1.0
            } else {
                0.0
            }
        }
        _ => f32::NAN,
    }
}

fn nth_root(a: f32, n: f32) -> f32 {
    let odd = n.fract() == 0.0 && (n as i64) % 2 != 0;
    if a < 0.0 && odd {
        -(-a).powf(1.0 / n)
    } else {
        a.powf(1.0 / n)
    }
}
