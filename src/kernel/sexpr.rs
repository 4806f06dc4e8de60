// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Textual S-expression form of expression trees, e.g. `(+ (square x) 1)`

use super::expr::{post_order, Expr};
use super::Opcode;
use crate::error::{Error, Result};
use ahash::AHashMap;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::sync::Arc;

/// Nesting limit for parsed input
const MAX_DEPTH: usize = 512;

/// Printed nesting at which an unshared chain is split into a binding, so
/// every printed tree stays within [`MAX_DEPTH`]
const BIND_DEPTH: usize = 128;

enum Step<'a> {
    Node(&'a Arc<Expr>, bool),
    Text(&'static str),
}

struct Layout<'a> {
    index: AHashMap<*const Expr, usize>,
    names: Vec<Option<String>>,
    nodes: &'a [Arc<Expr>],
}

impl Layout<'_> {
    fn slot(&self, node: &Arc<Expr>) -> usize {
        self.index.get(&Arc::as_ptr(node)).copied().unwrap_or(0)
    }

    /// Write `start` into `out`; bound operands are written by name
    fn emit(&self, out: &mut String, start: &Arc<Expr>) {
        let mut stack = vec![Step::Node(start, true)];
        while let Some(step) = stack.pop() {
            let (node, top) = match step {
                Step::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                Step::Node(node, top) => (node, top),
            };
            if let (Some(name), false) = (&self.names[self.slot(node)], top) {
                out.push_str(name);
                continue;
            }
            match node.as_ref() {
                Expr::Constant(value) => out.push_str(&value.to_string()),
                Expr::Var(axis) => out.push_str(axis.opcode().name()),
                Expr::Unary(op, a) => {
                    out.push('(');
                    out.push_str(op.name());
                    out.push(' ');
                    stack.push(Step::Text(")"));
                    stack.push(Step::Node(a, false));
                }
                Expr::Binary(op, a, b) => {
                    out.push('(');
                    out.push_str(op.name());
                    out.push(' ');
                    stack.push(Step::Text(")"));
                    stack.push(Step::Node(b, false));
                    stack.push(Step::Text(" "));
                    stack.push(Step::Node(a, false));
                }
            }
        }
    }
}

/// Print a tree. Sub-expressions used more than once, and chains nested
/// deeper than [`BIND_DEPTH`], are bound once in a leading `let`, so the
/// output is linear in the number of distinct nodes.
pub(crate) fn print(root: &Arc<Expr>) -> String {
    let nodes = post_order(root);
    let index: AHashMap<*const Expr, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (Arc::as_ptr(node), i))
        .collect();
    let slot = |node: &Arc<Expr>| index.get(&Arc::as_ptr(node)).copied().unwrap_or(0);

    let mut uses = vec![0usize; nodes.len()];
    for node in &nodes {
        for operand in node.operands().into_iter().flatten() {
            uses[slot(operand)] += 1;
        }
    }

    let last = nodes.len().saturating_sub(1);
    let mut depth = vec![0usize; nodes.len()];
    let mut names: Vec<Option<String>> = vec![None; nodes.len()];
    let mut bound = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if matches!(node.as_ref(), Expr::Constant(_) | Expr::Var(_)) {
            continue;
        }
        let nested = node
            .operands()
            .into_iter()
            .flatten()
            .map(|operand| {
                let j = slot(operand);
                if names[j].is_some() {
                    0
                } else {
                    depth[j]
                }
            })
            .max()
            .unwrap_or(0);
        depth[i] = nested + 1;
        if i != last && (uses[i] > 1 || depth[i] >= BIND_DEPTH) {
            names[i] = Some(format!("_{}", bound.len()));
            bound.push(i);
        }
    }

    let layout = Layout {
        index,
        names,
        nodes: &nodes,
    };
    let mut out = String::new();
    if !bound.is_empty() {
        out.push_str("(let (");
        for (k, &i) in bound.iter().enumerate() {
            if k > 0 {
                out.push(' ');
            }
            out.push('(');
            if let Some(name) = &layout.names[i] {
                out.push_str(name);
            }
            out.push(' ');
            layout.emit(&mut out, &layout.nodes[i]);
            out.push(')');
        }
        out.push_str(") ");
    }
    layout.emit(&mut out, root);
    if !bound.is_empty() {
        out.push(')');
    }
    out
}

#[derive(Parser)]
#[grammar = "kernel/sexpr.pest"]
struct SexprParser;

/// Deepest nesting accepted before parsing starts
fn nesting_depth(input: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Names bound by enclosing `let`s, innermost last
type Scope<'a> = Vec<(&'a str, Arc<Expr>)>;

fn build<'a>(pair: Pair<'a, Rule>, scope: &mut Scope<'a>) -> Result<Arc<Expr>> {
    match pair.as_rule() {
        Rule::symbol => {
            let name = pair.as_str();
            match scope.iter().rev().find(|(bound, _)| *bound == name) {
                Some((_, node)) => Ok(node.clone()),
                None => atom_expr(name),
            }
        }
        Rule::let_expr => {
            let outer = scope.len();
            let mut inner = pair.into_inner();
            let bindings = inner
                .next()
                .ok_or_else(|| Error::Malformed("let without bindings".into()))?;
            for binding in bindings.into_inner() {
                let mut parts = binding.into_inner();
                let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                    return Err(Error::Malformed("incomplete let binding".into()));
                };
                let node = build(value, scope)?;
                scope.push((name.as_str(), node));
            }
            let body = inner
                .next()
                .ok_or_else(|| Error::Malformed("let without body".into()))?;
            let result = build(body, scope);
            scope.truncate(outer);
            result
        }
        Rule::list => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .map(|p| p.as_str())
                .ok_or_else(|| Error::Malformed("expected operator after '('".into()))?;
            let op = Opcode::from_name(name)
                .ok_or_else(|| Error::Malformed(format!("unknown operator '{}'", name)))?;

            let args = inner
                .map(|arg| build(arg, scope))
                .collect::<Result<Vec<_>>>()?;
            if args.len() != op.arity() || op.arity() == 0 {
                return Err(Error::Malformed(format!(
                    "operator '{}' takes {} operands, got {}",
                    op,
                    op.arity(),
                    args.len()
                )));
            }
            let mut args = args.into_iter();
            Ok(match (args.next(), args.next()) {
                (Some(a), None) => Arc::new(Expr::Unary(op, a)),
                (Some(a), Some(b)) => Arc::new(Expr::Binary(op, a, b)),
                _ => return Err(Error::Malformed(format!("operator '{}' has no operands", op))),
            })
        }
        rule => Err(Error::Malformed(format!("unexpected {:?}", rule))),
    }
}

fn atom_expr(atom: &str) -> Result<Arc<Expr>> {
    if let Some(axis) = Opcode::from_name(atom).and_then(Opcode::axis) {
        return Ok(Arc::new(Expr::Var(axis)));
    }
    atom.parse::<f32>()
        .map(|value| Arc::new(Expr::Constant(value)))
        .map_err(|_| Error::Malformed(format!("unrecognized atom '{}'", atom)))
}

/// Parse a single S-expression
pub(crate) fn parse(input: &str) -> Result<Arc<Expr>> {
    if nesting_depth(input) > MAX_DEPTH {
        return Err(Error::Malformed("expression nested too deeply".into()));
    }
    let mut pairs = SexprParser::parse(Rule::tree, input)
        .map_err(|err| Error::Malformed(format!("invalid S-expression: {}", err)))?;
    let root = pairs
        .next()
        .and_then(|tree| tree.into_inner().next())
        .ok_or_else(|| Error::Malformed("unexpected end of input".into()))?;
    build(root, &mut Vec::new())
}
