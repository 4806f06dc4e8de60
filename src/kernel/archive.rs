// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Binary tree archive.
//!
//! Layout (little endian):
//!
//! ```text
//! magic "PFIT" | version u8 | node count u32 | nodes...
//! node := opcode u8, then
//!         constant: f32 bits
//!         variable: nothing
//!         unary:    operand index u32
//!         binary:   lhs index u32, rhs index u32
//! ```
//!
//! Nodes are stored operands-first, each distinct node once; indices always
//! point at earlier nodes and the last node is the root. Shared sub-nodes
//! therefore stay shared after a load.

use super::expr::{post_order, Expr};
use super::Opcode;
use crate::error::{Error, Result};
use ahash::AHashMap;
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"PFIT";
const VERSION: u8 = 1;

pub(crate) fn encode(root: &Arc<Expr>) -> Vec<u8> {
    let nodes = post_order(root);
    let mut index: AHashMap<*const Expr, u32> = AHashMap::with_capacity(nodes.len());
    let slot = |index: &AHashMap<*const Expr, u32>, node: &Arc<Expr>| {
        index.get(&Arc::as_ptr(node)).copied().unwrap_or(0)
    };

    let mut out = Vec::with_capacity(9 + nodes.len() * 9);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(nodes.len() as u32).to_le_bytes());

    for (i, node) in nodes.iter().enumerate() {
        out.push(node.opcode().code());
        match node.as_ref() {
            Expr::Constant(value) => out.extend_from_slice(&value.to_bits().to_le_bytes()),
            Expr::Var(_) => {}
            Expr::Unary(_, a) => out.extend_from_slice(&slot(&index, a).to_le_bytes()),
            Expr::Binary(_, a, b) => {
                out.extend_from_slice(&slot(&index, a).to_le_bytes());
                out.extend_from_slice(&slot(&index, b).to_le_bytes());
            }
        }
        index.insert(Arc::as_ptr(node), i as u32);
    }

    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let chunk = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(chunk)
            }
            None => Err(Error::Malformed(format!(
                "archive truncated at byte {}",
                self.pos
            ))),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Arc<Expr>> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(4)? != MAGIC {
        return Err(Error::Malformed("not a tree archive".into()));
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(Error::Malformed(format!(
            "unsupported archive version {}",
            version
        )));
    }

    let count = reader.u32()? as usize;
    if count == 0 {
        return Err(Error::Malformed("archive holds no nodes".into()));
    }
    // every node takes at least one byte
    let mut nodes: Vec<Arc<Expr>> = Vec::with_capacity(count.min(reader.remaining()));

    for i in 0..count {
        let code = reader.u8()?;
        let op = Opcode::from_code(code)
            .ok_or_else(|| Error::Malformed(format!("unknown opcode {} at node {}", code, i)))?;
        let operand = |reader: &mut Reader<'_>| -> Result<Arc<Expr>> {
            let at = reader.u32()? as usize;
            nodes.get(at).cloned().ok_or_else(|| {
                Error::Malformed(format!("node {} refers forward to node {}", i, at))
            })
        };

        let node = match (op.arity(), op.axis()) {
            (0, Some(axis)) => Expr::Var(axis),
            (0, None) => Expr::Constant(f32::from_bits(reader.u32()?)),
            (1, _) => Expr::Unary(op, operand(&mut reader)?),
            _ => {
                let a = operand(&mut reader)?;
                let b = operand(&mut reader)?;
                Expr::Binary(op, a, b)
            }
        };
        nodes.push(Arc::new(node));
    }

    if reader.remaining() != 0 {
        return Err(Error::Malformed(format!(
            "{} trailing bytes after archive",
            reader.remaining()
        )));
    }

    nodes
        .pop()
        .ok_or_else(|| Error::Malformed("archive holds no nodes".into()))
}
