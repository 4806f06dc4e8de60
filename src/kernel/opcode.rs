// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Operator codes understood by the geometry kernel

use serde::{Deserialize, Serialize};
use std::fmt;

/// Spatial coordinate variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn opcode(self) -> Opcode {
        match self {
            Axis::X => Opcode::VarX,
            Axis::Y => Opcode::VarY,
            Axis::Z => Opcode::VarZ,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Expression node operator.
///
/// Discriminants are the stable wire codes used by the binary tree archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Constant = 1,
    VarX = 2,
    VarY = 3,
    VarZ = 4,
    Square = 7,
    Sqrt = 8,
    Neg = 9,
    Sin = 10,
    Cos = 11,
    Tan = 12,
    Asin = 13,
    Acos = 14,
    Atan = 15,
    Exp = 16,
    Add = 17,
    Mul = 18,
    Min = 19,
    Max = 20,
    Sub = 21,
    Div = 22,
    Atan2 = 23,
    Pow = 24,
    NthRoot = 25,
    Mod = 26,
    NanFill = 27,
    Abs = 28,
    Recip = 29,
    Log = 30,
    Compare = 31,
}

impl Opcode {
    pub const ALL: [Opcode; 29] = [
        Opcode::Constant,
        Opcode::VarX,
        Opcode::VarY,
        Opcode::VarZ,
        Opcode::Square,
        Opcode::Sqrt,
        Opcode::Neg,
        Opcode::Sin,
        Opcode::Cos,
        Opcode::Tan,
        Opcode::Asin,
        Opcode::Acos,
        Opcode::Atan,
        Opcode::Exp,
        Opcode::Add,
        Opcode::Mul,
        Opcode::Min,
        Opcode::Max,
        Opcode::Sub,
        Opcode::Div,
        Opcode::Atan2,
        Opcode::Pow,
        Opcode::NthRoot,
        Opcode::Mod,
        Opcode::NanFill,
        Opcode::Abs,
        Opcode::Recip,
        Opcode::Log,
        Opcode::Compare,
    ];

    /// Number of operands (0, 1 or 2)
    pub fn arity(self) -> usize {
        match self {
            Opcode::Constant | Opcode::VarX | Opcode::VarY | Opcode::VarZ => 0,

            Opcode::Square
            | Opcode::Sqrt
            | Opcode::Neg
            | Opcode::Sin
            | Opcode::Cos
            | Opcode::Tan
            | Opcode::Asin
            | Opcode::Acos
            | Opcode::Atan
            | Opcode::Exp
            | Opcode::Abs
            | Opcode::Recip
            | Opcode::Log => 1,

            Opcode::Add
            | Opcode::Mul
            | Opcode::Min
            | Opcode::Max
            | Opcode::Sub
            | Opcode::Div
            | Opcode::Atan2
            | Opcode::Pow
            | Opcode::NthRoot
            | Opcode::Mod
            | Opcode::NanFill
            | Opcode::Compare => 2,
        }
    }

    /// Canonical name, as printed in S-expressions
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Constant => "const",
            Opcode::VarX => "x",
            Opcode::VarY => "y",
            Opcode::VarZ => "z",
            Opcode::Square => "square",
            Opcode::Sqrt => "sqrt",
            Opcode::Neg => "neg",
            Opcode::Sin => "sin",
            Opcode::Cos => "cos",
            Opcode::Tan => "tan",
            Opcode::Asin => "asin",
            Opcode::Acos => "acos",
            Opcode::Atan => "atan",
            Opcode::Exp => "exp",
            Opcode::Add => "+",
            Opcode::Mul => "*",
            Opcode::Min => "min",
            Opcode::Max => "max",
            Opcode::Sub => "-",
            Opcode::Div => "/",
            Opcode::Atan2 => "atan2",
            Opcode::Pow => "pow",
            Opcode::NthRoot => "nth-root",
            Opcode::Mod => "mod",
            Opcode::NanFill => "nan-fill",
            Opcode::Abs => "abs",
            Opcode::Recip => "recip",
            Opcode::Log => "log",
            Opcode::Compare => "compare",
        }
    }

    /// Look up an opcode by canonical or word name (`"+"` and `"add"` both work)
    pub fn from_name(name: &str) -> Option<Opcode> {
        let alias = match name {
            "add" => Some(Opcode::Add),
            "sub" => Some(Opcode::Sub),
            "mul" => Some(Opcode::Mul),
            "div" => Some(Opcode::Div),
            "constant" => Some(Opcode::Constant),
            "var-x" => Some(Opcode::VarX),
            "var-y" => Some(Opcode::VarY),
            "var-z" => Some(Opcode::VarZ),
            "negate" => Some(Opcode::Neg),
            "reciprocal" => Some(Opcode::Recip),
            "nth_root" => Some(Opcode::NthRoot),
            "nan_fill" => Some(Opcode::NanFill),
            _ => None,
        };
        alias.or_else(|| Opcode::ALL.iter().copied().find(|op| op.name() == name))
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Variable axis for `VarX`/`VarY`/`VarZ`
    pub fn axis(self) -> Option<Axis> {
        match self {
            Opcode::VarX => Some(Axis::X),
            Opcode::VarY => Some(Axis::Y),
            Opcode::VarZ => Some(Axis::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arity of a raw opcode code, or `None` if the code is unknown
pub fn opcode_arity(code: i32) -> Option<usize> {
    u8::try_from(code)
        .ok()
        .and_then(Opcode::from_code)
        .map(Opcode::arity)
}
