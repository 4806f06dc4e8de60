// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Operator overloading and math methods for [`Tree`]

use super::Tree;
use crate::kernel::Opcode;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Tree> for &Tree {
            type Output = Tree;
            fn $method(self, rhs: &Tree) -> Tree {
                self.apply_binary($op, rhs)
            }
        }

        impl $trait<Tree> for Tree {
            type Output = Tree;
            fn $method(self, rhs: Tree) -> Tree {
                self.apply_binary($op, &rhs)
            }
        }

        impl $trait<&Tree> for Tree {
            type Output = Tree;
            fn $method(self, rhs: &Tree) -> Tree {
                self.apply_binary($op, rhs)
            }
        }

        impl $trait<Tree> for &Tree {
            type Output = Tree;
            fn $method(self, rhs: Tree) -> Tree {
                self.apply_binary($op, &rhs)
            }
        }

        impl $trait<f32> for &Tree {
            type Output = Tree;
            fn $method(self, rhs: f32) -> Tree {
                self.apply_scalar($op, rhs, false)
            }
        }

        impl $trait<f32> for Tree {
            type Output = Tree;
            fn $method(self, rhs: f32) -> Tree {
                self.apply_scalar($op, rhs, false)
            }
        }

        impl $trait<&Tree> for f32 {
            type Output = Tree;
            fn $method(self, rhs: &Tree) -> Tree {
                rhs.apply_scalar($op, self, true)
            }
        }

        impl $trait<Tree> for f32 {
            type Output = Tree;
            fn $method(self, rhs: Tree) -> Tree {
                rhs.apply_scalar($op, self, true)
            }
        }
    };
}

binary_operator!(Add, add, Opcode::Add);
binary_operator!(Sub, sub, Opcode::Sub);
binary_operator!(Mul, mul, Opcode::Mul);
binary_operator!(Div, div, Opcode::Div);
binary_operator!(Rem, rem, Opcode::Mod);

impl Neg for &Tree {
    type Output = Tree;
    fn neg(self) -> Tree {
        self.apply_unary(Opcode::Neg)
    }
}

impl Neg for Tree {
    type Output = Tree;
    fn neg(self) -> Tree {
        self.apply_unary(Opcode::Neg)
    }
}

macro_rules! unary_methods {
    ($($(#[$doc:meta])* $name:ident => $op:expr),* $(,)?) => {
        impl Tree {
            $(
                $(#[$doc])*
                pub fn $name(&self) -> Tree {
                    self.apply_unary($op)
                }
            )*
        }
    };
}

macro_rules! binary_methods {
    ($($(#[$doc:meta])* $name:ident => $op:expr),* $(,)?) => {
        impl Tree {
            $(
                $(#[$doc])*
                pub fn $name(&self, other: &Tree) -> Tree {
                    self.apply_binary($op, other)
                }
            )*
        }
    };
}

unary_methods! {
    square => Opcode::Square,
    sqrt => Opcode::Sqrt,
    abs => Opcode::Abs,
    sin => Opcode::Sin,
    cos => Opcode::Cos,
    tan => Opcode::Tan,
    asin => Opcode::Asin,
    acos => Opcode::Acos,
    atan => Opcode::Atan,
    exp => Opcode::Exp,
    /// Natural logarithm
    ln => Opcode::Log,
    recip => Opcode::Recip,
}

binary_methods! {
    min => Opcode::Min,
    max => Opcode::Max,
    pow => Opcode::Pow,
    /// Real `n`th root; odd roots keep the sign of negative inputs
    nth_root => Opcode::NthRoot,
    atan2 => Opcode::Atan2,
    /// `other` wherever this tree evaluates to NaN
    nan_fill => Opcode::NanFill,
    /// -1, 0 or 1 as this tree is below, equal to or above `other`
    compare => Opcode::Compare,
}
