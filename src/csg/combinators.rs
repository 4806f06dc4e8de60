// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean combinators over shape fields

use crate::error::{Error, Result};
use crate::tree::Tree;

fn fold(name: &str, shapes: &[Tree], step: impl Fn(&Tree, &Tree) -> Tree) -> Result<Tree> {
    let (first, rest) = shapes
        .split_first()
        .ok_or_else(|| Error::InvalidArgument(format!("{} of an empty shape list", name)))?;
    let mut acc = first.clone();
    for shape in rest {
        acc = step(&acc, shape);
    }
    acc.validated()
}

/// Union of all shapes (`min` fold). A single shape is returned as is.
pub fn union(shapes: &[Tree]) -> Result<Tree> {
    fold("union", shapes, |a, b| a.min(b))
}

/// Intersection of all shapes (`max` fold)
pub fn intersection(shapes: &[Tree]) -> Result<Tree> {
    fold("intersection", shapes, |a, b| a.max(b))
}

pub fn inverse(shape: &Tree) -> Result<Tree> {
    (-shape).validated()
}

/// First shape minus the union of the rest
pub fn difference(shapes: &[Tree]) -> Result<Tree> {
    match shapes {
        [] => Err(Error::InvalidArgument(
            "difference of an empty shape list".into(),
        )),
        [only] => only.clone().validated(),
        [first, rest @ ..] => {
            let cut = inverse(&union(rest)?)?;
            intersection(&[first.clone(), cut])
        }
    }
}

/// Smooth union of two shapes; larger `amount` rounds the seam more
pub fn blend(a: &Tree, b: &Tree, amount: f32) -> Result<Tree> {
    let seam = a.abs().sqrt() + b.abs().sqrt() - amount;
    union(&[a.clone(), b.clone(), seam])
}

/// Blend a list of shapes pairwise from the left
pub fn blend_all(shapes: &[Tree], amount: f32) -> Result<Tree> {
    let (first, rest) = shapes
        .split_first()
        .ok_or_else(|| Error::InvalidArgument("blend of an empty shape list".into()))?;
    let mut acc = first.clone().validated()?;
    for shape in rest {
        acc = blend(&acc, shape, amount)?;
    }
    Ok(acc)
}

/// Hollow shell of thickness `2 * offset` around the surface
pub fn shell(shape: &Tree, offset: f32) -> Result<Tree> {
    (shape.abs() - offset).validated()
}
