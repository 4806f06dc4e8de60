// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Constructive solid geometry over expression trees.
//!
//! Every function only allocates new tree nodes. Intermediate nodes register
//! with the active [`Context`](crate::tree::Context), so shape building is
//! normally done inside one. Results are validated: a failed build anywhere
//! in the expression is reported as `InvalidOperand`.

mod combinators;
mod primitives;
mod transforms;

pub use combinators::{blend, blend_all, difference, intersection, inverse, shell, union};
pub use primitives::{circle, cuboid, cylinder, ellipsoid, extrude, sphere};
pub use transforms::{
    reflect_x, reflect_xy, reflect_xz, reflect_y, reflect_yz, reflect_z, rotate_z, scale,
    symmetric_x, symmetric_y, symmetric_z, transform, translate,
};
