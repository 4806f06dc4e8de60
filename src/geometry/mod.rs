// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - host mesh representation and post-processing

mod bbox;
mod mesh;
mod normals;

pub use bbox::BoundingBox;
pub use mesh::{Mesh, Triangle, Vertex};
pub use normals::{split_normals, NO_SPLIT_ANGLE};
