// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene evaluation: a host-side graph of shape nodes turned into
//! expression trees and meshes.
//!
//! Nodes are primitives, unary modifiers or n-ary combinators. A root's tree
//! is placed by its world matrix; every other node's tree by its matrix
//! relative to the parent. Trees are cached per node and rebuilt only when
//! a fingerprint of the node's inputs changes.

mod description;
mod graph;
mod node;

pub use description::{SceneDescription, ShapeDescription};
pub use graph::{CacheStats, Scene, TickReport};
pub use node::{Arity, LocalTransform, MeshSettings, ShapeId, ShapeNode, ShapeOp, ShapeState};
