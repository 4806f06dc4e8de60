// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Implicit
//!
//! Solid modeling with implicit-surface expression trees. Shapes are signed
//! distance style fields built from arithmetic over `x`, `y` and `z`; the
//! kernel evaluates them at points and polygonizes them into meshes.
//!
//! - [`kernel`]: the opaque geometry kernel behind handle-based trees
//! - [`tree`]: the [`Tree`] value type, its operators and lifetime [`Context`]s
//! - [`csg`]: primitives, booleans and spatial transforms
//! - [`render`]: blocking and background meshing with normal splitting
//! - [`scene`]: a cached, incrementally evaluated graph of shape nodes

pub mod config;
pub mod csg;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod render;
pub mod scene;
pub mod tree;

pub use config::{MeshingMode, PipelineConfig};
pub use error::{Error, Result};
pub use geometry::{BoundingBox, Mesh};
pub use kernel::{ArenaKernel, GeometryKernel, KernelRef, Opcode};
pub use render::{render_mesh, schedule_render, RenderJob};
pub use scene::{Scene, SceneDescription, ShapeOp};
pub use tree::{Context, Tree};
