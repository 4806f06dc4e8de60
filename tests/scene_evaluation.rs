// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene evaluator caching, invalidation and failure handling, observed
//! through a kernel that counts and can refuse builds

use nalgebra::{Point3, Vector3};
use polyframe_implicit::geometry::BoundingBox;
use polyframe_implicit::kernel::{Axis, MeshBuffer, NodeHandle};
use polyframe_implicit::scene::{LocalTransform, Scene, ShapeOp, ShapeState};
use polyframe_implicit::{
    ArenaKernel, Error, GeometryKernel, KernelRef, MeshingMode, Opcode, PipelineConfig, Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct CountingKernel {
    inner: ArenaKernel,
    builds: AtomicUsize,
    renders: AtomicUsize,
    failing: AtomicBool,
}

impl CountingKernel {
    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn count(&self) -> Result<()> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::ResourceExhaustion("refusing builds".into()))
        } else {
            Ok(())
        }
    }
}

impl GeometryKernel for CountingKernel {
    fn build_constant(&self, value: f32) -> Result<NodeHandle> {
        self.count()?;
        self.inner.build_constant(value)
    }

    fn build_variable(&self, axis: Axis) -> Result<NodeHandle> {
        self.count()?;
        self.inner.build_variable(axis)
    }

    fn build_unary(&self, op: Opcode, operand: NodeHandle) -> Result<NodeHandle> {
        self.count()?;
        self.inner.build_unary(op, operand)
    }

    fn build_binary(&self, op: Opcode, lhs: NodeHandle, rhs: NodeHandle) -> Result<NodeHandle> {
        self.count()?;
        self.inner.build_binary(op, lhs, rhs)
    }

    fn remap(
        &self,
        tree: NodeHandle,
        x: NodeHandle,
        y: NodeHandle,
        z: NodeHandle,
    ) -> Result<NodeHandle> {
        self.count()?;
        self.inner.remap(tree, x, y, z)
    }

    fn retain_tree(&self, tree: NodeHandle) -> Result<NodeHandle> {
        self.inner.retain_tree(tree)
    }

    fn release_tree(&self, tree: NodeHandle) {
        self.inner.release_tree(tree)
    }

    fn is_valid(&self, tree: NodeHandle) -> bool {
        self.inner.is_valid(tree)
    }

    fn tree_eq(&self, a: NodeHandle, b: NodeHandle) -> bool {
        self.inner.tree_eq(a, b)
    }

    fn tree_opcode(&self, tree: NodeHandle) -> Result<Opcode> {
        self.inner.tree_opcode(tree)
    }

    fn constant_value(&self, tree: NodeHandle) -> Option<f32> {
        self.inner.constant_value(tree)
    }

    fn eval_point(&self, tree: NodeHandle, point: [f32; 3]) -> Result<f32> {
        self.inner.eval_point(tree, point)
    }

    fn render_mesh(
        &self,
        tree: NodeHandle,
        region: &BoundingBox,
        resolution: f32,
    ) -> Result<MeshBuffer> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.inner.render_mesh(tree, region, resolution)
    }

    fn print_tree(&self, tree: NodeHandle) -> Result<String> {
        self.inner.print_tree(tree)
    }

    fn parse_tree(&self, text: &str) -> Result<NodeHandle> {
        self.inner.parse_tree(text)
    }

    fn save_tree(&self, tree: NodeHandle) -> Result<Vec<u8>> {
        self.inner.save_tree(tree)
    }

    fn load_tree(&self, bytes: &[u8]) -> Result<NodeHandle> {
        self.inner.load_tree(bytes)
    }
}

fn scene_with(meshing: MeshingMode) -> (Arc<CountingKernel>, Scene) {
    let counting = Arc::new(CountingKernel::default());
    let kernel: KernelRef = counting.clone();
    let config = PipelineConfig {
        meshing,
        resolution: 0.1,
        ..PipelineConfig::default()
    };
    (counting, Scene::new(kernel, config))
}

fn moved(x: f32, y: f32, z: f32) -> LocalTransform {
    LocalTransform::from_translation(Vector3::new(x, y, z))
}

#[test]
fn unchanged_scene_makes_no_kernel_calls() {
    let (kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("part", ShapeOp::Difference);
    scene.add_child(root, "block", ShapeOp::Cuboid).unwrap();
    let hole = scene.add_child(root, "hole", ShapeOp::Cylinder).unwrap();
    scene.set_transform(hole, moved(0.0, 0.0, 0.2)).unwrap();

    let first = scene.tick();
    assert!(first.failed.is_empty());
    assert!(kernel.builds() > 0);
    assert_eq!(kernel.renders(), 1);

    let (builds, renders) = (kernel.builds(), kernel.renders());
    for _ in 0..3 {
        assert!(scene.tick().is_idle());
    }
    assert_eq!(kernel.builds(), builds);
    assert_eq!(kernel.renders(), renders);
}

#[test]
fn changing_one_child_keeps_sibling_cache() {
    let (kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("pair", ShapeOp::Union);
    let left = scene.add_child(root, "left", ShapeOp::Sphere).unwrap();
    let right = scene.add_child(root, "right", ShapeOp::Sphere).unwrap();
    scene.set_transform(left, moved(-0.5, 0.0, 0.0)).unwrap();
    scene.set_transform(right, moved(0.5, 0.0, 0.0)).unwrap();
    scene.tick();

    let right_before = scene.tree(right).unwrap().handle();
    let root_before = scene.tree(root).unwrap().handle();
    let builds = kernel.builds();

    scene.set_transform(left, moved(-0.6, 0.0, 0.0)).unwrap();
    let report = scene.tick();

    assert_eq!(report.evaluated, vec![root]);
    assert!(kernel.builds() > builds);
    assert_eq!(scene.tree(right).unwrap().handle(), right_before);
    assert_ne!(scene.tree(root).unwrap().handle(), root_before);
    assert!(scene.tree(root).unwrap().eval([-1.05, 0.0, 0.0]).unwrap() < 0.0);
}

#[test]
fn toggling_a_child_reevaluates_the_parent() {
    let (_kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("pair", ShapeOp::Union);
    scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
    let far = scene.add_child(root, "far", ShapeOp::Sphere).unwrap();
    scene.set_transform(far, moved(0.0, 0.9, 0.0)).unwrap();
    scene.tick();
    assert!(scene.tree(root).unwrap().eval([0.0, 1.2, 0.0]).unwrap() < 0.0);

    scene.set_enabled(far, false).unwrap();
    assert_eq!(scene.tick().evaluated, vec![root]);
    assert!(scene.tree(root).unwrap().eval([0.0, 1.2, 0.0]).unwrap() > 0.0);

    scene.set_enabled(far, true).unwrap();
    assert_eq!(scene.tick().evaluated, vec![root]);
    assert!(scene.tree(root).unwrap().eval([0.0, 1.2, 0.0]).unwrap() < 0.0);
}

#[test]
fn failed_evaluation_keeps_previous_tree_and_retries() {
    let (kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("pair", ShapeOp::Union);
    let ball = scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
    scene.add_child(root, "block", ShapeOp::Cuboid).unwrap();
    scene.tick();
    let before = scene.tree(root).unwrap().clone();
    let mesh_before = scene.mesh(root).unwrap().clone();

    kernel.set_failing(true);
    scene.set_transform(ball, moved(0.3, 0.0, 0.0)).unwrap();
    let report = scene.tick();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, root);
    assert!(matches!(report.failed[0].1, Error::ResourceExhaustion(_)));

    let node = scene.node(root).unwrap();
    assert_eq!(node.state(), ShapeState::Dirty);
    assert_eq!(scene.tree(root).unwrap().handle(), before.handle());
    assert!(before.is_valid());
    assert_eq!(scene.mesh(root), Some(&mesh_before));

    kernel.set_failing(false);
    let report = scene.tick();
    assert!(report.failed.is_empty());
    assert_eq!(report.evaluated, vec![root]);
    assert_eq!(scene.node(root).unwrap().state(), ShapeState::Clean);
    assert_eq!(scene.node(ball).unwrap().state(), ShapeState::Clean);
    assert!(!before.is_valid());
}

#[test]
fn persistently_failing_child_leaves_parent_settled() {
    let (kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("pair", ShapeOp::Union);
    scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
    let flat = scene.add_child(root, "flat", ShapeOp::Cuboid).unwrap();
    let squashed = LocalTransform {
        scale: Vector3::new(0.0, 1.0, 1.0),
        ..LocalTransform::default()
    };
    scene.set_transform(flat, squashed).unwrap();

    let first = scene.tick();
    assert_eq!(first.evaluated, vec![root]);
    assert_eq!(first.meshed, vec![root]);
    assert_eq!(scene.node(flat).unwrap().state(), ShapeState::Dirty);
    assert!(scene.node(flat).unwrap().cached_tree().is_none());

    let (builds, renders) = (kernel.builds(), kernel.renders());
    let evaluations = scene.stats().evaluations;
    for _ in 0..3 {
        assert!(scene.tick().is_idle());
    }
    assert_eq!(kernel.builds(), builds);
    assert_eq!(kernel.renders(), renders);
    assert_eq!(scene.stats().evaluations, evaluations);

    // a real change to the failed child is picked up again
    scene.set_transform(flat, moved(0.6, 0.0, 0.0)).unwrap();
    assert_eq!(scene.tick().evaluated, vec![root]);
    assert_eq!(scene.node(flat).unwrap().state(), ShapeState::Clean);
    assert!(scene.tree(root).unwrap().eval([1.05, 0.0, 0.0]).unwrap() < 0.0);
}

#[test]
fn disabled_roots_are_skipped() {
    let (kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("ball", ShapeOp::Sphere);
    scene.set_enabled(root, false).unwrap();
    assert!(scene.tick().is_idle());
    assert_eq!(kernel.builds(), 0);
    assert!(scene.tree(root).is_none());
}

#[test]
fn background_meshing_delivers_latest_revision() {
    let (_kernel, mut scene) = scene_with(MeshingMode::Background);
    let root = scene.add_root("ball", ShapeOp::Sphere);

    let first = scene.tick();
    assert_eq!(first.scheduled, vec![root]);
    assert!(scene.node(root).unwrap().is_rendering());

    // move before the first render is collected
    scene.set_transform(root, moved(3.0, 0.0, 0.0)).unwrap();
    scene.flush();

    let node = scene.node(root).unwrap();
    assert!(!node.is_rendering());
    let bbox = scene.mesh(root).unwrap().bounding_box();
    assert!((bbox.center().x - 3.0).abs() < 0.1);
    assert!(scene.tick().is_idle());
}

#[test]
fn background_and_blocking_agree() {
    let build = |meshing| {
        let (_kernel, mut scene) = scene_with(meshing);
        let root = scene.add_root("shell", ShapeOp::Shell { offset: 0.1 });
        scene.add_child(root, "block", ShapeOp::Cuboid).unwrap();
        scene.flush();
        scene.mesh(root).cloned()
    };
    let background = build(MeshingMode::Background).unwrap();
    let blocking = build(MeshingMode::Blocking).unwrap();
    assert!(!blocking.is_empty());
    assert_eq!(background, blocking);
}

#[test]
fn cache_stats_track_hits() {
    let (_kernel, mut scene) = scene_with(MeshingMode::Blocking);
    let root = scene.add_root("pair", ShapeOp::Intersection);
    let a = scene.add_child(root, "a", ShapeOp::Sphere).unwrap();
    scene.add_child(root, "b", ShapeOp::Cuboid).unwrap();
    scene.tick();
    let stats = scene.stats();
    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.cached_nodes, 3);
    assert_eq!(stats.evaluations, 3);

    scene.set_transform(a, moved(0.1, 0.0, 0.0)).unwrap();
    scene.tick();
    let stats = scene.stats();
    assert_eq!(stats.evaluations, 5);
    assert_eq!(stats.cache_hits, 1);
    assert!(stats.hit_rate() > 0.0);
    assert!(scene.region(root).unwrap().contains(&Point3::origin()));
}
