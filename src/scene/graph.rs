// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene graph with fingerprint-cached incremental evaluation

use super::node::{Arity, LocalTransform, MeshSettings, ShapeId, ShapeNode, ShapeOp, ShapeState};
use crate::config::{MeshingMode, PipelineConfig};
use crate::csg;
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mesh};
use crate::kernel::KernelRef;
use crate::render::render_mesh;
use crate::tree::{Context, Tree};
use ahash::RandomState;
use nalgebra::{Matrix4, Point3};
use std::hash::{BuildHasher, Hasher};

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub cached_nodes: usize,
    pub total_nodes: usize,
    /// Trees rebuilt since the scene was created
    pub evaluations: u64,
    /// Evaluations answered from a clean cache
    pub cache_hits: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        let lookups = self.evaluations + self.cache_hits;
        if lookups == 0 {
            0.0
        } else {
            (self.cache_hits as f32 / lookups as f32) * 100.0
        }
    }
}

/// What one [`Scene::tick`] or [`Scene::flush`] did
#[derive(Debug, Default)]
pub struct TickReport {
    /// Roots whose tree was rebuilt
    pub evaluated: Vec<ShapeId>,
    /// Roots that received a new mesh
    pub meshed: Vec<ShapeId>,
    /// Roots with a background render started
    pub scheduled: Vec<ShapeId>,
    /// Roots whose render was deferred because one was still outstanding
    pub deferred: Vec<ShapeId>,
    /// Results that arrived for a superseded revision
    pub discarded: usize,
    pub failed: Vec<(ShapeId, Error)>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.evaluated.is_empty()
            && self.meshed.is_empty()
            && self.scheduled.is_empty()
            && self.deferred.is_empty()
            && self.failed.is_empty()
            && self.discarded == 0
    }
}

/// A forest of shape nodes evaluated into expression trees.
///
/// Each node's tree is cached together with a fingerprint of everything it
/// depends on. [`tick`](Scene::tick) recomputes fingerprints, rebuilds the
/// trees that changed and meshes the roots.
pub struct Scene {
    kernel: KernelRef,
    config: PipelineConfig,
    nodes: Vec<ShapeNode>,
    roots: Vec<ShapeId>,
    hasher: RandomState,
    evaluations: u64,
    cache_hits: u64,
}

impl Scene {
    pub fn new(kernel: KernelRef, config: PipelineConfig) -> Self {
        Self {
            kernel,
            config,
            nodes: Vec::new(),
            roots: Vec::new(),
            hasher: RandomState::new(),
            evaluations: 0,
            cache_hits: 0,
        }
    }

    pub fn kernel(&self) -> &KernelRef {
        &self.kernel
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn roots(&self) -> &[ShapeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ShapeId) -> Result<&ShapeNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::InvalidArgument(format!("no {} in scene", id)))
    }

    fn node_mut(&mut self, id: ShapeId) -> Result<&mut ShapeNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidArgument(format!("no {} in scene", id)))
    }

    /// Find a shape by name
    pub fn find(&self, name: &str) -> Option<ShapeId> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(ShapeId)
    }

    fn default_settings(&self) -> MeshSettings {
        MeshSettings {
            bounds_size: self.config.bounds_size,
            resolution: self.config.resolution,
            splitting_angle: self.config.splitting_angle,
        }
    }

    fn push(&mut self, name: String, op: ShapeOp, parent: Option<ShapeId>) -> ShapeId {
        let id = ShapeId(self.nodes.len());
        let settings = self.default_settings();
        self.nodes.push(ShapeNode::new(name, op, parent, settings));
        id
    }

    pub fn add_root(&mut self, name: impl Into<String>, op: ShapeOp) -> ShapeId {
        let id = self.push(name.into(), op, None);
        self.roots.push(id);
        id
    }

    /// Attach a new shape under `parent`. Fails if the parent's operation
    /// cannot take another child.
    pub fn add_child(
        &mut self,
        parent: ShapeId,
        name: impl Into<String>,
        op: ShapeOp,
    ) -> Result<ShapeId> {
        let owner = self.node(parent)?;
        owner.op.check_children(owner.children.len() + 1)?;
        let id = self.push(name.into(), op, Some(parent));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn set_op(&mut self, id: ShapeId, op: ShapeOp) -> Result<()> {
        let node = self.node_mut(id)?;
        op.check_children(node.children.len())?;
        node.op = op;
        Ok(())
    }

    pub fn set_transform(&mut self, id: ShapeId, local: LocalTransform) -> Result<()> {
        self.node_mut(id)?.local = local;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: ShapeId, enabled: bool) -> Result<()> {
        self.node_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Change meshing parameters; only roots use them
    pub fn set_mesh_settings(&mut self, id: ShapeId, settings: MeshSettings) -> Result<()> {
        if !(settings.bounds_size > 0.0 && settings.resolution > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "bounds size and resolution must be positive, got {} and {}",
                settings.bounds_size, settings.resolution
            )));
        }
        if !(settings.splitting_angle >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "splitting angle must be non-negative, got {}",
                settings.splitting_angle
            )));
        }
        let node = self.node_mut(id)?;
        if node.settings != settings {
            node.settings = settings;
            node.revision += 1;
        }
        Ok(())
    }

    /// Cached tree of a shape, if it has one
    pub fn tree(&self, id: ShapeId) -> Option<&Tree> {
        self.nodes.get(id.0)?.cached.as_ref()
    }

    /// Latest mesh of a root shape
    pub fn mesh(&self, id: ShapeId) -> Option<&Mesh> {
        self.nodes.get(id.0)?.mesh.as_ref()
    }

    /// Render region of a root: a cube of `bounds_size` around its world
    /// position
    pub fn region(&self, id: ShapeId) -> Result<BoundingBox> {
        let node = self.node(id)?;
        let center = node.world.transform_point(&Point3::origin());
        Ok(BoundingBox::cube(center, node.settings.bounds_size))
    }

    /// Shapes in parents-before-children order
    fn topological(&self) -> Vec<ShapeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<ShapeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// Recompute world matrices and fingerprints, then mark every node whose
    /// fingerprint moved, or whose enabled children changed, as dirty.
    ///
    /// A node that already failed for its current fingerprint stays dirty
    /// but does not dirty its parent: rebuilding the parent would leave it
    /// out again.
    pub fn refresh(&mut self) {
        let order = self.topological();

        for &id in &order {
            let parent_world = match self.nodes[id.0].parent {
                Some(parent) => self.nodes[parent.0].world,
                None => Matrix4::identity(),
            };
            let node = &self.nodes[id.0];
            let local = node.local.to_matrix();
            let world = parent_world * local;

            let mut state = self.hasher.build_hasher();
            node.op.digest(&mut state);
            for value in local.iter().chain(world.iter()) {
                state.write_u32(value.to_bits());
            }
            for &child in &node.children {
                if self.nodes[child.0].enabled {
                    state.write_usize(child.0);
                }
            }
            let fingerprint = state.finish();

            let node = &mut self.nodes[id.0];
            node.world = world;
            node.observed = fingerprint;
        }

        // children before parents so changes reach every ancestor
        let mut changed = vec![false; self.nodes.len()];
        for &id in order.iter().rev() {
            let node = &self.nodes[id.0];
            if node.state == ShapeState::Evaluating {
                continue;
            }
            let stale = node.built_for != Some(node.observed);
            let known_failure = node.failed_for == Some(node.observed);
            let child_changed = node
                .children
                .iter()
                .any(|&child| self.nodes[child.0].enabled && changed[child.0]);
            changed[id.0] = (stale && !known_failure) || child_changed;
            if stale || child_changed {
                self.nodes[id.0].state = ShapeState::Dirty;
            }
        }
    }

    /// Tree for a shape, rebuilding it if dirty. `Ok(None)` means the shape
    /// contributes no geometry.
    ///
    /// On failure the previous cached tree stays in place and the node stays
    /// dirty, so the next tick retries it.
    pub fn evaluate(&mut self, id: ShapeId) -> Result<Option<Tree>> {
        match self.node(id)?.state {
            ShapeState::Evaluating => Err(Error::ContextDiscipline(format!(
                "{} ({}) is already being evaluated",
                id, self.nodes[id.0].name
            ))),
            ShapeState::Clean => {
                self.cache_hits += 1;
                let node = &self.nodes[id.0];
                tracing::debug!(shape = %node.name, "shape cache hit");
                Ok(node.cached.clone())
            }
            ShapeState::Dirty => self.rebuild(id),
        }
    }

    fn rebuild(&mut self, id: ShapeId) -> Result<Option<Tree>> {
        self.nodes[id.0].state = ShapeState::Evaluating;
        let outcome = self.build(id);
        let node = &mut self.nodes[id.0];

        match outcome {
            Ok(tree) => {
                if let Some(old) = node.cached.take() {
                    old.dispose();
                }
                node.cached = tree.clone();
                node.built_for = Some(node.observed);
                node.failed_for = None;
                node.state = ShapeState::Clean;
                node.revision += 1;
                self.evaluations += 1;
                tracing::debug!(shape = %node.name, op = %node.op, "evaluated shape");
                Ok(tree)
            }
            Err(err) => {
                node.state = ShapeState::Dirty;
                node.failed_for = Some(node.observed);
                tracing::warn!(shape = %node.name, error = %err, "shape evaluation failed");
                Err(err)
            }
        }
    }

    /// Child tree for use by a parent. Failures contribute no geometry.
    fn operand(&mut self, child: ShapeId) -> Option<Tree> {
        match self.evaluate(child) {
            Ok(tree) => tree,
            Err(err) => {
                tracing::warn!(shape = %child, error = %err, "skipping failed child shape");
                None
            }
        }
    }

    fn build(&mut self, id: ShapeId) -> Result<Option<Tree>> {
        let ctx = Context::enter();
        let node = &self.nodes[id.0];
        let op = node.op.clone();
        let placement = node.placement();
        let children: Vec<ShapeId> = node
            .children
            .iter()
            .copied()
            .filter(|child| self.nodes[child.0].enabled)
            .collect();

        let shape = match op.arity() {
            Arity::Nonary => Some(op.primitive(&self.kernel)?),
            Arity::Unary => match children.first() {
                Some(&child) => match self.operand(child) {
                    Some(tree) => Some(op.apply(&tree)?),
                    None => None,
                },
                None => None,
            },
            Arity::Nary => {
                let operands: Vec<Tree> = children
                    .into_iter()
                    .filter_map(|child| self.operand(child))
                    .collect();
                if operands.is_empty() {
                    None
                } else {
                    Some(op.combine(&operands)?)
                }
            }
        };

        let placed = match shape {
            Some(shape) => {
                let placed = csg::transform(&shape, &placement)?;
                ctx.remove(&placed)?;
                Some(placed)
            }
            None => None,
        };
        ctx.exit()?;
        Ok(placed)
    }

    /// Refresh, rebuild dirty roots and advance meshing
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        self.refresh();

        for root in self.roots.clone() {
            if !self.nodes[root.0].enabled {
                continue;
            }
            if self.nodes[root.0].state == ShapeState::Dirty {
                match self.evaluate(root) {
                    Ok(_) => report.evaluated.push(root),
                    Err(err) => report.failed.push((root, err)),
                }
            }
            self.collect(root, &mut report);
            self.advance_meshing(root, &mut report);
        }
        report
    }

    /// Take a finished background render, if any
    fn collect(&mut self, root: ShapeId, report: &mut TickReport) {
        if let Some((tag, result)) = self.nodes[root.0].render.poll() {
            self.accept(root, tag, result, report);
        }
    }

    fn accept(&mut self, root: ShapeId, tag: u64, result: Result<Mesh>, report: &mut TickReport) {
        let node = &mut self.nodes[root.0];
        if tag != node.revision {
            tracing::debug!(
                shape = %node.name,
                tag,
                current = node.revision,
                "discarding stale mesh"
            );
            report.discarded += 1;
            return;
        }
        match result {
            Ok(mesh) => {
                tracing::debug!(
                    shape = %node.name,
                    vertices = mesh.vertex_count(),
                    triangles = mesh.triangle_count(),
                    "mesh updated"
                );
                node.mesh = Some(mesh);
                node.meshed_revision = Some(tag);
                report.meshed.push(root);
            }
            Err(err) => {
                tracing::warn!(shape = %node.name, error = %err, "meshing failed");
                report.failed.push((root, err));
            }
        }
    }

    /// Nothing to mesh: clear the mesh and mark the revision done
    fn mark_empty(&mut self, root: ShapeId, report: &mut TickReport) {
        let node = &mut self.nodes[root.0];
        if node.mesh.take().is_some() {
            report.meshed.push(root);
        }
        node.meshed_revision = Some(node.revision);
    }

    fn advance_meshing(&mut self, root: ShapeId, report: &mut TickReport) {
        let node = &self.nodes[root.0];
        if node.mesh_is_current() || node.state != ShapeState::Clean {
            return;
        }
        let Some(tree) = node.cached.clone() else {
            self.mark_empty(root, report);
            return;
        };
        let region = match self.region(root) {
            Ok(region) => region,
            Err(err) => {
                report.failed.push((root, err));
                return;
            }
        };
        let settings = node.settings;
        let revision = node.revision;

        match self.config.meshing {
            MeshingMode::Blocking => {
                let result = render_mesh(
                    &tree,
                    &region,
                    settings.resolution,
                    settings.splitting_angle,
                );
                self.accept(root, revision, result, report);
            }
            MeshingMode::Background => {
                let node = &mut self.nodes[root.0];
                if node.render.pending_tag() == Some(revision) {
                    return;
                }
                match node.render.schedule(
                    revision,
                    &tree,
                    &region,
                    settings.resolution,
                    settings.splitting_angle,
                ) {
                    Ok(()) => report.scheduled.push(root),
                    Err(Error::JobConflict(_)) => report.deferred.push(root),
                    Err(err) => report.failed.push((root, err)),
                }
            }
        }
    }

    /// Run ticks, waiting on outstanding renders, until every enabled root's
    /// mesh matches its current tree
    pub fn flush(&mut self) -> TickReport {
        let mut report = self.tick();
        for root in self.roots.clone() {
            if !self.nodes[root.0].enabled {
                continue;
            }
            loop {
                if let Some((tag, result)) = self.nodes[root.0].render.wait() {
                    self.accept(root, tag, result, &mut report);
                }
                let node = &self.nodes[root.0];
                if node.mesh_is_current() || node.state != ShapeState::Clean {
                    break;
                }
                let before = report.failed.len();
                self.advance_meshing(root, &mut report);
                let node = &self.nodes[root.0];
                let stalled = !node.render.is_busy() && !node.mesh_is_current();
                if report.failed.len() > before || stalled {
                    break;
                }
            }
        }
        report
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_nodes: self
                .nodes
                .iter()
                .filter(|node| node.state == ShapeState::Clean)
                .count(),
            total_nodes: self.nodes.len(),
            evaluations: self.evaluations,
            cache_hits: self.cache_hits,
        }
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        for node in &mut self.nodes {
            if let Some(tree) = node.cached.take() {
                tree.dispose();
            }
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .field("meshing", &self.config.meshing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ArenaKernel;
    use nalgebra::Vector3;

    fn blocking_scene() -> Scene {
        let config = PipelineConfig {
            meshing: MeshingMode::Blocking,
            resolution: 0.1,
            ..PipelineConfig::default()
        };
        Scene::new(ArenaKernel::shared(), config)
    }

    #[test]
    fn test_second_tick_is_idle() {
        let mut scene = blocking_scene();
        let root = scene.add_root("union", ShapeOp::Union);
        scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
        scene.add_child(root, "block", ShapeOp::Cuboid).unwrap();

        let first = scene.tick();
        assert_eq!(first.evaluated, vec![root]);
        assert_eq!(first.meshed, vec![root]);
        assert!(scene.mesh(root).is_some());

        let evaluations = scene.stats().evaluations;
        assert!(scene.tick().is_idle());
        assert_eq!(scene.stats().evaluations, evaluations);
    }

    #[test]
    fn test_child_change_dirties_ancestors_only() {
        let mut scene = blocking_scene();
        let root = scene.add_root("union", ShapeOp::Union);
        let moved = scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
        let still = scene.add_child(root, "block", ShapeOp::Cuboid).unwrap();
        scene.tick();

        scene
            .set_transform(moved, LocalTransform::from_translation(Vector3::new(0.5, 0.0, 0.0)))
            .unwrap();
        scene.refresh();
        assert_eq!(scene.node(moved).unwrap().state(), ShapeState::Dirty);
        assert_eq!(scene.node(root).unwrap().state(), ShapeState::Dirty);
        assert_eq!(scene.node(still).unwrap().state(), ShapeState::Clean);

        let before = scene.stats().evaluations;
        scene.tick();
        assert_eq!(scene.stats().evaluations, before + 2);
    }

    #[test]
    fn test_moving_root_reevaluates_subtree() {
        let mut scene = blocking_scene();
        let root = scene.add_root("shell", ShapeOp::Shell { offset: 0.05 });
        let ball = scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
        scene.tick();

        scene
            .set_transform(root, LocalTransform::from_translation(Vector3::new(2.0, 0.0, 0.0)))
            .unwrap();
        scene.refresh();
        assert_eq!(scene.node(ball).unwrap().state(), ShapeState::Dirty);

        scene.tick();
        let tree = scene.tree(root).unwrap();
        // shell surface of the moved ball
        assert!(tree.eval([2.5, 0.0, 0.0]).unwrap() < 0.0);
        assert!(tree.eval([2.0, 0.0, 0.0]).unwrap() > 0.0);
        let region = scene.region(root).unwrap();
        assert!(region.contains(&Point3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_empty_operator_has_no_geometry() {
        let mut scene = blocking_scene();
        let root = scene.add_root("union", ShapeOp::Union);
        let report = scene.tick();
        assert!(report.failed.is_empty());
        assert!(scene.tree(root).is_none());
        assert!(scene.mesh(root).is_none());
    }

    #[test]
    fn test_disabled_children_are_skipped() {
        let mut scene = blocking_scene();
        let root = scene.add_root("diff", ShapeOp::Difference);
        let base = scene.add_child(root, "block", ShapeOp::Cuboid).unwrap();
        let cut = scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
        scene
            .set_transform(cut, LocalTransform::from_translation(Vector3::new(0.5, 0.0, 0.0)))
            .unwrap();
        scene.tick();
        assert!(scene.tree(root).unwrap().eval([0.4, 0.0, 0.0]).unwrap() > 0.0);

        scene.set_enabled(cut, false).unwrap();
        scene.tick();
        assert!(scene.tree(root).unwrap().eval([0.4, 0.0, 0.0]).unwrap() < 0.0);
        assert!(scene.node(base).unwrap().cached_tree().is_some());
    }

    #[test]
    fn test_arity_is_enforced() {
        let mut scene = blocking_scene();
        let ball = scene.add_root("ball", ShapeOp::Sphere);
        assert!(matches!(
            scene.add_child(ball, "nope", ShapeOp::Sphere),
            Err(Error::InvalidArgument(_))
        ));

        let inverse = scene.add_root("inverse", ShapeOp::Inverse);
        let child = scene.add_child(inverse, "a", ShapeOp::Sphere).unwrap();
        assert!(scene.add_child(inverse, "b", ShapeOp::Sphere).is_err());
        assert!(scene.set_op(inverse, ShapeOp::Sphere).is_err());
        assert!(scene.set_op(child, ShapeOp::Union).is_ok());
    }

    #[test]
    fn test_reentrant_evaluation_is_rejected() {
        let mut scene = blocking_scene();
        let ball = scene.add_root("ball", ShapeOp::Sphere);
        scene.refresh();
        scene.nodes[ball.0].state = ShapeState::Evaluating;
        assert!(matches!(
            scene.evaluate(ball),
            Err(Error::ContextDiscipline(_))
        ));
    }

    #[test]
    fn test_settings_change_remeshes_without_reevaluating() {
        let mut scene = blocking_scene();
        let ball = scene.add_root("ball", ShapeOp::Sphere);
        scene.tick();
        let evaluations = scene.stats().evaluations;

        let mut settings = *scene.node(ball).unwrap().settings();
        settings.splitting_angle = 0.0;
        scene.set_mesh_settings(ball, settings).unwrap();
        let report = scene.tick();
        assert_eq!(report.meshed, vec![ball]);
        assert!(report.evaluated.is_empty());
        assert_eq!(scene.stats().evaluations, evaluations);

        let mesh = scene.mesh(ball).unwrap();
        assert_eq!(mesh.vertex_count(), 3 * mesh.triangle_count());
    }
}
