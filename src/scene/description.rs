// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Serializable scene descriptions (JSON or TOML)

use super::graph::Scene;
use super::node::{LocalTransform, MeshSettings, ShapeId, ShapeOp};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::kernel::KernelRef;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn enabled_by_default() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// One shape and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescription {
    pub name: String,
    pub shape: ShapeOp,
    #[serde(default)]
    pub transform: LocalTransform,
    #[serde(default = "enabled_by_default", skip_serializing_if = "is_true")]
    pub enabled: bool,
    /// Per-shape overrides of the pipeline defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitting_angle: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ShapeDescription>,
}

impl ShapeDescription {
    pub fn new(name: impl Into<String>, shape: ShapeOp) -> Self {
        Self {
            name: name.into(),
            shape,
            transform: LocalTransform::default(),
            enabled: true,
            bounds_size: None,
            resolution: None,
            splitting_angle: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ShapeDescription>) -> Self {
        self.children = children;
        self
    }

    pub fn with_transform(mut self, transform: LocalTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// A whole scene: a list of root shapes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub shapes: Vec<ShapeDescription>,
}

impl SceneDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::Malformed(format!("scene description: {}", err)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| Error::Malformed(format!("scene description: {}", err)))
    }

    /// Read a `.json` or `.toml` description
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("toml") => Self::from_toml(&text),
            other => Err(Error::InvalidArgument(format!(
                "unsupported scene format {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| Error::Malformed(format!("scene description: {}", err)))
    }

    /// Build a scene on `kernel`; shapes without overrides take the
    /// config's meshing defaults
    pub fn build(&self, kernel: KernelRef, config: PipelineConfig) -> Result<Scene> {
        let mut scene = Scene::new(kernel, config);
        for shape in &self.shapes {
            let id = scene.add_root(shape.name.clone(), shape.shape.clone());
            configure(&mut scene, id, shape)?;
        }
        tracing::debug!(shapes = scene.len(), roots = scene.roots().len(), "built scene");
        Ok(scene)
    }

    /// Describe an existing scene
    pub fn from_scene(scene: &Scene) -> Result<Self> {
        let shapes = scene
            .roots()
            .iter()
            .map(|&root| describe(scene, root))
            .collect::<Result<_>>()?;
        Ok(Self { shapes })
    }
}

fn configure(scene: &mut Scene, id: ShapeId, shape: &ShapeDescription) -> Result<()> {
    scene.set_transform(id, shape.transform)?;
    scene.set_enabled(id, shape.enabled)?;

    let defaults = *scene.node(id)?.settings();
    let settings = MeshSettings {
        bounds_size: shape.bounds_size.unwrap_or(defaults.bounds_size),
        resolution: shape.resolution.unwrap_or(defaults.resolution),
        splitting_angle: shape.splitting_angle.unwrap_or(defaults.splitting_angle),
    };
    scene.set_mesh_settings(id, settings)?;

    for child in &shape.children {
        let child_id = scene.add_child(id, child.name.clone(), child.shape.clone())?;
        configure(scene, child_id, child)?;
    }
    Ok(())
}

fn describe(scene: &Scene, id: ShapeId) -> Result<ShapeDescription> {
    let node = scene.node(id)?;
    let defaults = scene.config();
    let settings = node.settings();
    let differs = |value: f32, default: f32| (value != default).then_some(value);

    Ok(ShapeDescription {
        name: node.name().to_string(),
        shape: node.op().clone(),
        transform: *node.transform(),
        enabled: node.is_enabled(),
        bounds_size: differs(settings.bounds_size, defaults.bounds_size),
        resolution: differs(settings.resolution, defaults.resolution),
        splitting_angle: differs(settings.splitting_angle, defaults.splitting_angle),
        children: node
            .children()
            .iter()
            .map(|&child| describe(scene, child))
            .collect::<Result<_>>()?,
    })
}
