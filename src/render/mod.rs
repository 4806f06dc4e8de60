// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Meshing pipeline: kernel render, marshaling into host meshes and
//! normal splitting, either inline or on a background worker

mod job;

pub use job::{schedule_render, JobPoll, RenderJob, RenderSlot};

use crate::error::{Error, Result};
use crate::geometry::{split_normals, BoundingBox, Mesh, Triangle, Vertex};
use crate::kernel::{GeometryKernel, MeshBuffer};
use crate::tree::Tree;
use nalgebra::Point3;

fn check_splitting_angle(angle: f32) -> Result<()> {
    if angle >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "splitting angle must be a non-negative number of degrees, got {}",
            angle
        )))
    }
}

/// Copy a kernel buffer into host form and hand the buffer back to the
/// kernel. The buffer is released whether or not marshaling succeeds.
pub fn marshal(kernel: &dyn GeometryKernel, buffer: MeshBuffer) -> Result<Mesh> {
    let copied = copy_buffer(&buffer);
    kernel.release_mesh(buffer);
    copied
}

fn copy_buffer(buffer: &MeshBuffer) -> Result<Mesh> {
    let mut mesh = Mesh::new();
    mesh.vertices
        .try_reserve_exact(buffer.vertices.len())
        .and_then(|_| mesh.triangles.try_reserve_exact(buffer.triangles.len()))
        .map_err(|_| {
            Error::ResourceExhaustion(format!(
                "cannot allocate host mesh for {} vertices",
                buffer.vertices.len()
            ))
        })?;

    for &[x, y, z] in &buffer.vertices {
        mesh.add_vertex(Vertex::at(Point3::new(x, y, z)));
    }

    let count = mesh.vertex_count();
    for triangle in &buffer.triangles {
        let indices = triangle.map(|i| i as usize);
        if let Some(&bad) = indices.iter().find(|&&i| i >= count) {
            return Err(Error::InvalidArgument(format!(
                "kernel mesh references vertex {} of {}",
                bad, count
            )));
        }
        mesh.add_triangle(Triangle::new(indices));
    }

    Ok(mesh)
}

/// Marshal then split normals; shared by the blocking and background paths
pub(crate) fn finish(
    kernel: &dyn GeometryKernel,
    buffer: MeshBuffer,
    splitting_angle: f32,
) -> Result<Mesh> {
    let mut mesh = marshal(kernel, buffer)?;
    split_normals(&mut mesh, splitting_angle);
    Ok(mesh)
}

/// Polygonize `tree` over `region` on the calling thread.
///
/// `resolution` is the half-feature size handed to the kernel;
/// `splitting_angle` is in degrees (180 disables splitting).
pub fn render_mesh(
    tree: &Tree,
    region: &BoundingBox,
    resolution: f32,
    splitting_angle: f32,
) -> Result<Mesh> {
    check_splitting_angle(splitting_angle)?;
    let tree = tree.clone().validated()?;
    let kernel = tree.kernel();
    let buffer = kernel.render_mesh(tree.handle(), region, resolution)?;
    let mesh = finish(kernel.as_ref(), buffer, splitting_angle)?;
    tracing::debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        resolution,
        "rendered mesh"
    );
    Ok(mesh)
}
