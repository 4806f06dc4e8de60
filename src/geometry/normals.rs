// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Selective vertex-normal splitting for sharp edges

use super::{Mesh, Triangle};
use rayon::prelude::*;

/// Angle at or above which splitting is disabled
pub const NO_SPLIT_ANGLE: f32 = 180.0;

/// Recompute normals, duplicating vertices along sharp edges.
///
/// Starts from area-weighted smooth normals. Every triangle corner whose
/// smooth normal deviates from the triangle's face normal by at least
/// `threshold_deg` degrees gets a private copy of its vertex. Normals are then
/// recomputed over the new vertex sets and unreferenced vertices dropped.
///
/// A threshold of 180 or more leaves the smooth baseline untouched; a
/// threshold of 0 makes every triangle disjoint.
pub fn split_normals(mesh: &mut Mesh, threshold_deg: f32) {
    mesh.recompute_normals();
    if threshold_deg >= NO_SPLIT_ANGLE || mesh.triangles.is_empty() {
        return;
    }

    let flags = classify_corners(mesh, threshold_deg);

    let mut split = 0usize;
    for (triangle, corners) in mesh.triangles.iter_mut().zip(&flags) {
        for (slot, &sharp) in corners.iter().enumerate() {
            if sharp {
                let copy = mesh.vertices[triangle.indices[slot]];
                mesh.vertices.push(copy);
                triangle.indices[slot] = mesh.vertices.len() - 1;
                split += 1;
            }
        }
    }

    let orphaned = mesh.remove_orphaned_vertices();
    mesh.recompute_normals();
    tracing::debug!(split, orphaned, threshold_deg, "split vertex normals");
}

/// Per-triangle corner flags, computed in parallel against the smooth normals
fn classify_corners(mesh: &Mesh, threshold_deg: f32) -> Vec<[bool; 3]> {
    mesh.triangles
        .par_iter()
        .map(|triangle| corner_flags(mesh, triangle, threshold_deg))
        .collect()
}

fn corner_flags(mesh: &Mesh, triangle: &Triangle, threshold_deg: f32) -> [bool; 3] {
    let face = match mesh.face_normal(triangle).try_normalize(1e-12) {
        Some(n) => n,
        // degenerate faces have no direction; split them off entirely
        None => return [true; 3],
    };
    triangle.indices.map(|index| {
        let smooth = mesh.vertices[index].normal;
        let cos = face.dot(&smooth).clamp(-1.0, 1.0);
        cos.acos().to_degrees() >= threshold_deg
    })
}
