// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Host mesh representation and utilities

use super::BoundingBox;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>) -> Self {
        Self { position, normal }
    }

    /// Vertex at `position` with a placeholder normal
    pub fn at(position: Point3<f32>) -> Self {
        Self::new(position, Vector3::z())
    }
}

/// Triangle defined by three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub indices: [usize; 3],
}

impl Triangle {
    pub fn new(indices: [usize; 3]) -> Self {
        Self { indices }
    }
}

/// Triangular mesh handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new()
    }

    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            triangles: Vec::with_capacity(triangle_count),
        }
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self, vertex: Vertex) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_vertices(&self.vertices)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Unnormalized face normal; its length is twice the triangle area
    pub fn face_normal(&self, triangle: &Triangle) -> Vector3<f32> {
        let [a, b, c] = triangle.indices.map(|i| self.vertices[i].position);
        (b - a).cross(&(c - a))
    }

    /// Remove vertices not referenced by any triangle.
    /// Returns the number of vertices removed.
    pub fn remove_orphaned_vertices(&mut self) -> usize {
        let mut used = vec![false; self.vertices.len()];
        for triangle in &self.triangles {
            for &index in &triangle.indices {
                used[index] = true;
            }
        }

        let mut remap = vec![0usize; self.vertices.len()];
        let mut kept = Vec::with_capacity(self.vertices.len());
        for (old, vertex) in self.vertices.iter().enumerate() {
            if used[old] {
                remap[old] = kept.len();
                kept.push(*vertex);
            }
        }

        for triangle in &mut self.triangles {
            triangle.indices = triangle.indices.map(|i| remap[i]);
        }

        let removed = self.vertices.len() - kept.len();
        self.vertices = kept;
        removed
    }

    /// Recompute smooth vertex normals as the area-weighted average of the
    /// faces sharing each vertex
    pub fn recompute_normals(&mut self) {
        let mut sums: Vec<Vector3<f32>> = vec![Vector3::zeros(); self.vertices.len()];

        for triangle in &self.triangles {
            // cross product length already carries the area weight
            let weighted = self.face_normal(triangle);
            if weighted.norm() > 1e-12 {
                for &index in &triangle.indices {
                    sums[index] += weighted;
                }
            }
        }

        for (vertex, sum) in self.vertices.iter_mut().zip(sums) {
            vertex.normal = sum.try_normalize(1e-12).unwrap_or_else(Vector3::z);
        }
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ] {
            mesh.add_vertex(Vertex::at(p));
        }
        for t in [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]] {
            mesh.add_triangle(Triangle::new(t));
        }
        mesh
    }

    #[test]
    fn test_recompute_normals() {
        let mut mesh = tetrahedron();
        mesh.recompute_normals();

        assert!(mesh
            .vertices
            .iter()
            .all(|v| (v.normal.norm() - 1.0).abs() < 1e-5));

        // The origin corner sees three axis-aligned faces of equal area
        let n = mesh.vertices[0].normal;
        let expected = -1.0 / 3.0f32.sqrt();
        assert_relative_eq!(n.x, expected, epsilon = 1e-5);
        assert_relative_eq!(n.y, expected, epsilon = 1e-5);
        assert_relative_eq!(n.z, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_remove_orphaned_vertices() {
        let mut mesh = tetrahedron();
        mesh.add_vertex(Vertex::at(Point3::new(5.0, 5.0, 5.0)));
        mesh.triangles.retain(|t| !t.indices.contains(&3));

        assert_eq!(mesh.remove_orphaned_vertices(), 2);
        assert_eq!(mesh.vertex_count(), 3);
        assert!(mesh
            .triangles
            .iter()
            .all(|t| t.indices.iter().all(|&i| i < 3)));
    }
}
