// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Surface-nets polygonizer.
//!
//! The region is split into a power-of-two grid per axis until every cell
//! side is at most `resolution`. Corners are sampled in parallel z-slabs;
//! each cell whose corners change sign gets one vertex at the mean of its
//! edge crossings, and each sign-changing interior grid edge emits a quad
//! between the four cells around it. Quads are wound so that face normals
//! point toward positive field values.

use super::{MeshBuffer, Tape};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use rayon::prelude::*;

/// Cube edges as corner index pairs; corner bit 0 = +x, bit 1 = +y, bit 2 = +z
const CELL_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

const NO_VERTEX: u32 = u32::MAX;

struct Grid {
    cells: [usize; 3],
    origin: [f32; 3],
    step: [f32; 3],
}

impl Grid {
    fn samples(&self) -> [usize; 3] {
        [self.cells[0] + 1, self.cells[1] + 1, self.cells[2] + 1]
    }

    fn sample_index(&self, i: usize, j: usize, k: usize) -> usize {
        let [sx, sy, _] = self.samples();
        i + sx * (j + sy * k)
    }

    fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.cells[0] * (j + self.cells[1] * k)
    }

    fn position(&self, i: f32, j: f32, k: f32) -> [f32; 3] {
        [
            self.origin[0] + i * self.step[0],
            self.origin[1] + j * self.step[1],
            self.origin[2] + k * self.step[2],
        ]
    }
}

fn inside(value: f32) -> bool {
    value < 0.0
}

fn cells_along(extent: f32, resolution: f32, max_cells: u32) -> Result<usize> {
    let mut cells: u32 = 1;
    while extent / cells as f32 > resolution {
        if cells.saturating_mul(2) > max_cells {
            return Err(Error::ResourceExhaustion(format!(
                "resolution {} over extent {} needs more than {} cells per axis",
                resolution, extent, max_cells
            )));
        }
        cells *= 2;
    }
    Ok(cells as usize)
}

fn allocate<T: Clone>(len: usize, fill: T, what: &str) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| {
        Error::ResourceExhaustion(format!("cannot allocate {} {} entries", len, what))
    })?;
    buffer.resize(len, fill);
    Ok(buffer)
}

/// Polygonize the zero set of `tape` inside `region`
pub(crate) fn polygonize(
    tape: &Tape,
    region: &BoundingBox,
    resolution: f32,
    max_cells_per_axis: u32,
) -> Result<MeshBuffer> {
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "resolution must be positive, got {}",
            resolution
        )));
    }
    let size = region.size();
    if !(region.is_valid() && size.x > 0.0 && size.y > 0.0 && size.z > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "render region {:?}..{:?} is empty",
            region.min, region.max
        )));
    }

    let cells = [
        cells_along(size.x, resolution, max_cells_per_axis)?,
        cells_along(size.y, resolution, max_cells_per_axis)?,
        cells_along(size.z, resolution, max_cells_per_axis)?,
    ];
    let grid = Grid {
        cells,
        origin: [region.min.x, region.min.y, region.min.z],
        step: [
            size.x / cells[0] as f32,
            size.y / cells[1] as f32,
            size.z / cells[2] as f32,
        ],
    };

    let values = sample(tape, &grid)?;
    let (vertices, cell_vertex) = place_vertices(&grid, &values)?;
    let triangles = connect(&grid, &values, &cell_vertex);

    Ok(MeshBuffer {
        vertices,
        triangles,
    })
}

fn sample(tape: &Tape, grid: &Grid) -> Result<Vec<f32>> {
    let [sx, sy, sz] = grid.samples();
    let mut values = allocate(sx * sy * sz, 0.0f32, "sample")?;

    values
        .par_chunks_mut(sx * sy)
        .enumerate()
        .for_each(|(k, slab)| {
            let mut scratch = Vec::with_capacity(tape.len());
            for j in 0..sy {
                for i in 0..sx {
                    let p = grid.position(i as f32, j as f32, k as f32);
                    slab[i + sx * j] = tape.eval(p, &mut scratch);
                }
            }
        });

    debug_assert_eq!(values.len(), sx * sy * sz);
    Ok(values)
}

fn place_vertices(grid: &Grid, values: &[f32]) -> Result<(Vec<[f32; 3]>, Vec<u32>)> {
    let [nx, ny, nz] = grid.cells;
    let mut cell_vertex = allocate(nx * ny * nz, NO_VERTEX, "cell")?;
    let mut vertices = Vec::new();

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let mut corners = [0.0f32; 8];
                let mut mask = 0u8;
                for (c, corner) in corners.iter_mut().enumerate() {
                    let (di, dj, dk) = (c & 1, (c >> 1) & 1, (c >> 2) & 1);
                    *corner = values[grid.sample_index(i + di, j + dj, k + dk)];
                    if inside(*corner) {
                        mask |= 1 << c;
                    }
                }
                if mask == 0 || mask == 0xff {
                    continue;
                }

                let mut sum = [0.0f32; 3];
                let mut crossings = 0u32;
                for &(a, b) in &CELL_EDGES {
                    if inside(corners[a]) == inside(corners[b]) {
                        continue;
                    }
                    let mut t = corners[a] / (corners[a] - corners[b]);
                    if !t.is_finite() {
                        t = 0.5;
                    }
                    let t = t.clamp(0.0, 1.0);
                    for (axis, total) in sum.iter_mut().enumerate() {
                        let pa = ((a >> axis) & 1) as f32;
                        let pb = ((b >> axis) & 1) as f32;
                        *total += pa + t * (pb - pa);
                    }
                    crossings += 1;
                }

                let n = crossings.max(1) as f32;
                let position = grid.position(
                    i as f32 + sum[0] / n,
                    j as f32 + sum[1] / n,
                    k as f32 + sum[2] / n,
                );
                cell_vertex[grid.cell_index(i, j, k)] = vertices.len() as u32;
                vertices.push(position);
            }
        }
    }

    Ok((vertices, cell_vertex))
}

fn connect(grid: &Grid, values: &[f32], cell_vertex: &[u32]) -> Vec<[u32; 3]> {
    let [nx, ny, nz] = grid.cells;
    let mut triangles = Vec::new();

    let mut emit = |quad: [usize; 4], lower_inside: bool| {
        let q = quad.map(|cell| cell_vertex[cell]);
        if q.contains(&NO_VERTEX) {
            return;
        }
        if lower_inside {
            triangles.push([q[0], q[1], q[2]]);
            triangles.push([q[0], q[2], q[3]]);
        } else {
            triangles.push([q[0], q[2], q[1]]);
            triangles.push([q[0], q[3], q[2]]);
        }
    };

    // Edges along x, surrounded by cells in the (y, z) plane
    for k in 1..nz {
        for j in 1..ny {
            for i in 0..nx {
                let a = inside(values[grid.sample_index(i, j, k)]);
                let b = inside(values[grid.sample_index(i + 1, j, k)]);
                if a == b {
                    continue;
                }
                emit(
                    [
                        grid.cell_index(i, j - 1, k - 1),
                        grid.cell_index(i, j, k - 1),
                        grid.cell_index(i, j, k),
                        grid.cell_index(i, j - 1, k),
                    ],
                    a,
                );
            }
        }
    }

    // Edges along y, surrounded by cells in the (z, x) plane
    for k in 1..nz {
        for j in 0..ny {
            for i in 1..nx {
                let a = inside(values[grid.sample_index(i, j, k)]);
                let b = inside(values[grid.sample_index(i, j + 1, k)]);
                if a == b {
                    continue;
                }
                emit(
                    [
                        grid.cell_index(i - 1, j, k - 1),
                        grid.cell_index(i - 1, j, k),
                        grid.cell_index(i, j, k),
                        grid.cell_index(i, j, k - 1),
                    ],
                    a,
                );
            }
        }
    }

    // Edges along z, surrounded by cells in the (x, y) plane
    for k in 0..nz {
        for j in 1..ny {
            for i in 1..nx {
                let a = inside(values[grid.sample_index(i, j, k)]);
                let b = inside(values[grid.sample_index(i, j, k + 1)]);
                if a == b {
                    continue;
                }
                emit(
                    [
                        grid.cell_index(i - 1, j - 1, k),
                        grid.cell_index(i, j - 1, k),
                        grid.cell_index(i, j, k),
                        grid.cell_index(i - 1, j, k),
                    ],
                    a,
                );
            }
        }
    }

    triangles
}
