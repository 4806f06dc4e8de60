// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{Point3, Vector3};
use polyframe_implicit::geometry::split_normals;
use polyframe_implicit::scene::{LocalTransform, Scene, ShapeOp};
use polyframe_implicit::{
    csg, render_mesh, ArenaKernel, BoundingBox, KernelRef, MeshingMode, PipelineConfig, Tree,
};

fn sample_part(kernel: &KernelRef) -> Tree {
    let block = csg::cuboid(
        kernel,
        Point3::new(-1.0, -1.0, -1.0),
        Point3::new(1.0, 1.0, 1.0),
    )
    .unwrap();
    let ball = csg::sphere(kernel, 1.3, Point3::origin()).unwrap();
    let hole = csg::cylinder(kernel, 0.4, 4.0, Point3::new(0.0, 0.0, -2.0)).unwrap();
    let body = csg::intersection(&[block, ball]).unwrap();
    csg::difference(&[body, hole]).unwrap()
}

fn bench_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval");
    let kernel = ArenaKernel::shared();
    let part = sample_part(&kernel);

    group.bench_function("point", |b| {
        b.iter(|| part.eval(black_box([0.3, -0.2, 0.7])).unwrap());
    });

    group.bench_function("sexpr_parse", |b| {
        let text = part.to_sexpr().unwrap();
        b.iter(|| {
            let tree = Tree::from_sexpr(&kernel, black_box(&text)).unwrap();
            tree.dispose();
        });
    });

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.sample_size(10);
    let kernel = ArenaKernel::shared();
    let part = sample_part(&kernel);
    let region = BoundingBox::cube(Point3::origin(), 3.0);

    for resolution in [0.1f32, 0.05] {
        group.bench_with_input(
            BenchmarkId::new("part", resolution),
            &resolution,
            |b, &resolution| {
                b.iter(|| render_mesh(&part, &region, black_box(resolution), 180.0).unwrap());
            },
        );
    }

    let mesh = render_mesh(&part, &region, 0.05, 180.0).unwrap();
    group.bench_function("split_normals_30", |b| {
        b.iter(|| {
            let mut copy = mesh.clone();
            split_normals(&mut copy, black_box(30.0));
            copy
        });
    });

    group.finish();
}

fn bench_scene(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene");
    let config = PipelineConfig {
        meshing: MeshingMode::Blocking,
        resolution: 0.1,
        ..PipelineConfig::default()
    };

    group.bench_function("reevaluate_moved_child", |b| {
        let mut scene = Scene::new(config.kernel(), config.clone());
        let root = scene.add_root("union", ShapeOp::Union);
        let moving = scene.add_child(root, "ball", ShapeOp::Sphere).unwrap();
        for i in 0..8 {
            let child = scene.add_child(root, format!("block{}", i), ShapeOp::Cuboid).unwrap();
            let offset = Vector3::new(i as f32 * 0.1, 0.0, 0.0);
            scene.set_transform(child, LocalTransform::from_translation(offset)).unwrap();
        }
        scene.tick();

        let mut step = 0u32;
        b.iter(|| {
            step += 1;
            let offset = Vector3::new(0.0, (step % 10) as f32 * 0.01, 0.0);
            scene.set_transform(moving, LocalTransform::from_translation(offset)).unwrap();
            scene.refresh();
            scene.evaluate(root).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_eval, bench_render, bench_scene);
criterion_main!(benches);
