// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Background render jobs and their single-slot handoff

use super::{check_splitting_angle, finish};
use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Mesh};
use crate::kernel::{KernelRef, MeshBuffer};
use crate::tree::Tree;
use crossbeam_channel::{Receiver, TryRecvError};
use std::fmt;

/// A render running on the rayon pool.
///
/// Completing the job consumes it, so its result is marshaled exactly once.
/// Dropping an unfinished job discards the result when it arrives; the
/// kernel work itself always runs to completion.
#[must_use = "a render job does nothing useful unless polled or waited on"]
pub struct RenderJob {
    kernel: KernelRef,
    result: Receiver<Result<MeshBuffer>>,
    region: BoundingBox,
    resolution: f32,
    splitting_angle: f32,
}

/// Outcome of a non-blocking [`RenderJob::poll`]
#[must_use]
pub enum JobPoll {
    Pending(RenderJob),
    Ready(Result<Mesh>),
}

fn worker_lost() -> Error {
    Error::ResourceExhaustion("render worker stopped before producing a mesh".into())
}

/// Start polygonizing `tree` on a background worker.
///
/// The job holds its own handle on the tree, so the caller may release or
/// context-exit theirs immediately. The worker releases that handle when the
/// kernel returns.
pub fn schedule_render(
    tree: &Tree,
    region: &BoundingBox,
    resolution: f32,
    splitting_angle: f32,
) -> Result<RenderJob> {
    check_splitting_angle(splitting_angle)?;
    let retained = tree.retain()?;
    let kernel = retained.kernel().clone();
    let (sender, receiver) = crossbeam_channel::bounded(1);
    let target = *region;

    rayon::spawn(move || {
        let result = retained
            .kernel()
            .render_mesh(retained.handle(), &target, resolution);
        retained.dispose();
        if sender.send(result).is_err() {
            tracing::debug!("render job dropped before completion; result discarded");
        }
    });
    tracing::debug!(resolution, "scheduled background render");

    Ok(RenderJob {
        kernel,
        result: receiver,
        region: *region,
        resolution,
        splitting_angle,
    })
}

impl RenderJob {
    /// True once the worker has delivered its result
    pub fn is_finished(&self) -> bool {
        !self.result.is_empty()
    }

    pub fn region(&self) -> &BoundingBox {
        &self.region
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    fn complete(self, buffer: Result<MeshBuffer>) -> Result<Mesh> {
        finish(self.kernel.as_ref(), buffer?, self.splitting_angle)
    }

    /// Complete the job if its result is in, without blocking
    pub fn poll(self) -> JobPoll {
        match self.result.try_recv() {
            Ok(buffer) => JobPoll::Ready(self.complete(buffer)),
            Err(TryRecvError::Empty) => JobPoll::Pending(self),
            Err(TryRecvError::Disconnected) => JobPoll::Ready(Err(worker_lost())),
        }
    }

    /// Block until the worker finishes, then complete the job
    pub fn wait(self) -> Result<Mesh> {
        match self.result.recv() {
            Ok(buffer) => self.complete(buffer),
            Err(_) => Err(worker_lost()),
        }
    }
}

impl fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderJob")
            .field("region", &self.region)
            .field("resolution", &self.resolution)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Holds the one outstanding job of a render target.
///
/// Each job carries a caller-chosen tag (typically a revision counter) that is
/// returned with its result, so superseded results can be recognised and
/// dropped.
#[derive(Debug)]
pub struct RenderSlot {
    target: String,
    job: Option<(u64, RenderJob)>,
}

impl RenderSlot {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            job: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    /// Tag of the outstanding job, if any
    pub fn pending_tag(&self) -> Option<u64> {
        self.job.as_ref().map(|(tag, _)| *tag)
    }

    /// Schedule a render into this slot. Fails with `JobConflict` while a
    /// previous job is outstanding.
    pub fn schedule(
        &mut self,
        tag: u64,
        tree: &Tree,
        region: &BoundingBox,
        resolution: f32,
        splitting_angle: f32,
    ) -> Result<()> {
        if self.is_busy() {
            tracing::warn!(target_name = %self.target, tag, "render already outstanding");
            return Err(Error::JobConflict(self.target.clone()));
        }
        let job = schedule_render(tree, region, resolution, splitting_angle)?;
        self.job = Some((tag, job));
        Ok(())
    }

    /// Take the finished result, if there is one
    pub fn poll(&mut self) -> Option<(u64, Result<Mesh>)> {
        let (tag, job) = self.job.take()?;
        match job.poll() {
            JobPoll::Ready(result) => Some((tag, result)),
            JobPoll::Pending(job) => {
                self.job = Some((tag, job));
                None
            }
        }
    }

    /// Block on the outstanding job, if any
    pub fn wait(&mut self) -> Option<(u64, Result<Mesh>)> {
        let (tag, job) = self.job.take()?;
        Some((tag, job.wait()))
    }
}
