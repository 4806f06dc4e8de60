// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types shared by the kernel, tree algebra, scene evaluator and
//! meshing pipeline

use thiserror::Error;

/// Errors raised by tree construction, context handling and meshing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A null, released or foreign handle was passed where a tree is required
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// An argument outside the operation's domain (empty shape list,
    /// unknown opcode, non-positive resolution, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lifetime context stack misuse
    #[error("context discipline violated: {0}")]
    ContextDiscipline(String),

    /// The kernel could not allocate what a render or build needed
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// A render job is already outstanding for the target
    #[error("render job already outstanding for {0}")]
    JobConflict(String),

    /// Serialized trees or scene descriptions that could not be decoded
    #[error("malformed input: {0}")]
    Malformed(String),

    /// File access failed while saving or loading
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
