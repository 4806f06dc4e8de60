// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Expression trees and their lifetime contexts

pub mod context;
mod ops;
mod value;

pub use context::{active_depth, Context};
pub use value::Tree;
