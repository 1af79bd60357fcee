// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for fused-attn-rs.

use thiserror::Error;

/// Result type alias for fused-attn-rs operations.
pub type Result<T> = std::result::Result<T, AttnError>;

/// Errors that can occur while packing inputs or dispatching attention.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AttnError {
    /// Shape mismatch between a tensor and what the call requires.
    #[error("shape mismatch for {tensor}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which tensor failed validation
        tensor: &'static str,
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Tensor has the wrong number of dimensions.
    #[error("rank mismatch for {tensor}: expected rank {expected}, got shape {actual:?}")]
    RankMismatch {
        /// Which tensor failed validation
        tensor: &'static str,
        /// Expected rank
        expected: usize,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Tensor has a zero-sized axis.
    #[error("empty dimension in {tensor}: shape {actual:?}")]
    EmptyDimension {
        /// Which tensor failed validation
        tensor: &'static str,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected backend cannot run this call.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// The backend needs a device the inputs are not on.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl AttnError {
    /// Shorthand for a rank check failure.
    pub(crate) fn rank(tensor: &'static str, expected: usize, actual: &[usize]) -> Self {
        Self::RankMismatch {
            tensor,
            expected,
            actual: actual.to_vec(),
        }
    }

    /// Shorthand for a zero-sized axis.
    pub(crate) fn empty(tensor: &'static str, actual: &[usize]) -> Self {
        Self::EmptyDimension {
            tensor,
            actual: actual.to_vec(),
        }
    }

    /// Shorthand for a shape check failure.
    pub(crate) fn shape(tensor: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            tensor,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
