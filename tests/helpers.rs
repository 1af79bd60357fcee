//! Test utilities and fixtures for attention integration tests.
//!
//! Provides deterministic Q/K/V generation and numerical comparison helpers
//! shared by the CPU and GPU suites.

#![allow(dead_code)]

use anyhow::Result;
use candle_core::{DType, Device, Tensor};

/// Shape of a single Q/K/V tensor in framework layout.
#[derive(Debug, Clone, Copy)]
pub struct QkvShape {
    pub batch: usize,
    pub seq: usize,
    pub heads: usize,
    pub head_dim: usize,
}

impl QkvShape {
    pub const fn new(batch: usize, seq: usize, heads: usize, head_dim: usize) -> Self {
        Self {
            batch,
            seq,
            heads,
            head_dim,
        }
    }

    pub const fn dims(&self) -> (usize, usize, usize, usize) {
        (self.batch, self.seq, self.heads, self.head_dim)
    }

    pub const fn elem_count(&self) -> usize {
        self.batch * self.seq * self.heads * self.head_dim
    }
}

/// Accuracy metrics for numerical validation.
#[derive(Debug, Clone)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error.
    pub mae: f32,
    /// Maximum absolute error.
    pub max_error: f32,
    /// Cosine similarity between tensors.
    pub cosine_similarity: f32,
}

/// Test fixtures for Q/K/V tensors.
pub struct TestFixtures;

impl TestFixtures {
    /// Tensor of consecutive values starting at `offset`.
    pub fn sequential(shape: QkvShape, offset: f32, device: &Device) -> Result<Tensor> {
        let end = offset + shape.elem_count() as f32;
        Ok(Tensor::arange(offset, end, device)?.reshape(shape.dims())?)
    }

    /// Q, K, V of consecutive integers, each block following the previous one.
    pub fn sequential_qkv(shape: QkvShape, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
        let n = shape.elem_count() as f32;
        Ok((
            Self::sequential(shape, 0.0, device)?,
            Self::sequential(shape, n, device)?,
            Self::sequential(shape, 2.0 * n, device)?,
        ))
    }

    /// Normally distributed Q, K, V.
    pub fn random_qkv(
        q_shape: QkvShape,
        kv_seq: usize,
        dtype: DType,
        device: &Device,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let kv_shape = QkvShape {
            seq: kv_seq,
            ..q_shape
        };
        let q = Tensor::randn(0.0f32, 1.0, q_shape.dims(), device)?.to_dtype(dtype)?;
        let k = Tensor::randn(0.0f32, 1.0, kv_shape.dims(), device)?.to_dtype(dtype)?;
        let v = Tensor::randn(0.0f32, 1.0, kv_shape.dims(), device)?.to_dtype(dtype)?;
        Ok((q, k, v))
    }
}

/// Comparison helpers.
pub struct ValidationUtils;

impl ValidationUtils {
    /// Flatten any tensor to f32 values.
    pub fn values(t: &Tensor) -> Result<Vec<f32>> {
        Ok(t.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?)
    }

    /// Error metrics between a prediction and a target.
    pub fn accuracy(pred: &Tensor, target: &Tensor) -> Result<AccuracyMetrics> {
        let pred = Self::values(pred)?;
        let target = Self::values(target)?;
        assert_eq!(pred.len(), target.len(), "Tensor size mismatch");

        let mut mae = 0.0f32;
        let mut max_error = 0.0f32;
        let mut dot = 0.0f32;
        let mut pred_norm = 0.0f32;
        let mut target_norm = 0.0f32;
        for (p, t) in pred.iter().zip(&target) {
            let diff = (p - t).abs();
            mae += diff;
            max_error = max_error.max(diff);
            dot += p * t;
            pred_norm += p * p;
            target_norm += t * t;
        }
        mae /= pred.len() as f32;

        let cosine_similarity = if pred_norm > 0.0 && target_norm > 0.0 {
            dot / (pred_norm.sqrt() * target_norm.sqrt())
        } else {
            0.0
        };

        Ok(AccuracyMetrics {
            mae,
            max_error,
            cosine_similarity,
        })
    }

    /// Assert element-wise closeness.
    pub fn assert_close(pred: &Tensor, target: &Tensor, tol: f32) -> Result<()> {
        let metrics = Self::accuracy(pred, target)?;
        assert!(
            metrics.max_error <= tol,
            "max error {} exceeds tolerance {tol} ({metrics:?})",
            metrics.max_error
        );
        Ok(())
    }
}
