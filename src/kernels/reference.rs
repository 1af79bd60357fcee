// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Unfused reference attention.
//!
//! Computes the same function as a fused kernel using plain Candle ops:
//!
//! ```text
//! scores = Q·K^T, scaled and biased per AttnBiasType
//! scores = masked positions replaced by MASKED_SCORE
//! probs  = dropout(softmax(scores))
//! out    = probs·V
//! ```
//!
//! The full `[batch, heads, seq_q, seq_kv]` score matrix is materialized, so
//! memory is quadratic in sequence length. Runs on any Candle device and serves
//! as the fallback and correctness oracle for vendor backends.

use candle_core::{DType, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::kernels::backend::{validate_call, FusedAttentionKernel};
use crate::kernels::config::{AttentionParams, AttnBiasType};
use crate::kernels::layout::AttentionInput;
use crate::kernels::mask::effective_mask;

/// Score assigned to masked positions before softmax.
///
/// Finite so that a fully masked row yields a uniform distribution instead of NaN.
pub const MASKED_SCORE: f32 = -1.0e9;

/// Candle-ops attention backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKernel;

impl ReferenceKernel {
    /// Create the reference backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// `[b, s, h, d]` -> `[b, h, s, d]` in f32.
fn heads_first(t: &Tensor) -> Result<Tensor> {
    Ok(t.to_dtype(DType::F32)?.transpose(1, 2)?.contiguous()?)
}

fn apply_dropout(probs: &Tensor, p: f32, seed: Option<u64>) -> Result<Tensor> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let keep = 1.0 - p;
    let scale = 1.0 / keep;
    let keep_mask: Vec<f32> = (0..probs.elem_count())
        .map(|_| if rng.gen::<f32>() < keep { scale } else { 0.0 })
        .collect();
    let keep_mask = Tensor::from_vec(keep_mask, probs.dims(), probs.device())?;
    Ok(probs.mul(&keep_mask)?)
}

impl FusedAttentionKernel for ReferenceKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn supports(
        &self,
        _input: &AttentionInput,
        _bias: Option<&Tensor>,
        _params: &AttentionParams,
    ) -> bool {
        true
    }

    fn forward(
        &self,
        input: &AttentionInput,
        bias: Option<&Tensor>,
        mask: &Tensor,
        seed: Option<u64>,
        params: &AttentionParams,
    ) -> Result<Tensor> {
        validate_call(input, bias, mask, params)?;
        let dims = input.dims();
        let scale = params.scaling_factor(&dims);

        let (q, k, v) = input.split()?;
        let q = heads_first(&q)?;
        let k = heads_first(&k)?;
        let v = heads_first(&v)?;

        // [b, h, s_q, s_kv]
        let scores = q.matmul(&k.t()?.contiguous()?)?;
        let scores = match (params.bias_type, bias) {
            (AttnBiasType::PreScaleBias, Some(bias)) => {
                (scores.broadcast_add(&bias.to_dtype(DType::F32)?)? * scale)?
            }
            (AttnBiasType::PostScaleBias, Some(bias)) => {
                (scores * scale)?.broadcast_add(&bias.to_dtype(DType::F32)?)?
            }
            _ => (scores * scale)?,
        };

        let scores = match effective_mask(mask, params.mask_type, &dims)? {
            Some(excluded) => {
                let excluded = excluded.broadcast_as(scores.dims())?.contiguous()?;
                let fill = Tensor::full(MASKED_SCORE, scores.dims(), scores.device())?;
                excluded.where_cond(&fill, &scores)?
            }
            None => scores,
        };

        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let probs = if params.dropout_active() {
            apply_dropout(&probs, params.dropout_probability, seed)?
        } else {
            probs
        };

        let output = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .to_dtype(input.dtype())?;
        Ok(output)
    }
}
