// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Parameters for a fused attention call.
//!
//! Mirrors the selector set exposed by vendor fused-attention kernels: a bias
//! type, a mask type, a softmax scaling factor, a dropout probability and a
//! training flag.

use crate::error::{AttnError, Result};
use crate::kernels::layout::QkvDims;

/// How an additive bias is combined with the attention scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttnBiasType {
    /// No bias tensor.
    #[default]
    NoBias,
    /// `softmax((QK^T + bias) * scale)`
    PreScaleBias,
    /// `softmax(QK^T * scale + bias)`
    PostScaleBias,
}

/// Which masking the kernel applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttnMaskType {
    /// Mask tensor is ignored.
    #[default]
    NoMask,
    /// Non-zero mask entries are excluded.
    PaddingMask,
    /// Each query position attends only to key positions at or before it.
    CausalMask,
    /// Padding and causal masking combined.
    PaddingCausalMask,
}

impl AttnMaskType {
    /// Whether the mask tensor contents are honoured.
    #[must_use]
    pub const fn uses_padding(self) -> bool {
        matches!(self, Self::PaddingMask | Self::PaddingCausalMask)
    }

    /// Whether a causal constraint is applied.
    #[must_use]
    pub const fn is_causal(self) -> bool {
        matches!(self, Self::CausalMask | Self::PaddingCausalMask)
    }
}

/// Source of the softmax scaling factor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ScalePolicy {
    /// `1 / sqrt(head_dim)`
    #[default]
    InvSqrtHeadDim,
    /// `1 / sqrt(heads)`
    InvSqrtHeads,
    /// Fixed value.
    Explicit(f64),
}

impl ScalePolicy {
    /// Resolve the scaling factor for the given call dimensions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn resolve(self, dims: &QkvDims) -> f64 {
        match self {
            Self::InvSqrtHeadDim => 1.0 / (dims.head_dim as f64).sqrt(),
            Self::InvSqrtHeads => 1.0 / (dims.heads as f64).sqrt(),
            Self::Explicit(scale) => scale,
        }
    }
}

/// Parameters of a fused attention call.
///
/// # Example
///
/// ```rust
/// use fused_attn_rs::kernels::{AttentionParams, AttnMaskType};
///
/// let params = AttentionParams::default()
///     .with_mask_type(AttnMaskType::CausalMask)
///     .with_dropout(0.1)
///     .training(true);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttentionParams {
    /// Bias combination mode.
    pub bias_type: AttnBiasType,
    /// Masking mode.
    pub mask_type: AttnMaskType,
    /// Softmax scaling factor.
    pub scale: ScalePolicy,
    /// Dropout probability on attention weights, in `[0, 1)`.
    pub dropout_probability: f32,
    /// Training mode. Dropout is only applied when set.
    pub is_training: bool,
}

impl AttentionParams {
    /// Set the bias type.
    #[must_use]
    pub const fn with_bias_type(mut self, bias_type: AttnBiasType) -> Self {
        self.bias_type = bias_type;
        self
    }

    /// Set the mask type.
    #[must_use]
    pub const fn with_mask_type(mut self, mask_type: AttnMaskType) -> Self {
        self.mask_type = mask_type;
        self
    }

    /// Set the scale policy.
    #[must_use]
    pub fn with_scale(mut self, scale: ScalePolicy) -> Self {
        self.scale = scale;
        self
    }

    /// Use a fixed scaling factor.
    #[must_use]
    pub fn with_scaling_factor(mut self, scale: f64) -> Self {
        self.scale = ScalePolicy::Explicit(scale);
        self
    }

    /// Set the dropout probability.
    #[must_use]
    pub fn with_dropout(mut self, p: f32) -> Self {
        self.dropout_probability = p;
        self
    }

    /// Set training mode.
    #[must_use]
    pub const fn training(mut self, is_training: bool) -> Self {
        self.is_training = is_training;
        self
    }

    /// True when dropout will actually be applied.
    #[must_use]
    pub fn dropout_active(&self) -> bool {
        self.is_training && self.dropout_probability > 0.0
    }

    /// Scaling factor for the given dimensions.
    #[must_use]
    pub fn scaling_factor(&self, dims: &QkvDims) -> f64 {
        self.scale.resolve(dims)
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the dropout probability is outside `[0, 1)` or
    /// an explicit scale is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        let p = self.dropout_probability;
        if !(0.0..1.0).contains(&p) {
            return Err(AttnError::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        if let ScalePolicy::Explicit(scale) = self.scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(AttnError::InvalidConfig(format!(
                    "scaling factor must be positive and finite, got {scale}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(heads: usize, head_dim: usize) -> QkvDims {
        QkvDims {
            batch: 1,
            seq_q: 4,
            seq_kv: 4,
            heads,
            head_dim,
        }
    }

    #[test]
    fn test_default_params() {
        let params = AttentionParams::default();
        assert_eq!(params.bias_type, AttnBiasType::NoBias);
        assert_eq!(params.mask_type, AttnMaskType::NoMask);
        assert!(!params.is_training);
        assert!(!params.dropout_active());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_scale_defaults_to_head_dim() {
        let params = AttentionParams::default();
        let scale = params.scaling_factor(&dims(16, 64));
        assert!((scale - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_scale_by_heads() {
        let params = AttentionParams::default().with_scale(ScalePolicy::InvSqrtHeads);
        let scale = params.scaling_factor(&dims(16, 64));
        assert!((scale - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_scale() {
        let params = AttentionParams::default().with_scaling_factor(0.5);
        assert_eq!(params.scaling_factor(&dims(2, 8)), 0.5);
        assert!(AttentionParams::default()
            .with_scaling_factor(0.0)
            .validate()
            .is_err());
        assert!(AttentionParams::default()
            .with_scaling_factor(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_dropout_range() {
        assert!(AttentionParams::default().with_dropout(0.0).validate().is_ok());
        assert!(AttentionParams::default().with_dropout(0.99).validate().is_ok());
        assert!(AttentionParams::default().with_dropout(1.0).validate().is_err());
        assert!(AttentionParams::default().with_dropout(-0.1).validate().is_err());
        assert!(AttentionParams::default()
            .with_dropout(f32::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_dropout_only_in_training() {
        let eval = AttentionParams::default().with_dropout(0.5);
        assert!(!eval.dropout_active());
        assert!(eval.training(true).dropout_active());
    }

    #[test]
    fn test_mask_type_flags() {
        assert!(!AttnMaskType::NoMask.uses_padding());
        assert!(!AttnMaskType::NoMask.is_causal());
        assert!(AttnMaskType::PaddingMask.uses_padding());
        assert!(AttnMaskType::CausalMask.is_causal());
        assert!(AttnMaskType::PaddingCausalMask.uses_padding());
        assert!(AttnMaskType::PaddingCausalMask.is_causal());
    }
}
