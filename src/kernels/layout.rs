// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Query/key/value layout adapter.
//!
//! Projection layers produce Q, K and V as separate `[batch, seq, heads, head_dim]`
//! tensors. Fused attention kernels consume them packed along a slot axis
//! inserted at position 2:
//!
//! - `Bs3hd`: one `[batch, seq, 3, heads, head_dim]` tensor (self-attention)
//! - `BshdBs2hd`: Q as `[batch, seq_q, heads, head_dim]` plus K/V packed as
//!   `[batch, seq_kv, 2, heads, head_dim]` (cross-attention)
//!
//! Packing copies values verbatim; slicing a slot back out reproduces the input
//! element-for-element.

use candle_core::{DType, Device, Tensor};

use crate::error::{AttnError, Result};

/// Axis index of the slot dimension in packed tensors.
pub const SLOT_AXIS: usize = 2;

/// Number of slots in a packed QKV tensor.
pub const QKV_SLOTS: usize = 3;

/// Number of slots in a packed KV tensor.
pub const KV_SLOTS: usize = 2;

/// Packed input layouts understood by the attention backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QkvLayout {
    /// `[b, s, 3, h, d]`
    Bs3hd,
    /// `[b, s_q, h, d]` and `[b, s_kv, 2, h, d]`
    BshdBs2hd,
}

/// Validated dimensions of an attention call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QkvDims {
    /// Batch size
    pub batch: usize,
    /// Query sequence length
    pub seq_q: usize,
    /// Key/value sequence length
    pub seq_kv: usize,
    /// Number of attention heads
    pub heads: usize,
    /// Dimension per head
    pub head_dim: usize,
}

impl QkvDims {
    /// Validate three separate `[batch, seq, heads, head_dim]` tensors.
    ///
    /// Batch, heads and head dimension must agree across all three; K and V must
    /// share a sequence length. The query sequence length may differ.
    ///
    /// # Errors
    /// Returns `RankMismatch` for non rank-4 inputs, `EmptyDimension` when any
    /// axis is zero-sized and `ShapeMismatch` when the shared dimensions disagree.
    pub fn from_separate(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<Self> {
        let (batch, seq_q, heads, head_dim) = dims4("query", q)?;
        let (_, seq_kv, _, _) = dims4("key", k)?;
        dims4("value", v)?;

        let expected_kv = [batch, seq_kv, heads, head_dim];
        if k.dims() != expected_kv {
            return Err(AttnError::shape("key", &expected_kv, k.dims()));
        }
        if v.dims() != expected_kv {
            return Err(AttnError::shape("value", &expected_kv, v.dims()));
        }

        Ok(Self {
            batch,
            seq_q,
            seq_kv,
            heads,
            head_dim,
        })
    }

    /// Validate a packed `[b, s, 3, h, d]` tensor.
    ///
    /// # Errors
    /// Returns an error if the tensor is not rank 5 or the slot axis is not 3.
    pub fn from_qkv_packed(qkv: &Tensor) -> Result<Self> {
        let (batch, seq, heads, head_dim) = packed_dims("qkv", qkv, QKV_SLOTS)?;
        Ok(Self {
            batch,
            seq_q: seq,
            seq_kv: seq,
            heads,
            head_dim,
        })
    }

    /// Validate a query plus packed `[b, s_kv, 2, h, d]` key/value tensor.
    ///
    /// # Errors
    /// Returns an error on rank mismatch or when batch/heads/head_dim disagree.
    pub fn from_kv_packed(q: &Tensor, kv: &Tensor) -> Result<Self> {
        let (batch, seq_q, heads, head_dim) = dims4("query", q)?;
        let (_, seq_kv, _, _) = packed_dims("kv", kv, KV_SLOTS)?;

        let expected = [batch, seq_kv, KV_SLOTS, heads, head_dim];
        if kv.dims() != expected {
            return Err(AttnError::shape("kv", &expected, kv.dims()));
        }

        Ok(Self {
            batch,
            seq_q,
            seq_kv,
            heads,
            head_dim,
        })
    }

    /// True when query and key/value sequence lengths agree.
    #[must_use]
    pub const fn is_self_attention(&self) -> bool {
        self.seq_q == self.seq_kv
    }

    /// Shape of the attention output, `[b, s_q, h, d]`.
    #[must_use]
    pub const fn output_shape(&self) -> [usize; 4] {
        [self.batch, self.seq_q, self.heads, self.head_dim]
    }

    /// Shape of the mask consumed by the kernel, `[b, 1, s_q, s_kv]`.
    #[must_use]
    pub const fn mask_shape(&self) -> [usize; 4] {
        [self.batch, 1, self.seq_q, self.seq_kv]
    }

    /// Shape of the additive bias, `[1, h, s_q, s_kv]`.
    #[must_use]
    pub const fn bias_shape(&self) -> [usize; 4] {
        [1, self.heads, self.seq_q, self.seq_kv]
    }
}

fn dims4(name: &'static str, t: &Tensor) -> Result<(usize, usize, usize, usize)> {
    match *t.dims() {
        [b, s, h, d] if t.elem_count() == 0 => Err(AttnError::empty(name, &[b, s, h, d])),
        [b, s, h, d] => Ok((b, s, h, d)),
        _ => Err(AttnError::rank(name, 4, t.dims())),
    }
}

fn packed_dims(
    name: &'static str,
    t: &Tensor,
    slots: usize,
) -> Result<(usize, usize, usize, usize)> {
    match *t.dims() {
        [b, s, n, h, d] if n == slots && t.elem_count() == 0 => {
            Err(AttnError::empty(name, &[b, s, n, h, d]))
        }
        [b, s, n, h, d] if n == slots => Ok((b, s, h, d)),
        [b, s, _, h, d] => Err(AttnError::shape(name, &[b, s, slots, h, d], t.dims())),
        _ => Err(AttnError::rank(name, 5, t.dims())),
    }
}

fn check_dtypes(q: &Tensor, others: &[(&'static str, &Tensor)]) -> Result<()> {
    for (name, t) in others {
        if t.dtype() != q.dtype() {
            return Err(AttnError::InvalidConfig(format!(
                "{name} dtype {:?} does not match query dtype {:?}",
                t.dtype(),
                q.dtype()
            )));
        }
    }
    Ok(())
}

/// Pack separate Q, K, V into one `[b, s, 3, h, d]` tensor.
///
/// Each input gets a singleton axis at position 2, then the three are
/// concatenated along it. Slot 0 is Q, slot 1 is K, slot 2 is V.
///
/// # Errors
/// Fails if batch/heads/head_dim differ, if the sequence lengths differ
/// (use [`pack_kv`] for cross-attention), or if dtypes differ.
pub fn pack_qkv(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<Tensor> {
    let dims = QkvDims::from_separate(q, k, v)?;
    if !dims.is_self_attention() {
        return Err(AttnError::shape("key", &dims.output_shape(), k.dims()));
    }
    check_dtypes(q, &[("key", k), ("value", v)])?;

    let packed = Tensor::cat(
        &[
            &q.unsqueeze(SLOT_AXIS)?,
            &k.unsqueeze(SLOT_AXIS)?,
            &v.unsqueeze(SLOT_AXIS)?,
        ],
        SLOT_AXIS,
    )?;
    Ok(packed)
}

/// Split a `[b, s, 3, h, d]` tensor back into `(q, k, v)`.
///
/// # Errors
/// Fails if the input is not a packed QKV tensor.
pub fn unpack_qkv(qkv: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
    QkvDims::from_qkv_packed(qkv)?;
    Ok((slot(qkv, 0)?, slot(qkv, 1)?, slot(qkv, 2)?))
}

/// Pack separate K, V into one `[b, s, 2, h, d]` tensor.
///
/// # Errors
/// Fails if the shapes or dtypes of K and V differ.
pub fn pack_kv(k: &Tensor, v: &Tensor) -> Result<Tensor> {
    dims4("key", k)?;
    dims4("value", v)?;
    if v.dims() != k.dims() {
        return Err(AttnError::shape("value", k.dims(), v.dims()));
    }
    check_dtypes(k, &[("value", v)])?;

    let packed = Tensor::cat(&[&k.unsqueeze(SLOT_AXIS)?, &v.unsqueeze(SLOT_AXIS)?], SLOT_AXIS)?;
    Ok(packed)
}

/// Split a `[b, s, 2, h, d]` tensor back into `(k, v)`.
///
/// # Errors
/// Fails if the input is not a packed KV tensor.
pub fn unpack_kv(kv: &Tensor) -> Result<(Tensor, Tensor)> {
    packed_dims("kv", kv, KV_SLOTS)?;
    Ok((slot(kv, 0)?, slot(kv, 1)?))
}

fn slot(packed: &Tensor, index: usize) -> Result<Tensor> {
    Ok(packed.narrow(SLOT_AXIS, index, 1)?.squeeze(SLOT_AXIS)?)
}

#[derive(Debug, Clone)]
enum Packed {
    Qkv(Tensor),
    Kv { q: Tensor, kv: Tensor },
}

/// Packed attention input with its validated dimensions.
#[derive(Debug, Clone)]
pub struct AttentionInput {
    packed: Packed,
    dims: QkvDims,
}

impl AttentionInput {
    /// Wrap an already packed `[b, s, 3, h, d]` tensor.
    ///
    /// # Errors
    /// Fails if the tensor is not a packed QKV tensor.
    pub fn qkv_packed(qkv: Tensor) -> Result<Self> {
        let dims = QkvDims::from_qkv_packed(&qkv)?;
        Ok(Self {
            packed: Packed::Qkv(qkv),
            dims,
        })
    }

    /// Wrap a query and an already packed `[b, s_kv, 2, h, d]` tensor.
    ///
    /// # Errors
    /// Fails on shape or dtype mismatch between `q` and `kv`.
    pub fn kv_packed(q: Tensor, kv: Tensor) -> Result<Self> {
        let dims = QkvDims::from_kv_packed(&q, &kv)?;
        check_dtypes(&q, &[("kv", &kv)])?;
        Ok(Self {
            packed: Packed::Kv { q, kv },
            dims,
        })
    }

    /// Pack separate Q, K, V, choosing `Bs3hd` when the sequence lengths agree
    /// and `BshdBs2hd` otherwise.
    ///
    /// # Errors
    /// Fails on any shape or dtype mismatch.
    pub fn from_separate(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<Self> {
        let dims = QkvDims::from_separate(q, k, v)?;
        if dims.is_self_attention() {
            Self::qkv_packed(pack_qkv(q, k, v)?)
        } else {
            Self::kv_packed(q.clone(), pack_kv(k, v)?)
        }
    }

    /// Which packed layout this input carries.
    #[must_use]
    pub const fn layout(&self) -> QkvLayout {
        match self.packed {
            Packed::Qkv(_) => QkvLayout::Bs3hd,
            Packed::Kv { .. } => QkvLayout::BshdBs2hd,
        }
    }

    /// Validated call dimensions.
    #[must_use]
    pub const fn dims(&self) -> QkvDims {
        self.dims
    }

    /// The query-bearing tensor (packed QKV, or Q for the KV layout).
    fn primary(&self) -> &Tensor {
        match &self.packed {
            Packed::Qkv(qkv) => qkv,
            Packed::Kv { q, .. } => q,
        }
    }

    /// Element type of the inputs.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.primary().dtype()
    }

    /// Device holding the inputs.
    #[must_use]
    pub fn device(&self) -> &Device {
        self.primary().device()
    }

    /// Slice the packed tensors back into separate `(q, k, v)` views.
    ///
    /// # Errors
    /// Propagates tensor slicing errors.
    pub fn split(&self) -> Result<(Tensor, Tensor, Tensor)> {
        match &self.packed {
            Packed::Qkv(qkv) => unpack_qkv(qkv),
            Packed::Kv { q, kv } => {
                let (k, v) = unpack_kv(kv)?;
                Ok((q.clone(), k, v))
            }
        }
    }
}
