//! Memory estimates for attention calls.

use candle_core::DType;

use crate::kernels::layout::QkvDims;

/// Byte breakdown of one attention call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionMemoryEstimate {
    /// Packed Q/K/V inputs
    pub packed_input_bytes: usize,
    /// Score or softmax-statistics buffer (f32)
    pub workspace_bytes: usize,
    /// Attention output
    pub output_bytes: usize,
}

impl AttentionMemoryEstimate {
    /// Sum of all buffers.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.packed_input_bytes + self.workspace_bytes + self.output_bytes
    }
}

/// Estimate memory for one attention call.
///
/// With `materialize_scores` the full `[b, h, s_q, s_kv]` f32 score matrix is
/// counted. Fused kernels only keep per-row softmax statistics `[b, h, s_q]`.
#[must_use]
pub fn estimate_attention_memory(
    dims: &QkvDims,
    dtype: DType,
    materialize_scores: bool,
) -> AttentionMemoryEstimate {
    let elem = dtype.size_in_bytes();
    let f32_bytes = DType::F32.size_in_bytes();
    let row = dims.heads * dims.head_dim;

    let q_elems = dims.batch * dims.seq_q * row;
    let kv_elems = 2 * dims.batch * dims.seq_kv * row;

    let workspace = if materialize_scores {
        dims.batch * dims.heads * dims.seq_q * dims.seq_kv * f32_bytes
    } else {
        dims.batch * dims.heads * dims.seq_q * f32_bytes
    };

    AttentionMemoryEstimate {
        packed_input_bytes: (q_elems + kv_elems) * elem,
        workspace_bytes: workspace,
        output_bytes: q_elems * elem,
    }
}

/// Human-readable byte count.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
