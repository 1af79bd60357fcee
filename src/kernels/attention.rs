//! Fused attention entry points.
//!
//! Packs framework-layout Q/K/V through the layout adapter, validates the call
//! and dispatches it to the first backend that supports it. The unfused
//! reference backend is always registered last, so every valid call runs.

use candle_core::Tensor;

use crate::error::Result;
use crate::kernels::backend::{validate_call, FusedAttentionKernel};
use crate::kernels::config::AttentionParams;
use crate::kernels::flash::FlashAttnKernel;
use crate::kernels::layout::AttentionInput;
use crate::kernels::reference::ReferenceKernel;
use crate::memory::{estimate_attention_memory, format_bytes};

/// Configuration for fused attention.
#[derive(Debug, Clone, Copy)]
pub struct FusedAttentionConfig {
    /// Call parameters passed to the backend.
    pub params: AttentionParams,
    /// Whether to try the vendor flash-attention kernel first.
    pub use_flash: bool,
}

impl Default for FusedAttentionConfig {
    fn default() -> Self {
        Self {
            params: AttentionParams::default(),
            use_flash: true,
        }
    }
}

/// Fused multi-head attention over pre-projected Q/K/V.
///
/// Holds no tensors and no mutable state; one instance can serve any number of
/// calls and threads.
pub struct FusedAttention {
    config: FusedAttentionConfig,
    backends: Vec<Box<dyn FusedAttentionKernel>>,
}

impl std::fmt::Debug for FusedAttention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusedAttention")
            .field("config", &self.config)
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FusedAttention {
    /// Create a fused attention layer.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the parameters are out of range.
    pub fn new(config: FusedAttentionConfig) -> Result<Self> {
        config.params.validate()?;

        let mut backends: Vec<Box<dyn FusedAttentionKernel>> = Vec::new();
        if config.use_flash {
            backends.push(Box::new(FlashAttnKernel::new()));
        }
        backends.push(Box::new(ReferenceKernel::new()));

        Ok(Self { config, backends })
    }

    /// Register an additional backend ahead of the built-in ones.
    #[must_use]
    pub fn with_backend(mut self, backend: Box<dyn FusedAttentionKernel>) -> Self {
        self.backends.insert(0, backend);
        self
    }

    /// Layer configuration.
    #[must_use]
    pub const fn config(&self) -> &FusedAttentionConfig {
        &self.config
    }

    /// Names of the registered backends in dispatch order.
    #[must_use]
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Pick the backend that will run this call.
    #[must_use]
    pub fn select_backend(
        &self,
        input: &AttentionInput,
        bias: Option<&Tensor>,
    ) -> &dyn FusedAttentionKernel {
        select(
            self.backends.iter().map(|backend| &**backend),
            input,
            bias,
            &self.config.params,
        )
    }

    /// Forward pass over separate `[batch, seq, heads, head_dim]` tensors.
    ///
    /// Q/K/V are packed to `[b, s, 3, h, d]` when their sequence lengths agree,
    /// otherwise K/V are packed to `[b, s_kv, 2, h, d]`.
    ///
    /// # Arguments
    /// * `q`, `k`, `v` - Projected query/key/value tensors
    /// * `bias` - Additive bias `[1, heads, seq_q, seq_kv]`
    /// * `mask` - Mask `[batch, 1, seq_q, seq_kv]`, non-zero entries excluded
    /// * `seed` - Dropout seed
    ///
    /// # Returns
    /// Output tensor `[batch, seq_q, heads, head_dim]`
    ///
    /// # Errors
    /// Returns a shape error when batch/heads/head_dim disagree, and propagates
    /// validation and backend errors.
    pub fn forward(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        bias: Option<&Tensor>,
        mask: &Tensor,
        seed: Option<u64>,
    ) -> Result<Tensor> {
        let input = AttentionInput::from_separate(q, k, v)?;
        self.forward_packed(&input, bias, mask, seed)
    }

    /// Forward pass over already packed inputs.
    ///
    /// # Errors
    /// Propagates validation and backend errors.
    pub fn forward_packed(
        &self,
        input: &AttentionInput,
        bias: Option<&Tensor>,
        mask: &Tensor,
        seed: Option<u64>,
    ) -> Result<Tensor> {
        let params = &self.config.params;
        validate_call(input, bias, mask, params)?;
        let backend = self.select_backend(input, bias);
        run(backend, self.config.use_flash, input, bias, mask, seed, params)
    }
}

/// Built-in backends in dispatch order, used by the free-function entry points.
static BUILTIN_BACKENDS: [&dyn FusedAttentionKernel; 2] = [&FlashAttnKernel, &ReferenceKernel];

fn select<'a>(
    mut backends: impl Iterator<Item = &'a dyn FusedAttentionKernel>,
    input: &AttentionInput,
    bias: Option<&Tensor>,
    params: &AttentionParams,
) -> &'a dyn FusedAttentionKernel {
    backends
        .find(|backend| backend.supports(input, bias, params))
        .unwrap_or(&ReferenceKernel)
}

fn run(
    backend: &dyn FusedAttentionKernel,
    flash_requested: bool,
    input: &AttentionInput,
    bias: Option<&Tensor>,
    mask: &Tensor,
    seed: Option<u64>,
    params: &AttentionParams,
) -> Result<Tensor> {
    if flash_requested && backend.name() == ReferenceKernel.name() {
        if let Some(reason) = FlashAttnKernel::unsupported_reason(input, bias, params) {
            tracing::debug!("flash-attn skipped: {reason}");
        }
    }

    let dims = input.dims();
    let estimate = estimate_attention_memory(&dims, input.dtype(), backend.materializes_scores());
    tracing::debug!(
        "attention via {}: layout={:?}, dims={:?}, est. memory {}",
        backend.name(),
        input.layout(),
        dims,
        format_bytes(estimate.total())
    );

    backend.forward(input, bias, mask, seed, params)
}

fn dispatch_builtin(
    input: &AttentionInput,
    bias: Option<&Tensor>,
    mask: &Tensor,
    seed: Option<u64>,
    params: &AttentionParams,
) -> Result<Tensor> {
    validate_call(input, bias, mask, params)?;
    let backend = select(BUILTIN_BACKENDS.iter().copied(), input, bias, params);
    run(backend, true, input, bias, mask, seed, params)
}

/// Run fused attention on a packed `[b, s, 3, h, d]` tensor.
///
/// Dispatches over the built-in backends without allocating a
/// [`FusedAttention`] layer.
///
/// # Errors
/// Returns an error if `qkv` is not a packed QKV tensor, on invalid
/// parameters, bias or mask, or if the backend fails.
pub fn fused_attn_qkvpacked(
    qkv: &Tensor,
    bias: Option<&Tensor>,
    mask: &Tensor,
    seed: Option<u64>,
    params: &AttentionParams,
) -> Result<Tensor> {
    let input = AttentionInput::qkv_packed(qkv.clone())?;
    dispatch_builtin(&input, bias, mask, seed, params)
}

/// Run fused attention on `q` `[b, s_q, h, d]` and packed `kv` `[b, s_kv, 2, h, d]`.
///
/// # Errors
/// Returns an error on shape mismatch between `q` and `kv`, on invalid
/// parameters, bias or mask, or if the backend fails.
pub fn fused_attn_kvpacked(
    q: &Tensor,
    kv: &Tensor,
    bias: Option<&Tensor>,
    mask: &Tensor,
    seed: Option<u64>,
    params: &AttentionParams,
) -> Result<Tensor> {
    let input = AttentionInput::kv_packed(q.clone(), kv.clone())?;
    dispatch_builtin(&input, bias, mask, seed, params)
}
