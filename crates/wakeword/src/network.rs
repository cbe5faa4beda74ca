//! Quantized DS-CNN inference.
//!
//! A fixed topology of int8 layers executed in declaration order over
//! arena regions, ping-ponging between the two scratch buffers. All
//! shape propagation, weight-length checking, and accumulator-overflow
//! bounding happens in [`QuantizedNetwork::new`]; inference itself is
//! a synchronous run-to-completion pass that cannot fail on shapes.
//!
//! Tensors are channel-major: element `(c, y, x)` of an `h x w x c`
//! tensor lives at `(c * h + y) * w + x`.

use crate::arena::{ArenaPlan, BufferId, TensorArena};
use crate::config::QuantParams;
use crate::coop::YieldBudget;
use crate::error::WakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    pub h: usize,
    pub w: usize,
    pub c: usize,
}

impl TensorShape {
    #[must_use]
    pub fn len(&self) -> usize {
        self.h * self.w * self.c
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One layer of the fixed pipeline.
///
/// `shift` on the convolution layers is the per-layer requantization
/// right shift derived from the weight/activation scale ratio; it must
/// match the reference model's numerics exactly.
#[derive(Debug, Clone, Copy)]
pub enum LayerSpec {
    Conv2d {
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        shift: u32,
    },
    DepthwiseConv2d {
        kernel: (usize, usize),
        stride: (usize, usize),
        shift: u32,
    },
    GlobalAvgPool,
    Dense {
        units: usize,
    },
}

impl LayerSpec {
    /// Channel-mixing half of a depthwise-separable convolution:
    /// a 1x1 standard convolution.
    #[must_use]
    pub fn pointwise(out_channels: usize, shift: u32) -> Self {
        Self::Conv2d {
            out_channels,
            kernel: (1, 1),
            stride: (1, 1),
            shift,
        }
    }

    fn needs_params(&self) -> bool {
        !matches!(self, Self::GlobalAvgPool)
    }
}

/// Read-only weights and biases for one parametric layer. Shared by
/// all inference calls; never copied per call.
#[derive(Debug, Clone)]
pub struct LayerParams {
    pub weights: Vec<i8>,
    pub bias: Vec<i32>,
}

/// Weights for every parametric layer, in declaration order.
#[derive(Debug, Clone)]
pub struct ModelWeights {
    pub layers: Vec<LayerParams>,
}

impl ModelWeights {
    /// Correctly-sized all-zero weights for `topology` (test fixtures,
    /// smoke deployments).
    pub fn zeroed(topology: &NetworkTopology) -> Result<Self, WakeError> {
        let trace = topology.shape_trace()?;
        let mut layers = Vec::new();
        let mut in_shape = topology.input;
        for (spec, &out_shape) in topology.layers.iter().zip(&trace) {
            match *spec {
                LayerSpec::Conv2d {
                    out_channels,
                    kernel: (kh, kw),
                    ..
                } => layers.push(LayerParams {
                    weights: vec![0; out_channels * in_shape.c * kh * kw],
                    bias: vec![0; out_channels],
                }),
                LayerSpec::DepthwiseConv2d { kernel: (kh, kw), .. } => layers.push(LayerParams {
                    weights: vec![0; in_shape.c * kh * kw],
                    bias: vec![0; in_shape.c],
                }),
                LayerSpec::Dense { units } => layers.push(LayerParams {
                    weights: vec![0; units * in_shape.len()],
                    bias: vec![0; units],
                }),
                LayerSpec::GlobalAvgPool => {}
            }
            in_shape = out_shape;
        }
        Ok(Self { layers })
    }
}

#[derive(Debug, Clone)]
pub struct NetworkTopology {
    pub input: TensorShape,
    pub layers: Vec<LayerSpec>,
}

impl NetworkTopology {
    /// The deployed DS-CNN: conv 3x3 -> [dw 3x3 -> pw 1x1] x2 ->
    /// global average pool -> dense. Requantization shift is 8
    /// everywhere, matching the trained model.
    #[must_use]
    pub fn dscnn(frames: usize, coeffs: usize, num_classes: usize) -> Self {
        let s = 8u32;
        Self {
            input: TensorShape {
                h: frames,
                w: coeffs,
                c: 1,
            },
            layers: vec![
                LayerSpec::Conv2d {
                    out_channels: 16,
                    kernel: (3, 3),
                    stride: (1, 1),
                    shift: s,
                },
                LayerSpec::DepthwiseConv2d {
                    kernel: (3, 3),
                    stride: (1, 1),
                    shift: s,
                },
                LayerSpec::pointwise(24, s),
                LayerSpec::DepthwiseConv2d {
                    kernel: (3, 3),
                    stride: (1, 1),
                    shift: s,
                },
                LayerSpec::pointwise(32, s),
                LayerSpec::GlobalAvgPool,
                LayerSpec::Dense { units: num_classes },
            ],
        }
    }

    /// Propagate shapes through every layer; the returned trace holds
    /// each layer's output shape. `H' = (H - Kh)/Sh + 1` with valid
    /// (no implicit) padding.
    pub fn shape_trace(&self) -> Result<Vec<TensorShape>, WakeError> {
        let mut trace = Vec::with_capacity(self.layers.len());
        let mut shape = self.input;
        if shape.is_empty() {
            return Err(WakeError::ShapeMismatch {
                context: "network input",
                expected: 1,
                actual: 0,
            });
        }

        for (i, layer) in self.layers.iter().enumerate() {
            shape = match *layer {
                LayerSpec::Conv2d {
                    out_channels,
                    kernel,
                    stride,
                    ..
                } => conv_output_shape(shape, kernel, stride, out_channels)?,
                LayerSpec::DepthwiseConv2d { kernel, stride, .. } => {
                    conv_output_shape(shape, kernel, stride, shape.c)?
                }
                LayerSpec::GlobalAvgPool => TensorShape {
                    h: 1,
                    w: 1,
                    c: shape.c,
                },
                LayerSpec::Dense { units } => {
                    if i + 1 != self.layers.len() {
                        return Err(WakeError::ShapeMismatch {
                            context: "dense must be the final layer",
                            expected: self.layers.len(),
                            actual: i + 1,
                        });
                    }
                    if units == 0 {
                        return Err(WakeError::ShapeMismatch {
                            context: "dense units",
                            expected: 1,
                            actual: 0,
                        });
                    }
                    TensorShape {
                        h: 1,
                        w: 1,
                        c: units,
                    }
                }
            };
            trace.push(shape);
        }

        match self.layers.last() {
            Some(LayerSpec::Dense { .. }) => Ok(trace),
            _ => Err(WakeError::ShapeMismatch {
                context: "topology must end in a dense layer",
                expected: 1,
                actual: 0,
            }),
        }
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        match self.layers.last() {
            Some(LayerSpec::Dense { units }) => *units,
            _ => 0,
        }
    }
}

fn conv_output_shape(
    input: TensorShape,
    (kh, kw): (usize, usize),
    (sh, sw): (usize, usize),
    out_channels: usize,
) -> Result<TensorShape, WakeError> {
    if kh == 0 || kw == 0 || sh == 0 || sw == 0 || out_channels == 0 {
        return Err(WakeError::ShapeMismatch {
            context: "conv kernel/stride",
            expected: 1,
            actual: 0,
        });
    }
    if input.h < kh || input.w < kw {
        return Err(WakeError::ShapeMismatch {
            context: "conv input smaller than kernel",
            expected: kh.max(kw),
            actual: input.h.min(input.w),
        });
    }
    Ok(TensorShape {
        h: (input.h - kh) / sh + 1,
        w: (input.w - kw) / sw + 1,
        c: out_channels,
    })
}

/// Worst-case magnitude an i8 x i8 multiply-accumulate contributes.
const MAC_BOUND: i64 = 128 * 128;

#[derive(Debug)]
pub struct QuantizedNetwork {
    topology: NetworkTopology,
    weights: ModelWeights,
    quant: QuantParams,
    trace: Vec<TensorShape>,
}

impl QuantizedNetwork {
    /// Bind topology and weights, validating everything that can be
    /// validated up front: weight/bias lengths, shape propagation, and
    /// the i32 accumulator bound per layer.
    pub fn new(
        topology: NetworkTopology,
        weights: ModelWeights,
        quant: QuantParams,
    ) -> Result<Self, WakeError> {
        let trace = topology.shape_trace()?;

        let parametric = topology.layers.iter().filter(|l| l.needs_params()).count();
        if weights.layers.len() != parametric {
            return Err(WakeError::ShapeMismatch {
                context: "parametric layer count",
                expected: parametric,
                actual: weights.layers.len(),
            });
        }

        let mut pi = 0usize;
        let mut in_shape = topology.input;
        for (i, (spec, &out_shape)) in topology.layers.iter().zip(&trace).enumerate() {
            match *spec {
                LayerSpec::Conv2d {
                    out_channels,
                    kernel: (kh, kw),
                    ..
                } => {
                    let p = &weights.layers[pi];
                    pi += 1;
                    check_len("conv weights", p.weights.len(), out_channels * in_shape.c * kh * kw)?;
                    check_len("conv bias", p.bias.len(), out_channels)?;
                    check_accumulator(i, kh * kw * in_shape.c, &p.bias)?;
                }
                LayerSpec::DepthwiseConv2d { kernel: (kh, kw), .. } => {
                    let p = &weights.layers[pi];
                    pi += 1;
                    check_len("depthwise weights", p.weights.len(), in_shape.c * kh * kw)?;
                    check_len("depthwise bias", p.bias.len(), in_shape.c)?;
                    check_accumulator(i, kh * kw, &p.bias)?;
                }
                LayerSpec::Dense { units } => {
                    let p = &weights.layers[pi];
                    pi += 1;
                    check_len("dense weights", p.weights.len(), units * in_shape.len())?;
                    check_len("dense bias", p.bias.len(), units)?;
                    check_accumulator(i, in_shape.len(), &p.bias)?;
                }
                LayerSpec::GlobalAvgPool => {}
            }
            in_shape = out_shape;
        }

        Ok(Self {
            topology,
            weights,
            quant,
            trace,
        })
    }

    /// Arena layout this network needs: the feature grid as input, the
    /// largest intermediate tensor for each ping-pong scratch region,
    /// and one f32 slot per class.
    #[must_use]
    pub fn arena_plan(&self) -> ArenaPlan {
        let scratch = self
            .trace
            .iter()
            .take(self.trace.len().saturating_sub(1)) // dense writes f32 output
            .map(TensorShape::len)
            .max()
            .unwrap_or(0);
        ArenaPlan::new(self.topology.input.len(), scratch, self.num_classes())
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.topology.num_classes()
    }

    #[must_use]
    pub fn input_len(&self) -> usize {
        self.topology.input.len()
    }

    /// Verify an arena was built for this network. Called once at
    /// pipeline initialization; a mismatch there is a fatal
    /// configuration error, never a steady-state one.
    pub fn check_arena(&self, arena: &TensorArena) -> Result<(), WakeError> {
        let expected = self.arena_plan();
        if *arena.plan() != expected {
            return Err(WakeError::ShapeMismatch {
                context: "arena plan",
                expected: expected.required_bytes(),
                actual: arena.plan().required_bytes(),
            });
        }
        Ok(())
    }

    /// Run the full forward pass. The input region must already hold
    /// the quantized feature grid; on return the arena output region
    /// holds the class probabilities.
    pub fn infer(&self, arena: &mut TensorArena, budget: &mut YieldBudget<'_>) {
        debug_assert!(self.check_arena(arena).is_ok());

        let mut cur = BufferId::Input;
        let mut next = BufferId::ScratchA;
        let mut in_shape = self.topology.input;
        let mut pi = 0usize;

        for (spec, &out_shape) in self.topology.layers.iter().zip(&self.trace) {
            match *spec {
                LayerSpec::Conv2d {
                    kernel: (kh, kw),
                    stride: (sh, sw),
                    shift,
                    ..
                } => {
                    let p = &self.weights.layers[pi];
                    pi += 1;
                    let (src, dst) = arena.rw_pair(cur, next);
                    conv2d(
                        &src[..in_shape.len()],
                        &p.weights,
                        &p.bias,
                        &mut dst[..out_shape.len()],
                        in_shape,
                        out_shape,
                        (kh, kw),
                        (sh, sw),
                        shift,
                        budget,
                    );
                    (cur, next) = advance(next);
                }
                LayerSpec::DepthwiseConv2d {
                    kernel: (kh, kw),
                    stride: (sh, sw),
                    shift,
                } => {
                    let p = &self.weights.layers[pi];
                    pi += 1;
                    let (src, dst) = arena.rw_pair(cur, next);
                    depthwise_conv2d(
                        &src[..in_shape.len()],
                        &p.weights,
                        &p.bias,
                        &mut dst[..out_shape.len()],
                        in_shape,
                        out_shape,
                        (kh, kw),
                        (sh, sw),
                        shift,
                        budget,
                    );
                    (cur, next) = advance(next);
                }
                LayerSpec::GlobalAvgPool => {
                    let (src, dst) = arena.rw_pair(cur, next);
                    global_avg_pool(
                        &src[..in_shape.len()],
                        &mut dst[..out_shape.len()],
                        in_shape,
                        budget,
                    );
                    (cur, next) = advance(next);
                }
                LayerSpec::Dense { .. } => {
                    let p = &self.weights.layers[pi];
                    pi += 1;
                    let (src, out) = arena.region_and_output_mut(cur);
                    dense(&src[..in_shape.len()], &p.weights, &p.bias, out, self.quant, budget);
                }
            }
            in_shape = out_shape;
            budget.stage_boundary();
        }

        softmax_inplace(arena.output_mut());
    }
}

fn advance(just_written: BufferId) -> (BufferId, BufferId) {
    match just_written {
        BufferId::ScratchA => (BufferId::ScratchA, BufferId::ScratchB),
        _ => (BufferId::ScratchB, BufferId::ScratchA),
    }
}

fn check_len(context: &'static str, actual: usize, expected: usize) -> Result<(), WakeError> {
    if actual != expected {
        return Err(WakeError::ShapeMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_accumulator(layer: usize, macs: usize, bias: &[i32]) -> Result<(), WakeError> {
    let max_bias = bias.iter().map(|b| i64::from(b.abs())).max().unwrap_or(0);
    let worst_case = max_bias + (macs as i64) * MAC_BOUND;
    if worst_case > i64::from(i32::MAX) {
        return Err(WakeError::AccumulatorOverflowRisk { layer, worst_case });
    }
    Ok(())
}

/// Accumulate -> ReLU -> requantize, shared by both conv kernels.
#[inline]
fn requantize(sum: i32, shift: u32) -> i8 {
    let clamped = sum.max(0);
    (clamped >> shift).min(127) as i8
}

/// Valid (no padding) standard convolution.
#[allow(clippy::too_many_arguments)]
pub fn conv2d(
    input: &[i8],
    weights: &[i8],
    bias: &[i32],
    output: &mut [i8],
    in_shape: TensorShape,
    out_shape: TensorShape,
    (kh, kw): (usize, usize),
    (sh, sw): (usize, usize),
    shift: u32,
    budget: &mut YieldBudget<'_>,
) {
    debug_assert_eq!(input.len(), in_shape.len());
    debug_assert_eq!(output.len(), out_shape.len());
    debug_assert_eq!(weights.len(), out_shape.c * in_shape.c * kh * kw);
    debug_assert_eq!(bias.len(), out_shape.c);

    for oc in 0..out_shape.c {
        for oy in 0..out_shape.h {
            for ox in 0..out_shape.w {
                let mut sum = bias[oc];
                for ic in 0..in_shape.c {
                    let w_base = ((oc * in_shape.c + ic) * kh) * kw;
                    for ky in 0..kh {
                        let iy = oy * sh + ky;
                        let in_row = (ic * in_shape.h + iy) * in_shape.w + ox * sw;
                        let w_row = w_base + ky * kw;
                        for kx in 0..kw {
                            sum += i32::from(input[in_row + kx]) * i32::from(weights[w_row + kx]);
                        }
                    }
                }
                output[(oc * out_shape.h + oy) * out_shape.w + ox] = requantize(sum, shift);
                budget.tick();
            }
        }
    }
}

/// Valid depthwise convolution: each output channel convolves only
/// with the matching input channel.
#[allow(clippy::too_many_arguments)]
pub fn depthwise_conv2d(
    input: &[i8],
    weights: &[i8],
    bias: &[i32],
    output: &mut [i8],
    in_shape: TensorShape,
    out_shape: TensorShape,
    (kh, kw): (usize, usize),
    (sh, sw): (usize, usize),
    shift: u32,
    budget: &mut YieldBudget<'_>,
) {
    debug_assert_eq!(in_shape.c, out_shape.c);
    debug_assert_eq!(weights.len(), in_shape.c * kh * kw);
    debug_assert_eq!(bias.len(), in_shape.c);

    for c in 0..in_shape.c {
        for oy in 0..out_shape.h {
            for ox in 0..out_shape.w {
                let mut sum = bias[c];
                for ky in 0..kh {
                    let iy = oy * sh + ky;
                    let in_row = (c * in_shape.h + iy) * in_shape.w + ox * sw;
                    let w_row = (c * kh + ky) * kw;
                    for kx in 0..kw {
                        sum += i32::from(input[in_row + kx]) * i32::from(weights[w_row + kx]);
                    }
                }
                output[(c * out_shape.h + oy) * out_shape.w + ox] = requantize(sum, shift);
                budget.tick();
            }
        }
    }
}

/// Average each channel over all spatial positions, truncating toward
/// zero into int8.
pub fn global_avg_pool(
    input: &[i8],
    output: &mut [i8],
    in_shape: TensorShape,
    budget: &mut YieldBudget<'_>,
) {
    debug_assert_eq!(output.len(), in_shape.c);
    let area = (in_shape.h * in_shape.w) as i32;

    for c in 0..in_shape.c {
        let plane = &input[c * in_shape.h * in_shape.w..(c + 1) * in_shape.h * in_shape.w];
        let mut sum = 0i32;
        for &v in plane {
            sum += i32::from(v);
            budget.tick();
        }
        output[c] = (sum / area) as i8;
    }
}

/// Fully connected layer; the single point where the pipeline leaves
/// the integer domain: `out = (sum - zero_point) * scale`.
pub fn dense(
    input: &[i8],
    weights: &[i8],
    bias: &[i32],
    output: &mut [f32],
    quant: QuantParams,
    budget: &mut YieldBudget<'_>,
) {
    debug_assert_eq!(weights.len(), output.len() * input.len());
    debug_assert_eq!(bias.len(), output.len());

    for (o, out) in output.iter_mut().enumerate() {
        let row = &weights[o * input.len()..(o + 1) * input.len()];
        let mut sum = bias[o];
        for (&x, &w) in input.iter().zip(row) {
            sum += i32::from(x) * i32::from(w);
            budget.tick();
        }
        *out = (sum - quant.zero_point) as f32 * quant.scale;
    }
}

/// Numerically stable softmax: subtract the max logit before
/// exponentiating so any finite input yields a distribution.
pub fn softmax_inplace(x: &mut [f32]) {
    if x.is_empty() {
        return;
    }
    let mut max_v = x[0];
    for &v in &x[1..] {
        if v > max_v {
            max_v = v;
        }
    }

    let mut sum = 0.0f32;
    for v in x.iter_mut() {
        *v = (*v - max_v).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in x {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::TensorArena;
    use crate::coop::{NoYield, YieldBudget};

    fn budget(hook: &mut NoYield) -> YieldBudget<'_> {
        YieldBudget::new(hook)
    }

    fn quant() -> QuantParams {
        QuantParams {
            scale: 0.1,
            zero_point: 0,
        }
    }

    #[test]
    fn conv_output_formula() {
        let topo = NetworkTopology::dscnn(65, 10, 3);
        let trace = topo.shape_trace().expect("trace");
        assert_eq!(trace[0], TensorShape { h: 63, w: 8, c: 16 });
        assert_eq!(trace[1], TensorShape { h: 61, w: 6, c: 16 });
        assert_eq!(trace[2], TensorShape { h: 61, w: 6, c: 24 });
        assert_eq!(trace[3], TensorShape { h: 59, w: 4, c: 24 });
        assert_eq!(trace[4], TensorShape { h: 59, w: 4, c: 32 });
        assert_eq!(trace[5], TensorShape { h: 1, w: 1, c: 32 });
        assert_eq!(trace[6], TensorShape { h: 1, w: 1, c: 3 });

        // Output buffer sizes are exactly H'*W'*Cout.
        assert_eq!(trace[0].len(), 63 * 8 * 16);
        assert_eq!(trace[2].len(), 61 * 6 * 24);
    }

    #[test]
    fn kernel_larger_than_input_is_shape_mismatch() {
        let topo = NetworkTopology {
            input: TensorShape { h: 2, w: 2, c: 1 },
            layers: vec![
                LayerSpec::Conv2d {
                    out_channels: 4,
                    kernel: (3, 3),
                    stride: (1, 1),
                    shift: 8,
                },
                LayerSpec::Dense { units: 2 },
            ],
        };
        assert!(matches!(
            topo.shape_trace(),
            Err(WakeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn dense_must_be_final_layer() {
        let topo = NetworkTopology {
            input: TensorShape { h: 4, w: 4, c: 1 },
            layers: vec![LayerSpec::Dense { units: 2 }, LayerSpec::GlobalAvgPool],
        };
        assert!(topo.shape_trace().is_err());
    }

    #[test]
    fn conv2d_matches_hand_computation() {
        // 1 channel 3x3 input, one 2x2 kernel, stride 1, shift 0.
        let input = [1i8, 2, 3, 4, 5, 6, 7, 8, 9];
        let weights = [1i8, 0, 0, 1]; // picks top-left + bottom-right
        let bias = [10i32];
        let mut out = [0i8; 4];
        let mut hook = NoYield;
        conv2d(
            &input,
            &weights,
            &bias,
            &mut out,
            TensorShape { h: 3, w: 3, c: 1 },
            TensorShape { h: 2, w: 2, c: 1 },
            (2, 2),
            (1, 1),
            0,
            &mut budget(&mut hook),
        );
        // (1+5+10, 2+6+10, 4+8+10, 5+9+10)
        assert_eq!(out, [16, 18, 22, 24]);
    }

    #[test]
    fn conv2d_relu_clamps_negative_sums_to_zero() {
        let input = [10i8, 10, 10, 10];
        let weights = [-1i8];
        let bias = [0i32];
        let mut out = [0i8; 4];
        let mut hook = NoYield;
        conv2d(
            &input,
            &weights,
            &bias,
            &mut out,
            TensorShape { h: 2, w: 2, c: 1 },
            TensorShape { h: 2, w: 2, c: 1 },
            (1, 1),
            (1, 1),
            0,
            &mut budget(&mut hook),
        );
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn requantize_shifts_and_saturates() {
        assert_eq!(requantize(256, 8), 1);
        assert_eq!(requantize(255, 8), 0);
        assert_eq!(requantize(-5, 8), 0);
        assert_eq!(requantize(i32::MAX, 8), 127);
    }

    #[test]
    fn depthwise_keeps_channels_separate() {
        // 2 channels of 2x2, 1x1 kernels with distinct weights.
        let input = [1i8, 2, 3, 4, 5, 6, 7, 8];
        let weights = [1i8, 2]; // ch0 *1, ch1 *2
        let bias = [0i32, 0];
        let mut out = [0i8; 8];
        let mut hook = NoYield;
        depthwise_conv2d(
            &input,
            &weights,
            &bias,
            &mut out,
            TensorShape { h: 2, w: 2, c: 2 },
            TensorShape { h: 2, w: 2, c: 2 },
            (1, 1),
            (1, 1),
            0,
            &mut budget(&mut hook),
        );
        assert_eq!(out, [1, 2, 3, 4, 10, 12, 14, 16]);
    }

    #[test]
    fn global_avg_pool_truncates_toward_zero() {
        let input = [-3i8, -2, 3, 2];
        let mut out = [0i8; 2];
        let mut hook = NoYield;
        global_avg_pool(
            &input,
            &mut out,
            TensorShape { h: 1, w: 2, c: 2 },
            &mut budget(&mut hook),
        );
        // -5/2 truncates to -2, 5/2 truncates to 2.
        assert_eq!(out, [-2, 2]);
    }

    #[test]
    fn dense_dequantizes_through_the_configured_pair() {
        let input = [2i8, 3];
        let weights = [1i8, 1, 0, 2];
        let bias = [5i32, 0];
        let mut out = [0.0f32; 2];
        let q = QuantParams {
            scale: 0.5,
            zero_point: 4,
        };
        let mut hook = NoYield;
        dense(&input, &weights, &bias, &mut out, q, &mut budget(&mut hook));
        // sums: 2+3+5=10, 6+0=6 -> (10-4)*0.5=3.0, (6-4)*0.5=1.0
        assert!((out[0] - 3.0).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_sums_to_one_for_degenerate_inputs() {
        for logits in [
            vec![0.0f32; 5],
            vec![3.25f32; 4],
            vec![1000.0, -1000.0, 0.0],
            vec![f32::MAX / 2.0, 0.0],
        ] {
            let mut x = logits.clone();
            softmax_inplace(&mut x);
            let sum: f32 = x.iter().sum();
            assert!(
                (sum - 1.0).abs() < 1e-4,
                "logits {logits:?} -> sum {sum}"
            );
        }
    }

    #[test]
    fn softmax_uniform_for_equal_logits_near_one_hot_for_dominant() {
        let mut uniform = [2.0f32; 4];
        softmax_inplace(&mut uniform);
        for &p in &uniform {
            assert!((p - 0.25).abs() < 1e-6);
        }

        let mut dominant = [0.0f32, 50.0, 0.0];
        softmax_inplace(&mut dominant);
        assert!(dominant[1] > 0.999);
    }

    #[test]
    fn overflow_risk_rejected_at_construction() {
        // 1x1 conv over a huge channel count: macs * 128 * 128 > i32::MAX.
        let topo = NetworkTopology {
            input: TensorShape {
                h: 20,
                w: 20,
                c: 150_000,
            },
            layers: vec![
                LayerSpec::pointwise(1, 8),
                LayerSpec::GlobalAvgPool,
                LayerSpec::Dense { units: 2 },
            ],
        };
        let weights = ModelWeights::zeroed(&topo).expect("zeroed");
        let err = QuantizedNetwork::new(topo, weights, quant()).unwrap_err();
        assert!(matches!(err, WakeError::AccumulatorOverflowRisk { layer: 0, .. }));
    }

    #[test]
    fn network_debug_formats_without_panicking() {
        let topo = NetworkTopology::dscnn(65, 10, 3);
        let weights = ModelWeights::zeroed(&topo).expect("zeroed");
        let net = QuantizedNetwork::new(topo, weights, quant()).expect("valid");
        let rendered = format!("{net:?}");
        assert!(rendered.contains("QuantizedNetwork"));
    }

    #[test]
    fn wrong_weight_length_rejected_at_construction() {
        let topo = NetworkTopology::dscnn(65, 10, 3);
        let mut weights = ModelWeights::zeroed(&topo).expect("zeroed");
        weights.layers[0].weights.pop();
        let err = QuantizedNetwork::new(topo, weights, quant()).unwrap_err();
        assert!(matches!(
            err,
            WakeError::ShapeMismatch {
                context: "conv weights",
                ..
            }
        ));
    }

    #[test]
    fn zero_network_on_zero_input_yields_uniform_distribution() {
        let topo = NetworkTopology::dscnn(65, 10, 3);
        let weights = ModelWeights::zeroed(&topo).expect("zeroed");
        let net = QuantizedNetwork::new(topo, weights, quant()).expect("net");

        let plan = net.arena_plan();
        let mut arena = TensorArena::initialize(plan.required_bytes(), plan).expect("arena");
        let mut hook = NoYield;
        let mut b = YieldBudget::new(&mut hook);
        net.infer(&mut arena, &mut b);

        let probs = arena.output();
        assert_eq!(probs.len(), 3);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        for &p in probs {
            assert!((p - 1.0 / 3.0).abs() < 1e-5);
        }
    }

    #[test]
    fn arena_from_foreign_plan_is_rejected() {
        let topo = NetworkTopology::dscnn(65, 10, 3);
        let weights = ModelWeights::zeroed(&topo).expect("zeroed");
        let net = QuantizedNetwork::new(topo, weights, quant()).expect("net");

        let small = crate::arena::ArenaPlan::new(10, 10, 3);
        let arena = TensorArena::initialize(small.required_bytes(), small).expect("arena");
        assert!(matches!(
            net.check_arena(&arena),
            Err(WakeError::ShapeMismatch { .. })
        ));
    }
}
