//! Windowed spectral feature extraction.
//!
//! One time-domain window becomes one quantized FRAMES x COEFFS int8
//! grid in three steps: Hamming taper, magnitude spectrum, affine
//! quantization. The spectral transform itself is a pluggable
//! primitive; [`DirectDft`] is the table-driven default, built the
//! same way as an exact reference DFT.

use crate::config::{FeatureShape, QuantParams};
use crate::coop::YieldBudget;
use crate::error::WakeError;

/// Hamming-class taper: `0.54 - 0.46 * cos(2*pi*i / (W-1))`.
///
/// The denominator is `W-1`, not `W`: the taper is symmetric, both
/// boundary samples receive weight 0.08 exactly, and the peak reaches
/// 1.0 at the center.
#[must_use]
pub fn hamming_window(window_size: usize) -> Vec<f32> {
    debug_assert!(window_size >= 2);
    let denom = (window_size - 1) as f32;
    (0..window_size)
        .map(|i| {
            let angle = 2.0 * std::f32::consts::PI * (i as f32) / denom;
            0.54 - 0.46 * angle.cos()
        })
        .collect()
}

/// Magnitude-spectrum primitive: `window_size` real samples in,
/// `window_size / 2` non-negative magnitude bins out (the mirrored
/// half is redundant and discarded).
///
/// Implementations must be deterministic; any correct
/// transform-then-magnitude satisfies the contract.
pub trait SpectrumTransform {
    fn bins(&self) -> usize;

    fn magnitude_spectrum(
        &self,
        windowed: &[f32],
        out: &mut [f32],
        budget: &mut YieldBudget<'_>,
    ) -> Result<(), WakeError>;
}

/// Direct DFT over a single-period cos/sin table. Since the basis is
/// `cos(2*pi*k*i/W)`, `table[(k * i) % W]` is exact for every bin, so
/// one period of each function suffices regardless of window size.
/// Allocation-free after construction; O(W^2/2), so it ticks the yield
/// budget per accumulated sample inside each bin.
#[derive(Debug)]
pub struct DirectDft {
    n: usize,
    cos_t: Vec<f32>,
    sin_t: Vec<f32>,
}

impl DirectDft {
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let n = window_size;
        let mut cos_t = vec![0.0f32; n];
        let mut sin_t = vec![0.0f32; n];

        for j in 0..n {
            let angle = 2.0 * std::f32::consts::PI * (j as f32) / (n as f32);
            cos_t[j] = angle.cos();
            sin_t[j] = angle.sin();
        }

        Self { n, cos_t, sin_t }
    }
}

impl SpectrumTransform for DirectDft {
    fn bins(&self) -> usize {
        self.n / 2
    }

    fn magnitude_spectrum(
        &self,
        windowed: &[f32],
        out: &mut [f32],
        budget: &mut YieldBudget<'_>,
    ) -> Result<(), WakeError> {
        if windowed.len() != self.n {
            return Err(WakeError::ShapeMismatch {
                context: "spectrum input",
                expected: self.n,
                actual: windowed.len(),
            });
        }
        if out.len() != self.bins() {
            return Err(WakeError::ShapeMismatch {
                context: "spectrum output",
                expected: self.bins(),
                actual: out.len(),
            });
        }

        for (k, bin) in out.iter_mut().enumerate() {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            let mut idx = 0usize;
            for &x in windowed {
                re += x * self.cos_t[idx];
                im += x * self.sin_t[idx];
                idx += k;
                if idx >= self.n {
                    idx -= self.n;
                }
                budget.tick();
            }
            *bin = (re * re + im * im).sqrt();
        }
        Ok(())
    }
}

/// Turns one audio window into the quantized feature grid.
///
/// Spectrum bins map onto grid cells by cyclic indexing
/// (`bin = cell mod (W/2)`); when the grid is smaller than the
/// spectrum only the leading bins are used, when larger the bins
/// repeat. All scratch space is allocated at construction; `extract`
/// allocates nothing.
pub struct FeatureExtractor {
    window_size: usize,
    taper: Vec<f32>,
    shape: FeatureShape,
    quant: QuantParams,
    transform: Box<dyn SpectrumTransform>,
    tapered: Vec<f32>,
    magnitudes: Vec<f32>,
}

impl FeatureExtractor {
    pub fn new(
        window_size: usize,
        shape: FeatureShape,
        quant: QuantParams,
        transform: Box<dyn SpectrumTransform>,
    ) -> Result<Self, WakeError> {
        if transform.bins() != window_size / 2 {
            return Err(WakeError::ShapeMismatch {
                context: "spectrum transform bins",
                expected: window_size / 2,
                actual: transform.bins(),
            });
        }
        Ok(Self {
            window_size,
            taper: hamming_window(window_size),
            shape,
            quant,
            tapered: vec![0.0; window_size],
            magnitudes: vec![0.0; window_size / 2],
            transform,
        })
    }

    #[must_use]
    pub fn shape(&self) -> FeatureShape {
        self.shape
    }

    /// Extract one window into `out` (`frames * coeffs` int8 cells).
    ///
    /// Fails closed: on any transform error `out` is left untouched.
    pub fn extract(
        &mut self,
        samples: &[i16],
        out: &mut [i8],
        budget: &mut YieldBudget<'_>,
    ) -> Result<(), WakeError> {
        if samples.len() != self.window_size {
            return Err(WakeError::ShapeMismatch {
                context: "feature window",
                expected: self.window_size,
                actual: samples.len(),
            });
        }
        if out.len() != self.shape.len() {
            return Err(WakeError::ShapeMismatch {
                context: "feature matrix",
                expected: self.shape.len(),
                actual: out.len(),
            });
        }

        for (i, (&s, t)) in samples.iter().zip(self.tapered.iter_mut()).enumerate() {
            *t = f32::from(s) * self.taper[i];
            budget.tick();
        }
        budget.stage_boundary();

        self.transform
            .magnitude_spectrum(&self.tapered, &mut self.magnitudes, budget)?;
        budget.stage_boundary();

        let bins = self.magnitudes.len();
        for (i, cell) in out.iter_mut().enumerate() {
            let mag = self.magnitudes[i % bins];
            let q = (mag * self.quant.scale).round();
            *cell = q.clamp(-128.0, 127.0) as i8;
            budget.tick();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coop::{NoYield, YieldBudget, YieldHook};

    #[test]
    fn hamming_boundary_weights() {
        let w = hamming_window(16_000);
        assert!((w[0] - 0.08).abs() < 1e-6, "w[0] = {}", w[0]);
        assert!((w[15_999] - 0.08).abs() < 1e-6, "w[W-1] = {}", w[15_999]);
        // The peak sits at the center of the taper, not the last sample.
        assert!((w[8_000] - 1.0).abs() < 1e-5, "w[center] = {}", w[8_000]);
    }

    #[test]
    fn hamming_uses_w_minus_one_denominator() {
        // With denominator W (the off-by-one bug) the taper loses its
        // symmetry around the center.
        let w = hamming_window(400);
        for i in 0..200 {
            assert!(
                (w[i] - w[399 - i]).abs() < 1e-5,
                "taper asymmetric at {i}"
            );
        }
    }

    #[test]
    fn dft_yields_throughout_each_bin() {
        struct Counting(usize);

        impl YieldHook for Counting {
            fn on_yield(&mut self) {
                self.0 += 1;
            }
        }

        let n = 256usize;
        let dft = DirectDft::new(n);
        let windowed = vec![0.0f32; n];
        let mut mags = vec![0.0f32; n / 2];
        let mut hook = Counting(0);
        {
            let mut budget = YieldBudget::with_granularity(&mut hook, 128);
            dft.magnitude_spectrum(&windowed, &mut mags, &mut budget)
                .expect("dft");
        }
        // One tick per accumulated sample: n samples for each of the
        // n/2 bins, so the hook fires n * (n/2) / 128 times, not once
        // per bin.
        assert_eq!(hook.0, n * (n / 2) / 128);
    }

    #[test]
    fn dft_concentrates_sinusoid_energy() {
        let n = 64usize;
        let k0 = 5usize;
        let x: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * (k0 as f32) * (i as f32) / (n as f32)).cos())
            .collect();

        let dft = DirectDft::new(n);
        let mut mags = vec![0.0f32; n / 2];
        let mut hook = NoYield;
        let mut budget = YieldBudget::new(&mut hook);
        dft.magnitude_spectrum(&x, &mut mags, &mut budget).expect("dft");

        // A pure cosine at bin k0 has magnitude N/2 there, ~0 elsewhere.
        assert!((mags[k0] - (n as f32) / 2.0).abs() < 1e-3);
        for (k, &m) in mags.iter().enumerate() {
            if k != k0 {
                assert!(m < 1e-3, "leakage at bin {k}: {m}");
            }
        }
    }

    #[test]
    fn zero_window_extracts_all_zero_grid() {
        let shape = FeatureShape {
            frames: 5,
            coeffs: 4,
        };
        let quant = QuantParams {
            scale: 0.1,
            zero_point: 0,
        };
        let mut fx =
            FeatureExtractor::new(64, shape, quant, Box::new(DirectDft::new(64))).expect("fx");

        let samples = vec![0i16; 64];
        let mut out = vec![9i8; shape.len()];
        let mut hook = NoYield;
        let mut budget = YieldBudget::new(&mut hook);
        fx.extract(&samples, &mut out, &mut budget).expect("extract");
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn quantization_saturates_at_i8_range() {
        let shape = FeatureShape {
            frames: 2,
            coeffs: 2,
        };
        let quant = QuantParams {
            scale: 1.0,
            zero_point: 0,
        };
        let mut fx =
            FeatureExtractor::new(8, shape, quant, Box::new(DirectDft::new(8))).expect("fx");

        // Full-scale DC drives bin 0 far beyond 127.
        let samples = vec![i16::MAX; 8];
        let mut out = vec![0i8; shape.len()];
        let mut hook = NoYield;
        let mut budget = YieldBudget::new(&mut hook);
        fx.extract(&samples, &mut out, &mut budget).expect("extract");
        assert_eq!(out[0], 127);
    }

    struct FailingTransform {
        bins: usize,
    }

    impl SpectrumTransform for FailingTransform {
        fn bins(&self) -> usize {
            self.bins
        }

        fn magnitude_spectrum(
            &self,
            _windowed: &[f32],
            _out: &mut [f32],
            _budget: &mut YieldBudget<'_>,
        ) -> Result<(), WakeError> {
            Err(WakeError::SpectrumFailure("scratch allocation failed"))
        }
    }

    #[test]
    fn transform_failure_leaves_output_untouched() {
        let shape = FeatureShape {
            frames: 3,
            coeffs: 3,
        };
        let quant = QuantParams {
            scale: 0.1,
            zero_point: 0,
        };
        let mut fx = FeatureExtractor::new(
            16,
            shape,
            quant,
            Box::new(FailingTransform { bins: 8 }),
        )
        .expect("fx");

        let samples = vec![100i16; 16];
        let mut out = vec![42i8; shape.len()];
        let mut hook = NoYield;
        let mut budget = YieldBudget::new(&mut hook);
        let err = fx.extract(&samples, &mut out, &mut budget).unwrap_err();
        assert!(matches!(err, WakeError::SpectrumFailure(_)));
        assert!(out.iter().all(|&v| v == 42), "partial feature matrix emitted");
    }

    #[test]
    fn wrong_window_length_is_shape_mismatch() {
        let shape = FeatureShape {
            frames: 2,
            coeffs: 2,
        };
        let quant = QuantParams {
            scale: 0.1,
            zero_point: 0,
        };
        let mut fx =
            FeatureExtractor::new(16, shape, quant, Box::new(DirectDft::new(16))).expect("fx");
        let mut out = vec![0i8; 4];
        let mut hook = NoYield;
        let mut budget = YieldBudget::new(&mut hook);
        let err = fx
            .extract(&vec![0i16; 15], &mut out, &mut budget)
            .unwrap_err();
        assert!(matches!(err, WakeError::ShapeMismatch { .. }));
    }
}
