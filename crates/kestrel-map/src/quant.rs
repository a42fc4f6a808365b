//! Weight matrices and fixed-point quantization.
//!
//! The K1 stores weights as sign-magnitude integers in a
//! `weight_bits`-wide field. A real-valued matrix quantizes against a
//! power-of-two threshold chosen per output dimension: the largest `2^i`
//! (with `i` below the threshold-index ceiling) such that the dimension's
//! largest-magnitude weight still fits the signed field. The accumulator
//! bucket for that dimension is programmed with the same index `i`, so
//! dequantization is `value / 2^i` and lands within one quantization step of
//! the original weight.
//!
//! One threshold per output dimension, not per layout chunk: every
//! contribution summed into one accumulator bucket must share a scale.

use crate::error::{MapError, Result};

/// A dense real-valued weight matrix: `rows` output dimensions by `cols`
/// input units (neurons for decode weights, bucket dimensions for transform
/// weights).
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl WeightMatrix {
    /// Build from row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`; matrix shape is a caller
    /// contract, not a runtime condition.
    #[must_use]
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "weight matrix shape mismatch");
        Self { rows, cols, data }
    }

    /// Matrix with every entry `value` (test and demo helper).
    #[must_use]
    pub fn constant(rows: usize, cols: usize, value: f64) -> Self {
        Self::new(rows, cols, vec![value; rows * cols])
    }

    /// Output dimensions.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Input units.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Entry at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }
}

/// A quantized matrix: integer values plus the per-output-dimension
/// threshold indices the accumulator buckets must be programmed with.
#[derive(Debug, Clone)]
pub struct QuantizedWeights {
    /// Threshold exponent per output dimension (`threshold = 2^idx`).
    pub thr_idx: Vec<u64>,
    /// Row-major quantized values; each fits the signed weight field.
    pub values: Vec<i64>,
    cols: usize,
}

impl QuantizedWeights {
    /// Quantized value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> i64 {
        self.values[row * self.cols + col]
    }
}

/// Quantize `matrix` for a `weight_max`-bounded signed field with threshold
/// indices below `2^thr_bits`.
///
/// # Errors
///
/// Returns [`MapError::Overflow`] if a weight magnitude cannot be brought
/// into range even at the smallest threshold (magnitude 1.0 or above).
pub fn quantize(matrix: &WeightMatrix, weight_max: u64, thr_bits: u32) -> Result<QuantizedWeights> {
    let thr_max = (1u64 << thr_bits) - 1;
    let mut thr_idx = Vec::with_capacity(matrix.rows());
    let mut values = Vec::with_capacity(matrix.rows() * matrix.cols());

    for row in 0..matrix.rows() {
        let magnitude = (0..matrix.cols())
            .map(|c| matrix.get(row, c).abs())
            .fold(0.0f64, f64::max);

        #[allow(clippy::cast_precision_loss)]
        let limit = weight_max as f64;
        if magnitude > limit {
            // Even threshold 2^0 cannot represent this weight.
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            return Err(MapError::overflow(magnitude.ceil() as u64, 0));
        }

        // Largest power of two that keeps the row's peak inside the field.
        let mut idx = 0u64;
        while idx < thr_max && magnitude * 2f64.powi((idx + 1) as i32) <= limit {
            idx += 1;
        }
        let scale = 2f64.powi(idx as i32);

        for col in 0..matrix.cols() {
            #[allow(clippy::cast_possible_truncation)]
            let q = (matrix.get(row, col) * scale).round() as i64;
            debug_assert!(q.unsigned_abs() <= weight_max);
            values.push(q);
        }
        thr_idx.push(idx);
    }

    Ok(QuantizedWeights {
        thr_idx,
        values,
        cols: matrix.cols(),
    })
}
