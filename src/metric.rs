//! Distance metrics over stored vectors
//!
//! The store treats slots as opaque bytes; an index layer decodes them with
//! [`decode_f32`] and compares them through a [`Distance`] picked once per
//! index with [`metric_for`]. Kernels here are scalar reference versions.

use serde::{Deserialize, Serialize};

/// Supported distance metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Manhattan: sum(|x_i - y_i|)
    L1,
    /// Euclidean: sqrt(sum((x_i - y_i)^2))
    L2,
    /// Negated dot product, so smaller is closer
    InnerProduct,
    /// 1 - cos(x, y)
    Cosine,
    /// 1 - dot(x, y) on vectors normalized at insert time
    NormalizedCosine,
    /// Chebyshev: max(|x_i - y_i|)
    Linf,
    /// sum(|x_i - y_i| / (|x_i| + |y_i|))
    Canberra,
    /// sum(|x_i - y_i|) / sum(|x_i + y_i|)
    BrayCurtis,
}

/// A distance kernel and its normalization rules
pub trait Distance: Send + Sync {
    fn metric(&self) -> MetricType;

    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Euclidean norm
    fn norm(&self, a: &[f32]) -> f32 {
        a.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Scale `a` to unit length; zero vectors are left alone
    fn normalize(&self, a: &mut [f32]) {
        let norm = self.norm(a);
        if norm > f32::EPSILON {
            a.iter_mut().for_each(|x| *x /= norm);
        }
    }

    /// Write the normalized form of `a` into the front of `out`
    fn normalize_into(&self, a: &[f32], out: &mut [f32]) {
        let out = &mut out[..a.len()];
        out.copy_from_slice(a);
        self.normalize(out);
    }

    /// Vectors must be normalized before they are stored or queried
    fn needs_normalization(&self) -> bool {
        false
    }

    fn supports_normalization(&self) -> bool {
        true
    }
}

/// Kernel for `metric`
pub fn metric_for(metric: MetricType) -> Box<dyn Distance> {
    match metric {
        MetricType::L1 => Box::new(L1Distance),
        MetricType::L2 => Box::new(L2Distance),
        MetricType::InnerProduct => Box::new(InnerProductDistance),
        MetricType::Cosine => Box::new(CosineDistance),
        MetricType::NormalizedCosine => Box::new(NormalizedCosineDistance),
        MetricType::Linf => Box::new(LinfDistance),
        MetricType::Canberra => Box::new(CanberraDistance),
        MetricType::BrayCurtis => Box::new(BrayCurtisDistance),
    }
}

/// Decode little-endian `f32` values from slot bytes
pub fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Encode `f32` values as little-endian slot bytes
pub fn encode_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct L1Distance;

impl Distance for L1Distance {
    fn metric(&self) -> MetricType {
        MetricType::L1
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct L2Distance;

impl Distance for L2Distance {
    fn metric(&self) -> MetricType {
        MetricType::L2
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InnerProductDistance;

impl Distance for InnerProductDistance {
    fn metric(&self) -> MetricType {
        MetricType::InnerProduct
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        -dot(a, b)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CosineDistance;

impl Distance for CosineDistance {
    fn metric(&self) -> MetricType {
        MetricType::Cosine
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let norm_a = self.norm(a);
        let norm_b = self.norm(b);
        if norm_a > 1e-8 && norm_b > 1e-8 {
            1.0 - dot(a, b) / (norm_a * norm_b)
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCosineDistance;

impl Distance for NormalizedCosineDistance {
    fn metric(&self) -> MetricType {
        MetricType::NormalizedCosine
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        1.0 - dot(a, b)
    }

    fn needs_normalization(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinfDistance;

impl Distance for LinfDistance {
    fn metric(&self) -> MetricType {
        MetricType::Linf
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CanberraDistance;

impl Distance for CanberraDistance {
    fn metric(&self) -> MetricType {
        MetricType::Canberra
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b)
            .map(|(x, y)| {
                let denom = x.abs() + y.abs();
                if denom > 0.0 {
                    (x - y).abs() / denom
                } else {
                    0.0
                }
            })
            .sum()
    }

    fn supports_normalization(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BrayCurtisDistance;

impl Distance for BrayCurtisDistance {
    fn metric(&self) -> MetricType {
        MetricType::BrayCurtis
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let (num, denom) = a.iter().zip(b).fold((0.0f32, 0.0f32), |(n, d), (x, y)| {
            (n + (x - y).abs(), d + (x + y).abs())
        });
        if denom > 0.0 {
            num / denom
        } else {
            0.0
        }
    }

    fn supports_normalization(&self) -> bool {
        false
    }
}
