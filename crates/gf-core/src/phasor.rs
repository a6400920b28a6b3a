//! Phasor sample schema.
//!
//! Solvers report multi-phase quantities as flat lists in which even-indexed
//! entries are magnitude-like and odd-indexed entries are angle-like. That
//! column convention is part of the stored schema (downstream headers depend
//! on it), so it is named here rather than left as index arithmetic at call
//! sites.

use serde::{Deserialize, Serialize};

/// One magnitude/angle pair, e.g. a per-phase voltage phasor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorSample {
    pub magnitude: f64,
    pub angle: f64,
}

impl PhasorSample {
    /// Interpret a flat even/odd list as magnitude/angle pairs.
    ///
    /// A trailing unpaired entry is treated as a magnitude with zero angle.
    pub fn from_flat(values: &[f64]) -> Vec<PhasorSample> {
        let mut out = Vec::with_capacity(values.len().div_ceil(2));
        let mut chunks = values.chunks_exact(2);
        for pair in chunks.by_ref() {
            out.push(PhasorSample {
                magnitude: pair[0],
                angle: pair[1],
            });
        }
        if let Some(&last) = chunks.remainder().first() {
            out.push(PhasorSample {
                magnitude: last,
                angle: 0.0,
            });
        }
        out
    }

    /// Flatten pairs back to the even/odd column order.
    pub fn to_flat(samples: &[PhasorSample]) -> Vec<f64> {
        let mut out = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            out.push(s.magnitude);
            out.push(s.angle);
        }
        out
    }

    /// Column labels for `pair_count` pairs of a phasor-valued property,
    /// in the same even/odd order as [`PhasorSample::to_flat`].
    ///
    /// Example for `base = "Voltages"`, `pair_count = 2`:
    /// `["Voltages_1_mag", "Voltages_1_ang", "Voltages_2_mag", "Voltages_2_ang"]`.
    pub fn column_labels(base: &str, pair_count: usize) -> Vec<String> {
        let mut labels = Vec::with_capacity(pair_count * 2);
        for i in 1..=pair_count {
            labels.push(format!("{base}_{i}_mag"));
            labels.push(format!("{base}_{i}_ang"));
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_round_trip() {
        let flat = [7200.0, 0.0, 7198.5, -120.0, 7201.2, 120.0];
        let pairs = PhasorSample::from_flat(&flat);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[1].magnitude, 7198.5);
        assert_eq!(pairs[1].angle, -120.0);
        assert_eq!(PhasorSample::to_flat(&pairs), flat);
    }

    #[test]
    fn odd_length_pads_angle() {
        let pairs = PhasorSample::from_flat(&[1.0, 2.0, 3.0]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].magnitude, 3.0);
        assert_eq!(pairs[1].angle, 0.0);
    }

    #[test]
    fn labels_interleave_mag_ang() {
        let labels = PhasorSample::column_labels("Currents", 2);
        assert_eq!(
            labels,
            ["Currents_1_mag", "Currents_1_ang", "Currents_2_mag", "Currents_2_ang"]
        );
    }
}
