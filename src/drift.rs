//! Post-punch drift: continuous low-amplitude scale/pan motion that keeps a
//! settled slide alive without obscuring the cut. Parameters are derived once
//! per slide from the project seed, so drift is reproducible.

use crate::{ease::Ease, effect::splitmix64};

/// Drift may not start until this long after the final punch.
pub const DRIFT_SETTLE_MS: f64 = 250.0;
/// Amplitude ramps in over this window so drift never pops.
pub const DRIFT_RAMP_MS: f64 = 600.0;
/// Peak multiplicative scale oscillation (±1.5%).
pub const DRIFT_SCALE_AMPLITUDE: f64 = 0.015;
/// Peak pan excursion in canvas pixels.
pub const DRIFT_PAN_AMPLITUDE_PX: f64 = 14.0;

const FREQ_MIN_HZ: f64 = 0.05;
const FREQ_MAX_HZ: f64 = 0.18;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SineComponent {
    pub freq_hz: f64,
    pub phase: f64,
}

impl SineComponent {
    fn sample(&self, t_ms: f64) -> f64 {
        (std::f64::consts::TAU * self.freq_hz * (t_ms / 1000.0) + self.phase).sin()
    }

    fn sample_quadrature(&self, t_ms: f64) -> f64 {
        (std::f64::consts::TAU * self.freq_hz * (t_ms / 1000.0) + self.phase).cos()
    }
}

/// Per-slide drift parameters: one sinusoid for scale micro-variation, one
/// (sampled on both axes in quadrature) for pan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriftParams {
    pub scale: SineComponent,
    pub pan: SineComponent,
}

impl DriftParams {
    pub fn derive(seed: u64, slide_index: usize) -> Self {
        let base = splitmix64(seed.wrapping_add(0x5eed).wrapping_add(slide_index as u64));
        let next = splitmix64(base);

        Self {
            scale: SineComponent {
                freq_hz: lerp_unit(FREQ_MIN_HZ, FREQ_MAX_HZ, unit(base)),
                phase: std::f64::consts::TAU * unit(base >> 17),
            },
            pan: SineComponent {
                freq_hz: lerp_unit(FREQ_MIN_HZ, FREQ_MAX_HZ, unit(next)),
                phase: std::f64::consts::TAU * unit(next >> 17),
            },
        }
    }

    /// Multiplicative scale factor, centered on 1.0.
    pub fn scale_factor(&self, since_settle_ms: f64) -> f64 {
        let amp = DRIFT_SCALE_AMPLITUDE * ramp(since_settle_ms);
        1.0 + amp * self.scale.sample(since_settle_ms)
    }

    /// Pan offset in canvas pixels. Callers clamp against the drawn slack so
    /// drift never exposes a canvas edge.
    pub fn pan_offset(&self, since_settle_ms: f64) -> (f64, f64) {
        let amp = DRIFT_PAN_AMPLITUDE_PX * ramp(since_settle_ms);
        (
            amp * self.pan.sample(since_settle_ms),
            amp * self.pan.sample_quadrature(since_settle_ms),
        )
    }
}

/// Time since drift onset, or `None` while the punch is still settling.
pub fn drift_window_ms(elapsed_ms: f64, last_step_at_ms: u64) -> Option<f64> {
    let start = last_step_at_ms as f64 + DRIFT_SETTLE_MS;
    (elapsed_ms > start).then(|| elapsed_ms - start)
}

fn ramp(since_settle_ms: f64) -> f64 {
    Ease::OutCubic.apply((since_settle_ms / DRIFT_RAMP_MS).clamp(0.0, 1.0))
}

fn unit(bits: u64) -> f64 {
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

fn lerp_unit(lo: f64, hi: f64, t: f64) -> f64 {
    lo + (hi - lo) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_per_seed_and_slide() {
        let a = DriftParams::derive(9, 2);
        let b = DriftParams::derive(9, 2);
        assert_eq!(a, b);
        assert_ne!(a, DriftParams::derive(9, 3));
        assert_ne!(a, DriftParams::derive(10, 2));
    }

    #[test]
    fn frequencies_stay_in_band() {
        for seed in 0..32u64 {
            for idx in 0..4usize {
                let p = DriftParams::derive(seed, idx);
                assert!(p.scale.freq_hz >= FREQ_MIN_HZ && p.scale.freq_hz <= FREQ_MAX_HZ);
                assert!(p.pan.freq_hz >= FREQ_MIN_HZ && p.pan.freq_hz <= FREQ_MAX_HZ);
            }
        }
    }

    #[test]
    fn no_drift_before_settle() {
        assert_eq!(drift_window_ms(0.0, 200), None);
        assert_eq!(drift_window_ms(200.0 + DRIFT_SETTLE_MS, 200), None);
        let t = drift_window_ms(200.0 + DRIFT_SETTLE_MS + 10.0, 200).unwrap();
        assert!((t - 10.0).abs() < 1e-9);
    }

    #[test]
    fn amplitudes_are_bounded() {
        let p = DriftParams::derive(1, 0);
        for step in 0..2000u32 {
            let t = f64::from(step) * 7.0;
            let s = p.scale_factor(t);
            assert!(s >= 1.0 - DRIFT_SCALE_AMPLITUDE - 1e-12);
            assert!(s <= 1.0 + DRIFT_SCALE_AMPLITUDE + 1e-12);
            let (dx, dy) = p.pan_offset(t);
            assert!(dx.abs() <= DRIFT_PAN_AMPLITUDE_PX + 1e-12);
            assert!(dy.abs() <= DRIFT_PAN_AMPLITUDE_PX + 1e-12);
        }
    }

    #[test]
    fn ramp_starts_at_zero() {
        let p = DriftParams::derive(3, 1);
        // At drift onset the amplitude ramp is zero: no instantaneous jump.
        assert!((p.scale_factor(0.0) - 1.0).abs() < 1e-12);
        let (dx, dy) = p.pan_offset(0.0);
        assert_eq!((dx, dy), (0.0, 0.0));
    }
}
