//! Spectrum cleanup before log-domain fitting

/// Floor used when a spectrum has no strictly positive value at all.
pub const POWER_FLOOR: f64 = 1e-12;

/// Make a power spectrum safe to take the logarithm of.
///
/// Non-finite values become 0, then every value `<= 0` is replaced with the
/// smallest strictly positive value of the spectrum (or [`POWER_FLOOR`]).
/// Returns the number of replaced values.
pub fn sanitize_spectrum(power: &mut [f64]) -> usize {
    for p in power.iter_mut() {
        if !p.is_finite() {
            *p = 0.0;
        }
    }

    let min_positive = power
        .iter()
        .copied()
        .filter(|p| *p > 0.0)
        .min_by(|a, b| a.total_cmp(b))
        .unwrap_or(POWER_FLOOR);

    let mut replaced = 0;
    for p in power.iter_mut() {
        if *p <= 0.0 {
            *p = min_positive;
            replaced += 1;
        }
    }
    replaced
}
