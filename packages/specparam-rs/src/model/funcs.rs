//! Component functions of the spectral model, all in log10 power

/// FWHM to Gaussian standard deviation: `fwhm / (2·sqrt(2·ln 2))`
pub fn gauss_std_from_fwhm(fwhm: f64) -> f64 {
    fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt())
}

pub fn gaussian(freq: f64, center: f64, height: f64, std: f64) -> f64 {
    height * (-(freq - center).powi(2) / (2.0 * std * std)).exp()
}

/// Sum of Gaussians; `params` is `[cf, height, std]` repeated.
pub fn gaussian_sum(freqs: &[f64], params: &[f64]) -> Vec<f64> {
    freqs
        .iter()
        .map(|&f| {
            params
                .chunks_exact(3)
                .map(|p| gaussian(f, p[0], p[1], p[2]))
                .sum()
        })
        .collect()
}

/// Aperiodic component without a knee: `offset - log10(f^exp)`
pub fn aperiodic_fixed(freqs: &[f64], offset: f64, exponent: f64) -> Vec<f64> {
    freqs.iter().map(|&f| offset - exponent * f.log10()).collect()
}

/// Aperiodic component with a knee: `offset - log10(knee + f^exp)`
pub fn aperiodic_knee(freqs: &[f64], offset: f64, knee: f64, exponent: f64) -> Vec<f64> {
    freqs
        .iter()
        .map(|&f| offset - (knee + f.powf(exponent)).log10())
        .collect()
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Squared Pearson correlation.
pub fn r_squared(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        var_a += (x - ma).powi(2);
        var_b += (y - mb).powi(2);
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).powi(2)
}

pub fn mean_abs_error(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
}
