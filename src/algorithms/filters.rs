//! Signal smoothing used on course profiles.

/// Savitzky-Golay smoothing with mirrored edge padding.
///
/// Returns `None` when the signal is too short for the window (the caller
/// keeps the raw signal in that case). `window` must be odd and larger than
/// `order + 1`.
pub fn savitzky_golay(y: &[f64], window: usize, order: usize) -> Option<Vec<f64>> {
    if window % 2 != 1 || window < order + 2 {
        return None;
    }
    let half = (window - 1) / 2;
    if y.len() < half + 1 {
        return None;
    }

    let coeffs = sg_coefficients(window, order)?;

    // pad the signal at the extremes with values mirrored from itself
    let first = y[0];
    let last = y[y.len() - 1];
    let mut padded = Vec::with_capacity(y.len() + 2 * half);
    for i in (1..=half).rev() {
        padded.push(first - (y[i] - first).abs());
    }
    padded.extend_from_slice(y);
    for i in (1..=half).rev() {
        padded.push(last + (y[y.len() - 1 - i] - last).abs());
    }

    let mut out = Vec::with_capacity(y.len());
    for j in 0..y.len() {
        let mut acc = 0.0;
        for (t, c) in coeffs.iter().enumerate() {
            acc += c * padded[j + t];
        }
        out.push(acc);
    }
    Some(out)
}

/// Least-squares smoothing kernel: the first row of `(B^T B)^-1 B^T` where
/// `B[k][i] = k^i` over the centered window.
fn sg_coefficients(window: usize, order: usize) -> Option<Vec<f64>> {
    let half = (window - 1) as i64 / 2;
    let cols = order + 1;

    // normal matrix B^T B and its inverse via Gauss-Jordan
    let mut btb = vec![vec![0.0f64; cols]; cols];
    for r in 0..cols {
        for c in 0..cols {
            let mut s = 0.0;
            for k in -half..=half {
                s += (k as f64).powi(r as i32) * (k as f64).powi(c as i32);
            }
            btb[r][c] = s;
        }
    }
    let inv = invert(&mut btb)?;

    let mut coeffs = Vec::with_capacity(window);
    for k in -half..=half {
        let mut s = 0.0;
        for (i, g) in inv[0].iter().enumerate() {
            s += g * (k as f64).powi(i as i32);
        }
        coeffs.push(s);
    }
    Some(coeffs)
}

fn invert(a: &mut [Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| {
            a[r1][col]
                .abs()
                .partial_cmp(&a[r2][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);
        let p = a[col][col];
        for j in 0..n {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let f = a[r][col];
            for j in 0..n {
                a[r][j] -= f * a[col][j];
                inv[r][j] -= f * inv[col][j];
            }
        }
    }
    Some(inv)
}

/// Single-pole low-pass applied forward then backward, endpoints pinned.
pub fn low_pass_forward_backward(values: &[f64], coeff: f64) -> Vec<f64> {
    let n = values.len();
    let mut out = values.to_vec();
    if n < 3 {
        return out;
    }
    for i in 1..n - 1 {
        out[i] = values[i] * coeff + out[i - 1] * (1.0 - coeff);
    }
    for i in (0..n - 1).rev() {
        out[i] = out[i] * coeff + out[i + 1] * (1.0 - coeff);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sg_preserves_constant_signal() {
        let y = vec![100.0; 80];
        let s = savitzky_golay(&y, 53, 3).unwrap();
        assert_eq!(s.len(), y.len());
        for v in &s {
            assert!((v - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn sg_preserves_linear_ramp() {
        let y: Vec<f64> = (0..120).map(|i| 10.0 + 0.5 * i as f64).collect();
        let s = savitzky_golay(&y, 53, 3).unwrap();
        // interior of a polynomial below the fit order passes through unchanged
        for i in 26..y.len() - 26 {
            assert!((s[i] - y[i]).abs() < 1e-6, "i={i}: {} vs {}", s[i], y[i]);
        }
    }

    #[test]
    fn sg_rejects_short_signal() {
        assert!(savitzky_golay(&[1.0, 2.0, 3.0], 53, 3).is_none());
    }

    #[test]
    fn sg_rejects_even_window() {
        assert!(savitzky_golay(&vec![0.0; 100], 52, 3).is_none());
    }

    #[test]
    fn sg_kernel_weights_sum_to_one() {
        let c = sg_coefficients(53, 3).unwrap();
        let sum: f64 = c.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum {sum}");
    }

    #[test]
    fn low_pass_pins_endpoints_and_smooths_step() {
        let mut step = vec![0.0; 10];
        step.extend(vec![10.0; 10]);
        let s = low_pass_forward_backward(&step, 0.15);
        assert_eq!(s.len(), 20);
        assert_eq!(s[19], 10.0);
        // the transition is spread out, no overshoot
        for w in s.windows(2) {
            assert!(w[1] >= w[0] - 1e-9);
        }
        assert!(s[10] < 10.0);
        assert!(s[9] > 0.0);
    }
}
