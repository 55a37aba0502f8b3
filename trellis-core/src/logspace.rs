//! Log-space arithmetic for numerically stable probability computation.
//!
//! Sequence models multiply many probabilities; working with their natural
//! logarithms turns those products into sums and avoids underflow on long
//! chains. Sums over probabilities become log-sum-exp, implemented here with
//! the usual max-subtract stabilization.
//!
//! Negative infinity is the additive identity of log-sum-exp and represents
//! an impossible event; it is absorbing under log-space multiplication.

/// Numerically stable computation of `log(exp(a) + exp(b))`.
///
/// Handles the cases where `a` or `b` are negative infinity; in particular
/// `log_sum_exp(-inf, -inf)` is `-inf`, not NaN.
#[inline]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (max, min) = if a >= b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// Log-sum-exp over a slice.
///
/// Returns `-inf` for an empty slice or a slice of all `-inf`.
pub fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}
