/// Sum of ln-space values, computed without leaving ln space
///
/// Used wherever two ln prob terms need to be mixed (e.g. the zero-inflation
/// emission density).
///
pub fn ln_sum_exp(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if hi == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    hi + (lo - hi).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ln_sum_exp() {
        let v = ln_sum_exp(0.3f64.ln(), 0.2f64.ln());
        approx::assert_ulps_eq!(v, 0.5f64.ln(), max_ulps = 4);

        let v = ln_sum_exp(f64::NEG_INFINITY, 0.25f64.ln());
        approx::assert_ulps_eq!(v, 0.25f64.ln(), max_ulps = 4);

        assert_eq!(
            ln_sum_exp(f64::NEG_INFINITY, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
    }
}
