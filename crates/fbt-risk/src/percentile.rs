//! Linear-interpolated percentile over a sample slice (hedge-latency
//! kill). Pure function, no allocation beyond the sort.

/// `xs` need not be sorted; `p` is 0..=100. Returns 0 for an empty slice.
pub fn percentile(xs: &[i64], p: f64) -> i64 {
    if xs.is_empty() {
        return 0;
    }
    let mut sorted: Vec<i64> = xs.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let k = (n - 1) as f64 * (p / 100.0);
    let f = k.floor() as usize;
    let c = (f + 1).min(n - 1);
    if f == c {
        return sorted[f];
    }
    let d0 = sorted[f] as f64 * (c as f64 - k);
    let d1 = sorted[c] as f64 * (k - f as f64);
    (d0 + d1).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slice_is_zero() {
        assert_eq!(percentile(&[], 95.0), 0);
    }

    #[test]
    fn single_value_is_itself() {
        assert_eq!(percentile(&[42], 95.0), 42);
    }

    #[test]
    fn p95_interpolates_between_neighbours() {
        let xs: Vec<i64> = (1..=20).collect();
        // matches the reference implementation's k=(n-1)*p/100 interpolation
        let got = percentile(&xs, 95.0);
        assert!((18..=20).contains(&got));
    }

    #[test]
    fn median_of_sorted_odd_count() {
        assert_eq!(percentile(&[1, 2, 3, 4, 5], 50.0), 3);
    }
}
