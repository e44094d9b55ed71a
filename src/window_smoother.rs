/// Flat moving-average smoothing
///
/// One smoother serves both anomaly windows: the short window knocks the
/// GPS jitter out of a velocity series, the long window approximates the
/// rider's quiescent speed over the whole track. The series is reflected
/// at both edges before averaging so the output keeps the input length
/// and stays index-aligned with the other per-pair arrays.

use thiserror::Error;

/// Default short window, in samples.
pub const DEFAULT_WINDOW: usize = 11;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmoothError {
    /// A series shorter than the window cannot be smoothed meaningfully;
    /// refusing beats silently truncating the window.
    #[error("input vector ({len} samples) needs to be bigger than window size ({window})")]
    InputTooShort { len: usize, window: usize },
}

/// Smooth a series with a flat window of the given length.
///
/// Windows below 3 samples are a no-op and return the input unchanged.
/// Output length always equals input length.
pub fn smooth_flat(series: &[f64], window: usize) -> Result<Vec<f64>, SmoothError> {
    if window < 3 {
        return Ok(series.to_vec());
    }

    let n = series.len();
    if n < window {
        return Err(SmoothError::InputTooShort { len: n, window });
    }

    // reflect window-1 samples at each edge
    let mut padded = Vec::with_capacity(n + 2 * (window - 1));
    for i in (1..window).rev() {
        padded.push(series[i]);
    }
    padded.extend_from_slice(series);
    for i in 1..window {
        padded.push(series[n - i]);
    }

    let offset = window / 2;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let sum: f64 = padded[i + offset..i + offset + window].iter().sum();
        out.push(sum / window as f64);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_window_is_identity() {
        let series = vec![3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(smooth_flat(&series, 0).unwrap(), series);
        assert_eq!(smooth_flat(&series, 1).unwrap(), series);
        assert_eq!(smooth_flat(&series, 2).unwrap(), series);
    }

    #[test]
    fn refuses_series_shorter_than_window() {
        let series = vec![1.0, 2.0, 3.0];
        assert_eq!(
            smooth_flat(&series, 4),
            Err(SmoothError::InputTooShort { len: 3, window: 4 })
        );
    }

    #[test]
    fn output_length_matches_input_length() {
        let series: Vec<f64> = (0..40).map(|i| (i as f64 * 0.7).sin()).collect();

        for window in [3, 4, 5, 11, 20, 39, 40] {
            let smoothed = smooth_flat(&series, window).unwrap();
            assert_eq!(smoothed.len(), series.len(), "window {window}");
        }
    }

    #[test]
    fn constant_series_is_unchanged() {
        let series = vec![7.5; 25];
        let smoothed = smooth_flat(&series, 11).unwrap();

        for v in smoothed {
            assert!((v - 7.5).abs() < 1e-12);
        }
    }

    #[test]
    fn window_of_three_averages_neighbours() {
        let series = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let smoothed = smooth_flat(&series, 3).unwrap();

        // reflected padding: [3, 2 | 1 2 3 4 5 | 5, 4]
        let expected = [5.0 / 3.0, 2.0, 3.0, 4.0, 14.0 / 3.0];
        for (got, want) in smoothed.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn smoothing_damps_a_spike() {
        let mut series = vec![10.0; 31];
        series[15] = 40.0;

        let smoothed = smooth_flat(&series, 11).unwrap();
        assert!(smoothed[15] < 15.0);
        assert!(smoothed[15] > 10.0);
    }
}
