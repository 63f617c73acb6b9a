use sensorline_protocol::Interval;

/// The visible window as fractions `[start, end]` of the domain, clamped to
/// `[0, 1]`. Used to draw the highlighted band over the density plot.
pub fn overview_band(domain: Interval, window: (f64, f64)) -> Option<(f64, f64)> {
    let length = domain.length();
    if !length.is_finite() || length <= 0.0 {
        return None;
    }
    let frac = |t: f64| ((t - domain.low()) / length).clamp(0.0, 1.0);
    let (start, end) = window;
    Some((frac(start), frac(end.max(start))))
}

/// Count record midpoints into `bins` equal slices of the domain.
///
/// Midpoints on the domain end fall into the last bin; midpoints outside the
/// domain are ignored.
pub fn density_bins(
    intervals: impl IntoIterator<Item = Interval>,
    domain: Interval,
    bins: usize,
) -> Vec<u32> {
    let mut counts = vec![0u32; bins];
    let length = domain.length();
    if bins == 0 || !length.is_finite() || length <= 0.0 {
        return counts;
    }
    let last = bins - 1;
    for interval in intervals {
        let mid = interval.midpoint();
        if !domain.contains(mid) {
            continue;
        }
        let bin = (((mid - domain.low()) / length) * bins as f64) as usize;
        if let Some(count) = counts.get_mut(bin.min(last)) {
            *count = count.saturating_add(1);
        }
    }
    counts
}
