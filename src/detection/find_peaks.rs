//! A 1D peak-finding primitive with the filter set of `scipy.signal.find_peaks`.
//!
//! Peaks are plateau-aware local maxima. Filters run in a fixed order so a
//! cheap criterion prunes candidates before an expensive one: plateau size,
//! height, threshold, distance, prominence, width. Prominences and widths are
//! computed once and carried into the returned properties.

use crate::error::{Result, SpectraFitError};
use indexmap::IndexMap;
use ndarray::Array1;

/// An inclusive filter interval. A missing end leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Interval {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }
}

/// Filter arguments for [`find_peaks`].
#[derive(Debug, Clone, Default)]
pub struct FindPeaksArgs {
    /// Required peak height range.
    pub height: Option<Interval>,
    /// Required vertical distance to the neighboring samples.
    pub threshold: Option<Interval>,
    /// Minimal horizontal distance in samples between retained peaks.
    pub distance: Option<f64>,
    /// Required prominence range.
    pub prominence: Option<Interval>,
    /// Required width range in samples.
    pub width: Option<Interval>,
    /// Window length in samples that limits the prominence base search.
    pub wlen: Option<f64>,
    /// Relative height at which widths are measured; `None` means 0.5.
    pub rel_height: Option<f64>,
    /// Required plateau size range in samples.
    pub plateau_size: Option<Interval>,
}

/// Candidate peaks plus the per-candidate property arrays the filters
/// produced, keyed by the conventional property names.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PeakCandidates {
    /// Sample indices of the retained peaks, ascending.
    pub positions: Vec<usize>,
    /// Per-candidate arrays: heights, thresholds, prominences, bases,
    /// widths, interpolated crossing points, plateau edges.
    pub properties: IndexMap<String, Vec<f64>>,
}

impl PeakCandidates {
    /// Convenience accessor for a property array.
    pub fn property(&self, name: &str) -> Option<&[f64]> {
        self.properties.get(name).map(|v| v.as_slice())
    }
}

/// Find local maxima in `y` satisfying the given filters.
pub fn find_peaks(y: &Array1<f64>, args: &FindPeaksArgs) -> Result<PeakCandidates> {
    if y.len() < 3 {
        return Err(SpectraFitError::InvalidInput(
            "peak finding needs at least 3 samples".to_string(),
        ));
    }

    let data = y.to_vec();
    let (mut peaks, left_edges, right_edges) = local_maxima(&data);
    let mut properties: IndexMap<String, Vec<f64>> = IndexMap::new();

    // Plateau size.
    let mut plateau_left = left_edges;
    let mut plateau_right = right_edges;
    if let Some(interval) = args.plateau_size {
        let keep: Vec<bool> = peaks
            .iter()
            .enumerate()
            .map(|(i, _)| interval.contains((plateau_right[i] - plateau_left[i] + 1) as f64))
            .collect();
        retain_by(&mut peaks, &keep);
        retain_by(&mut plateau_left, &keep);
        retain_by(&mut plateau_right, &keep);
    }
    properties.insert(
        "plateau_sizes".to_string(),
        peaks
            .iter()
            .enumerate()
            .map(|(i, _)| (plateau_right[i] - plateau_left[i] + 1) as f64)
            .collect(),
    );
    properties.insert(
        "left_edges".to_string(),
        plateau_left.iter().map(|&v| v as f64).collect(),
    );
    properties.insert(
        "right_edges".to_string(),
        plateau_right.iter().map(|&v| v as f64).collect(),
    );

    // Height.
    if let Some(interval) = args.height {
        let keep: Vec<bool> = peaks.iter().map(|&p| interval.contains(data[p])).collect();
        retain_by(&mut peaks, &keep);
        retain_properties(&mut properties, &keep);
    }
    properties.insert(
        "peak_heights".to_string(),
        peaks.iter().map(|&p| data[p]).collect(),
    );

    // Threshold: vertical distance to the neighboring samples.
    if let Some(interval) = args.threshold {
        let left_t: Vec<f64> = peaks.iter().map(|&p| data[p] - data[p - 1]).collect();
        let right_t: Vec<f64> = peaks.iter().map(|&p| data[p] - data[p + 1]).collect();
        let keep: Vec<bool> = peaks
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let lo = left_t[i].min(right_t[i]);
                let hi = left_t[i].max(right_t[i]);
                interval.min.map_or(true, |m| lo >= m) && interval.max.map_or(true, |m| hi <= m)
            })
            .collect();
        let mut left_t = left_t;
        let mut right_t = right_t;
        retain_by(&mut peaks, &keep);
        retain_by(&mut left_t, &keep);
        retain_by(&mut right_t, &keep);
        retain_properties(&mut properties, &keep);
        properties.insert("left_thresholds".to_string(), left_t);
        properties.insert("right_thresholds".to_string(), right_t);
    }

    // Distance: greedily keep the higher of any two close peaks.
    if let Some(distance) = args.distance {
        if distance < 1.0 {
            return Err(SpectraFitError::InvalidInput(
                "distance must be at least 1 sample".to_string(),
            ));
        }
        let keep = select_by_peak_distance(&peaks, &data, distance.ceil() as usize);
        retain_by(&mut peaks, &keep);
        retain_properties(&mut properties, &keep);
    }

    // Prominence.
    let wlen = match args.wlen {
        Some(w) => {
            let rounded = w.ceil() as usize;
            if rounded < 2 {
                return Err(SpectraFitError::InvalidInput(
                    "wlen must be larger than 1 sample".to_string(),
                ));
            }
            Some(rounded)
        }
        None => None,
    };
    let (mut prominences, mut left_bases, mut right_bases) =
        peak_prominences(&data, &peaks, wlen);
    if let Some(interval) = args.prominence {
        let keep: Vec<bool> = prominences.iter().map(|&p| interval.contains(p)).collect();
        retain_by(&mut peaks, &keep);
        retain_by(&mut prominences, &keep);
        retain_by(&mut left_bases, &keep);
        retain_by(&mut right_bases, &keep);
        retain_properties(&mut properties, &keep);
    }
    properties.insert("prominences".to_string(), prominences.clone());
    properties.insert(
        "left_bases".to_string(),
        left_bases.iter().map(|&v| v as f64).collect(),
    );
    properties.insert(
        "right_bases".to_string(),
        right_bases.iter().map(|&v| v as f64).collect(),
    );

    // Width at the requested relative height.
    let rel_height = args.rel_height.unwrap_or(0.5);
    if rel_height < 0.0 {
        return Err(SpectraFitError::InvalidInput(
            "rel_height must not be negative".to_string(),
        ));
    }
    let (mut widths, mut width_heights, mut left_ips, mut right_ips) =
        peak_widths(&data, &peaks, rel_height, &prominences, &left_bases, &right_bases);
    if let Some(interval) = args.width {
        let keep: Vec<bool> = widths.iter().map(|&w| interval.contains(w)).collect();
        retain_by(&mut peaks, &keep);
        retain_by(&mut widths, &keep);
        retain_by(&mut width_heights, &keep);
        retain_by(&mut left_ips, &keep);
        retain_by(&mut right_ips, &keep);
        retain_properties(&mut properties, &keep);
    }
    properties.insert("widths".to_string(), widths);
    properties.insert("width_heights".to_string(), width_heights);
    properties.insert("left_ips".to_string(), left_ips);
    properties.insert("right_ips".to_string(), right_ips);

    Ok(PeakCandidates {
        positions: peaks,
        properties,
    })
}

/// Plateau-aware local maxima scan.
///
/// Returns `(midpoints, left_edges, right_edges)`; a flat-topped peak
/// reports the middle sample of its plateau.
fn local_maxima(y: &[f64]) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let mut midpoints = Vec::new();
    let mut left_edges = Vec::new();
    let mut right_edges = Vec::new();

    let i_max = y.len() - 1;
    let mut i = 1;
    while i < i_max {
        if y[i - 1] < y[i] {
            let mut i_ahead = i + 1;
            while i_ahead < i_max && y[i_ahead] == y[i] {
                i_ahead += 1;
            }
            if y[i_ahead] < y[i] {
                let left = i;
                let right = i_ahead - 1;
                midpoints.push((left + right) / 2);
                left_edges.push(left);
                right_edges.push(right);
                i = i_ahead;
            }
        }
        i += 1;
    }

    (midpoints, left_edges, right_edges)
}

/// Keep the highest peaks such that no two retained peaks are closer than
/// `distance` samples. Candidates are visited from highest to lowest.
fn select_by_peak_distance(peaks: &[usize], y: &[f64], distance: usize) -> Vec<bool> {
    let n = peaks.len();
    let mut keep = vec![true; n];

    let mut priority: Vec<usize> = (0..n).collect();
    priority.sort_by(|&a, &b| y[peaks[a]].partial_cmp(&y[peaks[b]]).unwrap_or(std::cmp::Ordering::Equal));

    for &j in priority.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 {
            k -= 1;
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        let mut k = j + 1;
        while k < n {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
            k += 1;
        }
    }

    keep
}

/// Prominence of each peak: its height above the higher of the two lowest
/// points reached while walking outward until a higher sample (or the `wlen`
/// window edge) stops the walk.
///
/// Returns `(prominences, left_bases, right_bases)`.
fn peak_prominences(
    y: &[f64],
    peaks: &[usize],
    wlen: Option<usize>,
) -> (Vec<f64>, Vec<usize>, Vec<usize>) {
    let n = y.len();
    let mut prominences = Vec::with_capacity(peaks.len());
    let mut left_bases = Vec::with_capacity(peaks.len());
    let mut right_bases = Vec::with_capacity(peaks.len());

    for &peak in peaks {
        let peak_val = y[peak];
        let (i_min, i_max) = match wlen {
            Some(w) if w >= 2 => (peak.saturating_sub(w / 2), (peak + w / 2).min(n - 1)),
            _ => (0, n - 1),
        };

        let mut left_min = peak_val;
        let mut left_base = peak;
        let mut i = peak;
        while i > i_min {
            i -= 1;
            if y[i] > peak_val {
                break;
            }
            if y[i] < left_min {
                left_min = y[i];
                left_base = i;
            }
        }

        let mut right_min = peak_val;
        let mut right_base = peak;
        let mut i = peak;
        while i < i_max {
            i += 1;
            if y[i] > peak_val {
                break;
            }
            if y[i] < right_min {
                right_min = y[i];
                right_base = i;
            }
        }

        prominences.push(peak_val - left_min.max(right_min));
        left_bases.push(left_base);
        right_bases.push(right_base);
    }

    (prominences, left_bases, right_bases)
}

/// Width of each peak at `peak_height - prominence * rel_height`, with the
/// crossings interpolated between samples.
///
/// Returns `(widths, width_heights, left_ips, right_ips)`.
fn peak_widths(
    y: &[f64],
    peaks: &[usize],
    rel_height: f64,
    prominences: &[f64],
    left_bases: &[usize],
    right_bases: &[usize],
) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut widths = Vec::with_capacity(peaks.len());
    let mut width_heights = Vec::with_capacity(peaks.len());
    let mut left_ips = Vec::with_capacity(peaks.len());
    let mut right_ips = Vec::with_capacity(peaks.len());

    for (i, &peak) in peaks.iter().enumerate() {
        let height = y[peak] - prominences[i] * rel_height;

        let mut l = peak;
        while l > left_bases[i] && height < y[l] {
            l -= 1;
        }
        let mut left_ip = l as f64;
        if y[l] < height {
            left_ip += (height - y[l]) / (y[l + 1] - y[l]);
        }

        let mut r = peak;
        while r < right_bases[i] && height < y[r] {
            r += 1;
        }
        let mut right_ip = r as f64;
        if y[r] < height {
            right_ip -= (height - y[r]) / (y[r - 1] - y[r]);
        }

        widths.push(right_ip - left_ip);
        width_heights.push(height);
        left_ips.push(left_ip);
        right_ips.push(right_ip);
    }

    (widths, width_heights, left_ips, right_ips)
}

fn retain_by<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut it = keep.iter();
    values.retain(|_| *it.next().unwrap_or(&false));
}

fn retain_properties(properties: &mut IndexMap<String, Vec<f64>>, keep: &[bool]) {
    for values in properties.values_mut() {
        retain_by(values, keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn triangle_signal() -> Array1<f64> {
        // Peaks of heights 3 and 5 at indices 2 and 6.
        Array1::from_vec(vec![0.0, 1.0, 3.0, 1.0, 0.0, 2.0, 5.0, 2.0, 0.0])
    }

    #[test]
    fn test_finds_plain_maxima() {
        let y = triangle_signal();
        let found = find_peaks(&y, &FindPeaksArgs::default()).unwrap();
        assert_eq!(found.positions, vec![2, 6]);
    }

    #[test]
    fn test_plateau_midpoint() {
        let y = Array1::from_vec(vec![0.0, 2.0, 2.0, 2.0, 0.0]);
        let found = find_peaks(&y, &FindPeaksArgs::default()).unwrap();
        assert_eq!(found.positions, vec![2]);
        assert_eq!(found.property("plateau_sizes").unwrap(), &[3.0]);
    }

    #[test]
    fn test_height_filter() {
        let y = triangle_signal();
        let args = FindPeaksArgs {
            height: Some(Interval::at_least(4.0)),
            ..Default::default()
        };
        let found = find_peaks(&y, &args).unwrap();
        assert_eq!(found.positions, vec![6]);
        assert_eq!(found.property("peak_heights").unwrap(), &[5.0]);
    }

    #[test]
    fn test_threshold_filter() {
        // Peak at 2 rises 2.0 above both neighbors; peak at 6 rises 3.0.
        let y = triangle_signal();
        let args = FindPeaksArgs {
            threshold: Some(Interval::at_least(2.5)),
            ..Default::default()
        };
        let found = find_peaks(&y, &args).unwrap();
        assert_eq!(found.positions, vec![6]);
    }

    #[test]
    fn test_distance_keeps_higher_peak() {
        let y = Array1::from_vec(vec![0.0, 3.0, 2.0, 4.0, 0.0, 0.0, 1.0, 0.0]);
        let args = FindPeaksArgs {
            distance: Some(3.0),
            ..Default::default()
        };
        let found = find_peaks(&y, &args).unwrap();
        // Peaks at 1 and 3 are 2 apart; the higher one (index 3) wins.
        assert_eq!(found.positions, vec![3, 6]);
    }

    #[test]
    fn test_prominence_of_isolated_peak_is_its_height_above_floor() {
        let y = triangle_signal();
        let found = find_peaks(&y, &FindPeaksArgs::default()).unwrap();
        let prominences = found.property("prominences").unwrap();
        // Peak 2 walks down to 0 on the left, and to 0 at index 4 on the
        // right before the higher peak stops the walk.
        assert_eq!(prominences, &[3.0, 5.0]);
    }

    #[test]
    fn test_width_at_half_prominence() {
        let y = Array1::from_vec(vec![0.0, 2.0, 4.0, 2.0, 0.0]);
        let found = find_peaks(&y, &FindPeaksArgs::default()).unwrap();
        let widths = found.property("widths").unwrap();
        // Half prominence height is 2.0, crossed exactly at indices 1 and 3.
        assert_eq!(widths, &[2.0]);
    }

    #[test]
    fn test_wlen_narrows_prominence_window() {
        // Two peaks around a shallow valley; a narrow window hides the
        // deeper minima outside it.
        let y = Array1::from_vec(vec![0.0, 5.0, 3.0, 4.0, 3.0, 5.0, 0.0]);
        let unwindowed = find_peaks(&y, &FindPeaksArgs::default()).unwrap();
        let args = FindPeaksArgs {
            wlen: Some(3.0),
            ..Default::default()
        };
        let windowed = find_peaks(&y, &args).unwrap();

        let middle_unwindowed = unwindowed.property("prominences").unwrap()[1];
        let middle_windowed = windowed.property("prominences").unwrap()[1];
        assert!(middle_windowed <= middle_unwindowed);
    }

    #[test]
    fn test_too_short_signal_is_rejected() {
        let y = Array1::from_vec(vec![1.0, 2.0]);
        assert!(find_peaks(&y, &FindPeaksArgs::default()).is_err());
    }

    #[test]
    fn test_properties_stay_aligned_after_filters() {
        let y = triangle_signal();
        let args = FindPeaksArgs {
            height: Some(Interval::at_least(4.0)),
            prominence: Some(Interval::at_least(0.0)),
            ..Default::default()
        };
        let found = find_peaks(&y, &args).unwrap();
        for (name, values) in &found.properties {
            assert_eq!(values.len(), found.positions.len(), "{}", name);
        }
    }
}
