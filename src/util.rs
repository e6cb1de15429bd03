pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// `part / whole * 100`, rounded half up, in integer arithmetic.
///
/// Returns 0 for an empty whole.
pub fn percent_half_up(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as u64 * 200 + whole as u64) / (whole as u64 * 2)) as u32
}
