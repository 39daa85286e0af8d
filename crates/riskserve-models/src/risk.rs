//! Risk level derived from predicted class codes

use riskserve_core::RiskLevel;

/// Classify risk from a list of class codes
///
/// LOW when the most frequent code is 0 and the mean is below 0.5, MEDIUM
/// when the mean is below 2, HIGH otherwise. Ties for most frequent go to
/// the code seen first. An empty list is UNKNOWN.
pub fn classify_risk(codes: &[i64]) -> RiskLevel {
    if codes.is_empty() {
        return RiskLevel::Unknown;
    }

    let mean = codes.iter().map(|&c| c as f64).sum::<f64>() / codes.len() as f64;
    let mode = most_frequent(codes);

    if mode == 0 && mean < 0.5 {
        RiskLevel::Low
    } else if mean < 2.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Most frequent code; ties resolved by first occurrence
fn most_frequent(codes: &[i64]) -> i64 {
    // (code, count) in first-seen order
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for code in codes {
        match counts.iter_mut().find(|(c, _)| c == code) {
            Some((_, n)) => *n += 1,
            None => counts.push((*code, 1)),
        }
    }

    let mut best = counts[0];
    for entry in &counts[1..] {
        if entry.1 > best.1 {
            best = *entry;
        }
    }
    best.0
}
