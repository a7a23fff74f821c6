//! Community weights from entity and chunk coverage.

use hybridrag_core::record::CommunityReport;
use std::collections::HashSet;

/// Raw weight: distinct entity names plus a tenth of distinct chunk texts.
pub fn raw_weight(report: &CommunityReport) -> f64 {
    let entities = report.entity_names.iter().collect::<HashSet<_>>().len();
    let chunks = report.chunk_texts.iter().collect::<HashSet<_>>().len();
    entities as f64 + 0.1 * chunks as f64
}

/// Assign `weight` to every report, optionally dividing by the batch maximum.
///
/// After normalization the largest weight is 1.0, or every weight is 0.0.
pub fn assign_weights(reports: &mut [CommunityReport], normalize: bool) {
    for report in reports.iter_mut() {
        report.weight = raw_weight(report);
    }

    if !normalize {
        return;
    }

    let max = reports.iter().map(|r| r.weight).fold(0.0f64, f64::max);
    if max > 0.0 {
        for report in reports.iter_mut() {
            report.weight /= max;
        }
    }
}
