use crate::analytics::metrics::{percentage, round_to};
use crate::analytics::types::{FrequencyTable, TestOutcomes};
use crate::record::NormalizedRecord;

/// Pass/fail summary over the records that carry a test outcome.
///
/// Records without an outcome are not test results and are left out of every
/// count, including the pass-rate denominator.
pub fn test_outcomes(records: &[NormalizedRecord]) -> TestOutcomes {
    let mut outcomes = FrequencyTable::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for outcome in records.iter().filter_map(|r| r.outcome.as_deref()) {
        if outcome.eq_ignore_ascii_case("passed") {
            passed_count += 1;
        } else if outcome.eq_ignore_ascii_case("failed") {
            failed_count += 1;
        }
        *outcomes.entry(outcome.to_string()).or_insert(0) += 1;
    }

    let total_results = outcomes.values().sum::<u64>() as usize;
    TestOutcomes {
        total_results,
        passed_count,
        failed_count,
        pass_rate: round_to(percentage(passed_count, total_results), 2),
        outcomes,
    }
}
