//! `Reporter` — the seam to whatever stands in for the vital-sign simulator,
//! the ML inference model, and the feature scaler (§4.9, out of scope). The
//! client runtime pulls fully-formed, tier-stamped report tuples from one of
//! these; it never computes a probability itself.

use rand::Rng;

use crate::report::{ClinicalInputs, NewReport};

/// Classifies a probability into a wire tier using the client-side
/// boundaries: `>= green_threshold` is AMBER (inclusive), `>= amber_threshold`
/// is RED (inclusive); below `green_threshold` is GREEN.
pub fn classify_tier(
    probability: f64,
    green_threshold: f64,
    amber_threshold: f64,
) -> crate::report::WireTier {
    use crate::report::WireTier;
    if probability >= amber_threshold {
        WireTier::Red
    } else if probability >= green_threshold {
        WireTier::Amber
    } else {
        WireTier::Green
    }
}

/// Produces fully-formed report tuples. The shipped client ships exactly one
/// implementation, a deterministic-feeling pseudo-random generator, so the
/// crate is runnable end-to-end without the real simulator/model/scaler
/// stack.
pub trait Reporter: Send {
    /// Produces the next report, stamping `patient_id` and `timestamp`
    /// itself; `green_threshold`/`amber_threshold` are used to classify the
    /// generated probability into a [`crate::report::WireTier`].
    fn next_report(&mut self, green_threshold: f64, amber_threshold: f64) -> NewReport;
}

/// Synthetic stand-in for the real vital-sign simulator + ML model +
/// scaler pipeline: samples clinical inputs from plausible ranges and
/// derives a probability from them with a fixed, simple scoring function
/// (not a reimplementation of any real trained model).
pub struct SyntheticReporter {
    patient_ids: Vec<String>,
    next_timestamp: i64,
}

impl SyntheticReporter {
    pub fn new(patient_ids: Vec<String>, start_timestamp: i64) -> Self {
        SyntheticReporter {
            patient_ids,
            next_timestamp: start_timestamp,
        }
    }
}

impl Reporter for SyntheticReporter {
    fn next_report(&mut self, green_threshold: f64, amber_threshold: f64) -> NewReport {
        let mut rng = rand::thread_rng();

        let patient_id = self.patient_ids[rng.gen_range(0..self.patient_ids.len())].clone();
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;

        let inputs = ClinicalInputs {
            age: rng.gen_range(40.0..90.0),
            serum_sodium: rng.gen_range(125.0..145.0),
            serum_creatinine: rng.gen_range(0.6..3.0),
            ejection_fraction: rng.gen_range(15.0..65.0),
            day: rng.gen_range(0..300),
        };

        // A cheap, deterministic-given-inputs scoring function standing in
        // for the out-of-scope trained model: low ejection fraction and high
        // creatinine push the probability up.
        let probability = ((90.0 - inputs.ejection_fraction) / 90.0 * 0.6
            + (inputs.serum_creatinine / 3.0) * 0.4)
            .clamp(0.0, 1.0);

        let tier = classify_tier(probability, green_threshold, amber_threshold);

        NewReport {
            patient_id,
            timestamp,
            inputs,
            probability,
            tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::WireTier;

    #[test]
    fn classify_tier_boundaries_are_inclusive() {
        assert_eq!(classify_tier(0.30, 0.30, 0.60), WireTier::Amber);
        assert_eq!(classify_tier(0.60, 0.30, 0.60), WireTier::Red);
        assert_eq!(classify_tier(0.29, 0.30, 0.60), WireTier::Green);
    }

    #[test]
    fn synthetic_reporter_stamps_patient_and_monotonic_timestamp() {
        let mut reporter = SyntheticReporter::new(vec!["P1".into()], 1000);
        let r1 = reporter.next_report(0.30, 0.60);
        let r2 = reporter.next_report(0.30, 0.60);
        assert_eq!(r1.patient_id, "P1");
        assert_eq!(r1.timestamp, 1000);
        assert_eq!(r2.timestamp, 1001);
        assert!(r1.probability >= 0.0 && r1.probability <= 1.0);
    }
}
