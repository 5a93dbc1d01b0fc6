use crate::fitter::CoefficientVector;
use crate::replicate::{FailureReason, ReplicateOutcome};
use crate::resample::ReplicateSpec;
use ndarray::Array2;
use std::io::Write;

/// The outcomes of a bootstrap batch, one per replicate, stored at the replicate's
/// index. Slot `i` always holds the outcome drawn from seed `base_seed + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMatrix {
    feature_names: Vec<String>,
    base_seed: u64,
    outcomes: Vec<ReplicateOutcome>,
}

impl ResultMatrix {
    pub(crate) fn new(
        feature_names: Vec<String>,
        base_seed: u64,
        outcomes: Vec<ReplicateOutcome>,
    ) -> Self {
        Self {
            feature_names,
            base_seed,
            outcomes,
        }
    }

    /// Number of replicates, `B`.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReplicateOutcome> {
        self.outcomes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicateOutcome> {
        self.outcomes.iter()
    }

    /// Names of the features, in coefficient order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// The seed replicate `index` was drawn from.
    pub fn seed_of(&self, index: usize) -> u64 {
        ReplicateSpec::for_index(index, self.base_seed).seed
    }

    /// Coefficient vectors of the successful replicates, in index order.
    pub fn successes(&self) -> Vec<&CoefficientVector> {
        self.outcomes
            .iter()
            .filter_map(ReplicateOutcome::coefficients)
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// The failed replicates as `(index, reason)`, in index order.
    pub fn failures(&self) -> Vec<(usize, &FailureReason)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.failure().map(|reason| (i, reason)))
            .collect()
    }

    /// Stacks the successful coefficient vectors into a `[successes, features]`
    /// matrix.
    pub fn to_array(&self) -> Array2<f64> {
        let successes = self.successes();
        Array2::from_shape_fn((successes.len(), self.feature_names.len()), |(i, j)| {
            successes[i][j]
        })
    }

    /// Writes one tab-separated row per replicate:
    /// `replicate  seed  status  <features...>  reason`.
    /// Failed rows leave the coefficient cells empty.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let mut header = vec!["replicate", "seed", "status"];
        header.extend(self.feature_names.iter().map(String::as_str));
        header.push("reason");
        wtr.write_record(&header)?;

        let width = self.feature_names.len();
        for (index, outcome) in self.outcomes.iter().enumerate() {
            let mut record = Vec::with_capacity(width + 4);
            record.push(index.to_string());
            record.push(self.seed_of(index).to_string());
            match outcome {
                ReplicateOutcome::Success(coefficients) => {
                    record.push("success".to_string());
                    record.extend(coefficients.iter().map(|c| c.to_string()));
                    record.push(String::new());
                }
                ReplicateOutcome::Failure(reason) => {
                    record.push("failure".to_string());
                    record.extend(std::iter::repeat_n(String::new(), width));
                    record.push(reason.to_string());
                }
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
