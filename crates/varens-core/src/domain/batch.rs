//! Batches of samples merged together.

use serde::{Deserialize, Serialize};

use crate::config::EnsembleConfig;
use crate::domain::sample::Sample;

/// A named group of samples whose calls feed one consensus result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    id: String,
    samples: Vec<Sample>,
}

impl Batch {
    pub fn new(id: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            id: id.into(),
            samples,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Ensemble settings of the first member; batches are configured uniformly.
    pub fn ensemble_config(&self) -> Option<&EnsembleConfig> {
        self.samples.first().and_then(|s| s.ensemble.as_ref())
    }

    pub fn sample_names(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.name.as_str()).collect()
    }
}
