//! Batch grouping.
//!
//! Qualifying samples are gathered under their batch tag; an untagged
//! qualifying sample becomes a singleton batch keyed by its own name.
//! Everything else passes through untouched.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{Batch, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Explicit,
    Singleton,
}

/// Batches in first-seen order plus the samples that did not qualify.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchGrouping {
    batches: Vec<Batch>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    extras: Vec<Sample>,
}

impl BatchGrouping {
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Samples that failed the predicate, in their original relative order.
    pub fn extras(&self) -> &[Sample] {
        &self.extras
    }

    pub fn get(&self, batch_id: &str) -> Option<&Batch> {
        self.index.get(batch_id).map(|&i| &self.batches[i])
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Batch>, Vec<Sample>) {
        (self.batches, self.extras)
    }
}

/// Group samples accepted by `qualifies` into batches.
///
/// # Panics
///
/// If one key is used both as an explicit batch name and as an untagged
/// sample's name, or two untagged qualifying samples share a name. Either
/// means upstream handed over inconsistent sample metadata.
pub fn group_by_batches<F>(samples: impl IntoIterator<Item = Sample>, qualifies: F) -> BatchGrouping
where
    F: Fn(&Sample) -> bool,
{
    let mut grouping = BatchGrouping::default();
    let mut kinds: HashMap<String, KeyKind> = HashMap::new();

    for sample in samples {
        if !qualifies(&sample) {
            grouping.extras.push(sample);
            continue;
        }

        let (key, kind) = match sample.batch.as_deref() {
            Some(batch) => (batch.to_string(), KeyKind::Explicit),
            None => (sample.name.clone(), KeyKind::Singleton),
        };

        match (kinds.get(&key).copied(), kind) {
            (None, _) => {
                kinds.insert(key.clone(), kind);
                grouping.index.insert(key.clone(), grouping.batches.len());
                grouping.batches.push(Batch::new(key, vec![sample]));
            }
            (Some(KeyKind::Explicit), KeyKind::Explicit) => {
                let i = grouping.index[&key];
                grouping.batches[i].push(sample);
            }
            (Some(existing), _) => panic!(
                "batch key {key:?} used as both {existing:?} and {kind:?} key \
                 (sample {:?})",
                sample.name
            ),
        }
    }

    grouping
}
