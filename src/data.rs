//! Example records, feature vectors and dataset loading.
//!
//! Features are precomputed upstream (e.g. averaged word embeddings) and arrive
//! either as JSONL files or from the [`crate::synthetic`] generator. Each line of
//! a JSONL dataset is one example:
//!
//! ```text
//! {"id": 17, "features": [0.12, -0.4, ...], "label": 1}
//! ```

use crate::error::{ExperimentError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating a dataset
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Dataset file not found: {0}")]
    NotFound(String),

    #[error("No examples found in dataset")]
    Empty,

    #[error("Malformed record on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate example id: {0}")]
    DuplicateId(ExampleId),

    #[error("Example {id} has {found} features, dataset dimension is {expected}")]
    InconsistentDimension {
        id: ExampleId,
        expected: usize,
        found: usize,
    },

    #[error("Invalid label {0}: binary labels must be 0 or 1")]
    InvalidLabel(u8),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Unique example identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleId(pub u64);

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binary ground-truth label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Label {
    /// Class 0
    Negative,
    /// Class 1
    Positive,
}

impl Label {
    /// Both classes, in class-index order
    pub const ALL: [Self; 2] = [Self::Negative, Self::Positive];

    /// Class index used to address probability vectors
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Negative => 0,
            Self::Positive => 1,
        }
    }
}

impl TryFrom<u8> for Label {
    type Error = DataError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Negative),
            1 => Ok(Self::Positive),
            other => Err(DataError::InvalidLabel(other)),
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> Self {
        match label {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Model input features.
///
/// This is the only representation the clusterer and the models ever see, so
/// identifiers, labels and scores cannot leak into distance computations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(Vec<f64>);

impl Features {
    /// Wrap a raw feature vector
    #[must_use]
    pub const fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Dimensionality
    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Raw values
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Squared Euclidean distance to another vector of the same dimension
    #[must_use]
    pub fn squared_distance(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

impl From<Vec<f64>> for Features {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// A single immutable example with its oracle label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    id: ExampleId,
    features: Features,
    label: Label,
}

impl Example {
    /// Create a new example
    #[must_use]
    pub const fn new(id: ExampleId, features: Features, label: Label) -> Self {
        Self {
            id,
            features,
            label,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ExampleId {
        self.id
    }

    #[must_use]
    pub const fn features(&self) -> &Features {
        &self.features
    }

    /// Ground-truth label (the oracle answer)
    #[must_use]
    pub const fn label(&self) -> Label {
        self.label
    }
}

/// A validated collection of examples sharing one feature dimension
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    examples: Vec<Example>,
    dim: usize,
}

impl Dataset {
    /// Build a dataset, rejecting duplicate ids and inconsistent dimensions
    ///
    /// # Errors
    ///
    /// Returns an error if ids repeat or feature dimensions differ.
    pub fn from_examples(examples: Vec<Example>) -> Result<Self, DataError> {
        let dim = examples.first().map_or(0, |e| e.features().dim());
        let mut seen = HashSet::with_capacity(examples.len());

        for example in &examples {
            if !seen.insert(example.id()) {
                return Err(DataError::DuplicateId(example.id()));
            }
            if example.features().dim() != dim {
                return Err(DataError::InconsistentDimension {
                    id: example.id(),
                    expected: dim,
                    found: example.features().dim(),
                });
            }
        }

        Ok(Self { examples, dim })
    }

    /// Load a dataset from a JSONL file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, a line is malformed, or the
    /// dataset fails validation.
    pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::NotFound(path.display().to_string()));
        }

        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut examples = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let example: Example = serde_json::from_str(&line).map_err(|source| {
                DataError::Malformed {
                    line: idx + 1,
                    source,
                }
            })?;
            examples.push(example);
        }

        if examples.is_empty() {
            return Err(DataError::Empty);
        }

        Self::from_examples(examples)
    }

    /// Write the dataset as JSONL
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_jsonl<P: AsRef<Path>>(&self, path: P) -> Result<(), DataError> {
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        for example in &self.examples {
            serde_json::to_writer(&mut writer, example)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Feature dimension shared by all examples (0 when empty)
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    /// Number of examples per class, indexed by [`Label::index`]
    #[must_use]
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for example in &self.examples {
            counts[example.label().index()] += 1;
        }
        counts
    }

    /// Split into a balanced seed set (`per_class` random examples of each
    /// class) and the remainder. Both halves keep dataset order.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if a class has fewer than `per_class` examples.
    pub fn split_balanced<R: Rng + ?Sized>(
        &self,
        per_class: usize,
        rng: &mut R,
    ) -> Result<(Vec<Example>, Vec<Example>)> {
        let mut chosen = vec![false; self.examples.len()];

        for label in Label::ALL {
            let mut indices: Vec<usize> = self
                .examples
                .iter()
                .enumerate()
                .filter(|(_, e)| e.label() == label)
                .map(|(i, _)| i)
                .collect();

            if indices.len() < per_class {
                return Err(ExperimentError::InsufficientData(format!(
                    "class {label} has {} examples, {per_class} required for the seed set",
                    indices.len()
                )));
            }

            indices.shuffle(rng);
            for &i in indices.iter().take(per_class) {
                chosen[i] = true;
            }
        }

        let (seed, rest): (Vec<_>, Vec<_>) = self
            .examples
            .iter()
            .zip(chosen)
            .partition(|(_, is_seed)| *is_seed);

        Ok((
            seed.into_iter().map(|(e, _)| e.clone()).collect(),
            rest.into_iter().map(|(e, _)| e.clone()).collect(),
        ))
    }
}
