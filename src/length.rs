//! Production length accounting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::LineSetError;

/// Length of a line under the reference load together with its corrections, in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineLength {
    /// Stretch-corrected geometric length.
    pub length: f64,
    /// Extra length for sewn terminations.
    pub seam_correction: f64,
    /// Canopy loop or brake offset of the upper node.
    pub loop_correction: f64,
    /// Length consumed by the knot at the lower node.
    pub knot_correction: f64,
    /// Manual trim.
    pub manual_correction: f64,
}

impl LineLength {
    /// Length measured on the finished glider.
    #[must_use]
    pub fn get_checklength(&self) -> f64 {
        self.length + self.loop_correction + self.manual_correction
    }

    /// Length between the marks of the finished line, including the knot.
    #[must_use]
    pub fn get_length(&self) -> f64 {
        self.get_checklength() + self.knot_correction
    }

    /// Length to cut from the spool.
    #[must_use]
    pub fn get_cutting_length(&self) -> f64 {
        self.get_length() + self.seam_correction
    }
}

/// Knot corrections of one combination of lower line type, upper line type and branch count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnotCorrection {
    /// Line type name of the line below the knot.
    pub lower_type: String,
    /// Line type name of the line above the knot.
    pub upper_type: String,
    /// Number of lines leaving the knot upwards.
    pub upper_count: usize,
    /// Correction per upper line, in name order.
    pub corrections: Vec<f64>,
}

/// Lookup table of knot corrections. Missing combinations correct by zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KnotCorrections {
    table: HashMap<(String, String, usize), Vec<f64>>,
}

impl KnotCorrections {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, entry: KnotCorrection) {
        self.table.insert(
            (entry.lower_type, entry.upper_type, entry.upper_count),
            entry.corrections,
        );
    }

    /// Correction for the `position`-th of `upper_count` lines of `upper_type`
    /// knotted onto a line of `lower_type`.
    #[must_use]
    pub fn get(&self, lower_type: &str, upper_type: &str, upper_count: usize, position: usize) -> f64 {
        self.table
            .get(&(lower_type.to_owned(), upper_type.to_owned(), upper_count))
            .and_then(|corrections| corrections.get(position))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Load a JSON list of [`KnotCorrection`] entries.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Serialization`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, LineSetError> {
        let entries: Vec<KnotCorrection> = serde_json::from_str(json)?;
        let mut corrections = Self::new();
        for entry in entries {
            corrections.insert(entry);
        }
        Ok(corrections)
    }
}
