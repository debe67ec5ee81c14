//! Linear system for the parabolic sag of every line in a tree.
//!
//! Each line contributes two unknowns: `sag_par_1` (slope, row `2i`) and
//! `sag_par_2` (offset, row `2i + 1`). The lower end of a line fixes its offset,
//! the upper end fixes its slope.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use petgraph::graph::EdgeIndex;

use crate::errors::{LineError, LineSetError};
use crate::line::LineRef;

/// Sag equations of one recalculation pass.
#[derive(Clone, Debug)]
pub struct SagMatrix {
    matrix: DMatrix<f64>,
    rhs: DVector<f64>,
    solution: Option<DVector<f64>>,
    line_indices: HashMap<EdgeIndex, usize>,
}

impl SagMatrix {
    /// Allocate the system for `line_count` lines.
    #[must_use]
    pub fn new(line_count: usize) -> Self {
        let size = 2 * line_count;
        Self {
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
            solution: None,
            line_indices: HashMap::with_capacity(line_count),
        }
    }

    /// Number of lines the system has room for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rhs.len() / 2
    }

    /// The assembled coefficients.
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// The assembled right hand side.
    #[must_use]
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Row pair of `line`, assigned on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::UnknownLine`] when more lines are inserted than
    /// the system was allocated for.
    fn line_index(&mut self, line: &LineRef<'_>) -> Result<usize, LineSetError> {
        let next = self.line_indices.len();
        if let Some(&index) = self.line_indices.get(&line.index()) {
            return Ok(index);
        }
        if next >= self.capacity() {
            return Err(LineSetError::UnknownLine(line.index()));
        }
        self.line_indices.insert(line.index(), next);
        Ok(next)
    }

    /// Pin the offset of a line hanging from a fixed anchor.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::UnknownLine`] when the system is full.
    pub fn insert_type_0_lower(&mut self, line: &LineRef<'_>) -> Result<(), LineSetError> {
        let i = self.line_index(line)?;
        self.matrix[(2 * i + 1, 2 * i + 1)] = 1.0;
        Ok(())
    }

    /// Continue the sag curve of `lower_line` into `line` at a knot.
    ///
    /// # Errors
    ///
    /// Fails when `lower_line` has no force or projection yet.
    pub fn insert_type_1_lower(
        &mut self,
        line: &LineRef<'_>,
        lower_line: &LineRef<'_>,
    ) -> Result<(), LineSetError> {
        let i = self.line_index(line)?;
        let j = self.line_index(lower_line)?;
        let length = lower_line.length_projected()?;
        let force = lower_line.force_projected()?;

        self.matrix[(2 * i + 1, 2 * i + 1)] = 1.0;
        self.matrix[(2 * i + 1, 2 * j + 1)] = -1.0;
        self.matrix[(2 * i + 1, 2 * j)] = -length;
        self.rhs[2 * i + 1] = -lower_line.ortho_pressure() * length * length / force / 2.0;
        Ok(())
    }

    /// Match the end slope of `line` to the mean slope of the lines above its knot.
    ///
    /// # Errors
    ///
    /// Fails when `line` has no force or projection yet.
    pub fn insert_type_1_upper(
        &mut self,
        line: &LineRef<'_>,
        upper_lines: &[LineRef<'_>],
    ) -> Result<(), LineSetError> {
        let i = self.line_index(line)?;
        let infl = line.ortho_pressure() * line.length_projected()? / line.force_projected()?;
        let weight = 1.0 / upper_lines.len() as f64;

        self.matrix[(2 * i, 2 * i)] = 1.0;
        for upper_line in upper_lines {
            let j = self.line_index(upper_line)?;
            self.matrix[(2 * i, 2 * j)] = -weight;
        }
        self.rhs[2 * i] = infl;
        Ok(())
    }

    /// Pin the upper end of `line` to a fixed attachment point.
    ///
    /// # Errors
    ///
    /// Fails when `line` has no force or projection yet.
    pub fn insert_type_2_upper(&mut self, line: &LineRef<'_>) -> Result<(), LineSetError> {
        let i = self.line_index(line)?;
        let length = line.length_projected()?;
        let force = line.force_projected()?;

        self.matrix[(2 * i, 2 * i)] = length;
        self.matrix[(2 * i, 2 * i + 1)] = 1.0;
        self.rhs[2 * i] = line.ortho_pressure() * length * length / force / 2.0;
        Ok(())
    }

    /// Solve the assembled system.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::SingularSagMatrix`] when a line was never
    /// inserted or the topology leaves the system underdetermined.
    pub fn solve(&mut self) -> Result<&DVector<f64>, LineSetError> {
        let solution = self
            .matrix
            .clone()
            .lu()
            .solve(&self.rhs)
            .ok_or(LineSetError::SingularSagMatrix)?;
        if solution.iter().any(|value| !value.is_finite()) {
            return Err(LineSetError::SingularSagMatrix);
        }
        Ok(&*self.solution.insert(solution))
    }

    /// Solved `(sag_par_1, sag_par_2)` of `line`. No side effects.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingSag`] before [`solve`](Self::solve) or for a
    /// line that was never inserted.
    pub fn get_sag_parameters(&self, line: &LineRef<'_>) -> Result<(f64, f64), LineError> {
        let missing = || LineError::MissingSag {
            line: line.name().to_owned(),
        };
        let index = *self.line_indices.get(&line.index()).ok_or_else(missing)?;
        let solution = self.solution.as_ref().ok_or_else(missing)?;
        Ok((solution[2 * index], solution[2 * index + 1]))
    }
}

impl fmt::Display for SagMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sag matrix ({} lines)", self.line_indices.len())?;
        for row in 0..self.matrix.nrows() {
            for column in 0..self.matrix.ncols() {
                write!(f, "{:>10.4} ", self.matrix[(row, column)])?;
            }
            writeln!(f, "| {:>10.4}", self.rhs[row])?;
        }
        Ok(())
    }
}
