//! Manufacturing tables.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::errors::LineSetError;
use crate::line::LineRef;
use crate::lineset::{LineSet, LineTree, X_FACTOR};

/// Sparse grid of text cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    /// Sheet name.
    pub name: String,
    cells: BTreeMap<(usize, usize), String>,
}

impl Table {
    /// Create an empty table called `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: BTreeMap::new(),
        }
    }

    /// Write a cell.
    pub fn set(&mut self, row: usize, column: usize, value: impl ToString) {
        self.cells.insert((row, column), value.to_string());
    }

    /// Read a cell.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.cells.get(&(row, column)).map(String::as_str)
    }

    /// Number of rows up to the last filled one.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.cells.keys().map(|&(row, _)| row + 1).max().unwrap_or(0)
    }

    /// Number of columns up to the last filled one.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.cells
            .keys()
            .map(|&(_, column)| column + 1)
            .max()
            .unwrap_or(0)
    }

    /// Place `other` to the right of the last filled column.
    pub fn append_right(&mut self, other: &Table) {
        let offset = self.num_columns();
        for (&(row, column), value) in &other.cells {
            self.cells.insert((row, column + offset), value.clone());
        }
    }

    /// Render as comma separated values, quoting cells where needed.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let columns = self.num_columns();
        let mut output = String::new();
        for row in 0..self.num_rows() {
            let cells: Vec<String> = (0..columns)
                .map(|column| csv_cell(self.get(row, column).unwrap_or("")))
                .collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self.num_columns();
        let widths: Vec<usize> = (0..columns)
            .map(|column| {
                (0..self.num_rows())
                    .filter_map(|row| self.get(row, column))
                    .map(str::len)
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        for row in 0..self.num_rows() {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(column, &width)| format!("{:<width$}", self.get(row, column).unwrap_or("")))
                .collect();
            writeln!(f, "{}", cells.join(" | ").trim_end())?;
        }
        Ok(())
    }
}

fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// Chunk of a name compared numerically when it is a number.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk {
    Number(u64),
    Text(String),
}

/// Key ordering `A2` before `A10`.
fn natural_key(name: &str) -> Vec<NameChunk> {
    let mut chunks = Vec::new();
    let mut rest = name;
    while let Some(first) = rest.chars().next() {
        let numeric = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != numeric)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        chunks.push(match chunk.parse() {
            Ok(number) if numeric => NameChunk::Number(number),
            _ => NameChunk::Text(chunk.to_lowercase()),
        });
        rest = tail;
    }
    chunks
}

fn millimetres(length: f64) -> String {
    format!("{:.0}", length * 1000.0)
}

impl LineSet {
    /// Lay out one block of cells per line in tree shape: the lowest lines in
    /// the rightmost block, the attachment point names left of the uppermost lines.
    fn lines_table<F>(&self, callback: F, insert_node_names: bool) -> Result<Table, LineSetError>
    where
        F: Fn(LineRef<'_>) -> Result<Vec<String>, LineSetError>,
    {
        let tree = self.create_tree(None);
        let mut table = Table::default();
        let Some(first) = tree.first() else {
            return Ok(table);
        };
        let floors = self.floors().values().copied().max().unwrap_or(0);
        let columns_per_line = callback(self.line(first.line)?)?.len();

        let mut row = 1;
        for line in &tree {
            row = self.insert_block(
                &mut table,
                &callback,
                line,
                row,
                floors * columns_per_line + 2,
                columns_per_line,
                insert_node_names,
            )?;
        }
        Ok(table)
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_block<F>(
        &self,
        table: &mut Table,
        callback: &F,
        tree: &LineTree,
        mut row: usize,
        column: usize,
        columns_per_line: usize,
        insert_node_names: bool,
    ) -> Result<usize, LineSetError>
    where
        F: Fn(LineRef<'_>) -> Result<Vec<String>, LineSetError>,
    {
        let line = self.line(tree.line)?;
        let column_0 = column.saturating_sub(columns_per_line);
        for (index, value) in callback(line)?.into_iter().enumerate() {
            table.set(row, column_0 + index, value);
        }

        if tree.upper.is_empty() {
            if insert_node_names {
                let name = &line.upper_node().name;
                let name = if name.is_empty() { "XXX" } else { name.as_str() };
                table.set(row, column_0.saturating_sub(1), name);
            }
            return Ok(row + 1);
        }
        for upper in &tree.upper {
            row = self.insert_block(
                table,
                callback,
                upper,
                row,
                column_0,
                columns_per_line,
                insert_node_names,
            )?;
        }
        Ok(row)
    }

    /// Tree-shaped table of production lengths in millimetres followed by the
    /// check lengths, names, types and colours.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_line_length`](Self::get_line_length).
    pub fn get_table(&self) -> Result<Table, LineSetError> {
        let mut length_table = self.lines_table(
            |line| {
                let length = self.configured_line_length(line.index())?;
                Ok(vec![millimetres(length.get_length())])
            },
            true,
        )?;
        length_table.name = "lines".to_owned();

        let name_table = self.lines_table(|line| Ok(vec![line.name().to_owned()]), false)?;
        let type_table = self.lines_table(
            |line| {
                Ok(vec![format!(
                    "{} ({})",
                    line.line().line_type(),
                    line.line().color
                )])
            },
            false,
        )?;
        let color_table = self.lines_table(|line| Ok(vec![line.line().color.clone()]), false)?;

        let mut checklength_table = Table::default();
        for (index, (_, length)) in self.get_checklengths()?.into_iter().enumerate() {
            checklength_table.set(index + 1, 0, millimetres(length));
        }

        length_table.append_right(&checklength_table);
        length_table.append_right(&name_table);
        length_table.append_right(&type_table);
        length_table.append_right(&color_table);
        Ok(length_table)
    }

    /// Check lengths of all attachment points in natural name order.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_checklengths`](Self::get_checklengths).
    pub fn get_checksheet(&self) -> Result<Table, LineSetError> {
        let mut lengths = self.get_checklengths()?;
        lengths.sort_by_key(|(name, _)| natural_key(name));

        let mut table = Table::new("checksheet");
        table.set(0, 0, "Name");
        table.set(0, 1, "Length [mm]");
        for (i, (name, length)) in lengths.into_iter().enumerate() {
            table.set(i + 1, 0, name);
            table.set(i + 1, 1, millimetres(length));
        }
        Ok(table)
    }

    /// Tree-shaped table of line types, forces and utilisation of the break load.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::UnknownLine`] only for an inconsistent tree.
    pub fn get_force_table(&self) -> Result<Table, LineSetError> {
        self.lines_table(
            |line| {
                let line_type = line.line().line_type();
                let force = line.line().force();
                let percentage = match (force, line_type.min_break_load) {
                    (Some(force), Some(load)) if force != 0.0 && load != 0.0 => {
                        format!("{:.1}", 100.0 * force / load)
                    }
                    _ => String::new(),
                };
                Ok(vec![
                    line_type.name.clone(),
                    force.map(|force| format!("{force:.1}")).unwrap_or_default(),
                    percentage,
                ])
            },
            true,
        )
    }

    /// Flat table with every length correction per line, sorted by name.
    /// With `line_load`, forces and break loads are appended.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`get_line_length`](Self::get_line_length).
    pub fn get_table_2(&self, line_load: bool) -> Result<Table, LineSetError> {
        let mut table = Table::new("lines_table");
        let mut headers = vec![
            "Name",
            "Linetype",
            "Color",
            "Raw length",
            "Local Checking Length",
            "Seam Correction",
            "Loop Correction",
            "Knot Correction",
            "Manual Correction",
            "Cutting Length",
        ];
        if line_load {
            headers.extend(["Force", "Min Break Load", "Percentage"]);
        }
        for (column, header) in headers.into_iter().enumerate() {
            table.set(0, column, header);
        }

        for (i, edge) in self.sort_lines(None, X_FACTOR, true).into_iter().enumerate() {
            let line = self.line(edge)?;
            let length = self.configured_line_length(edge)?;
            let row = i + 2;
            table.set(row, 0, line.name());
            table.set(row, 1, line.line().line_type());
            table.set(row, 2, &line.line().color);
            table.set(row, 3, millimetres(length.get_checklength()));
            table.set(row, 4, millimetres(length.get_length()));
            table.set(row, 5, millimetres(length.seam_correction));
            table.set(row, 6, millimetres(length.loop_correction));
            table.set(row, 7, millimetres(length.knot_correction));
            table.set(row, 8, millimetres(length.manual_correction));
            table.set(row, 9, millimetres(length.get_cutting_length()));

            if line_load {
                let force = line.line().force().unwrap_or(0.0);
                table.set(row, 10, format!("{force:.0}"));
                match line.line().line_type().min_break_load {
                    Some(load) => {
                        table.set(row, 11, format!("{load:.0}"));
                        table.set(row, 12, format!("{:.1}%", 100.0 * force / load));
                    }
                    None => warn!(line = %line.name(), "no min_break_load set"),
                }
            }
        }
        Ok(table)
    }

    /// Stretched length of every line, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`LineSetError::Line`] when sag is enabled but not solved.
    pub fn get_table_sorted_lengths(&self) -> Result<Table, LineSetError> {
        let mut lines: Vec<LineRef<'_>> = self.lines().collect();
        lines.sort_by(|a, b| a.name().cmp(b.name()));

        let mut table = Table::new("lengths");
        table.set(0, 0, "Name");
        table.set(0, 1, "Linetype");
        table.set(0, 2, "Length [mm]");
        for (i, line) in lines.into_iter().enumerate() {
            let length =
                line.get_stretched_length(self.config().pre_load, self.config().calculate_sag)?;
            table.set(i + 1, 0, line.name());
            table.set(i + 1, 1, &line.line().line_type().name);
            table.set(i + 1, 2, millimetres(length));
        }
        Ok(table)
    }
}
