/// Fixed two-space margin between columns.
pub const COLUMN_SEPARATOR: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Right,
}

enum Row {
    Cells(Vec<String>),
    Divider,
}

/// Shared fixed-width table primitive. Every cell is padded to its column
/// width (the maximum rendered length in the column, header included),
/// columns are joined with a fixed separator and the block is fenced with
/// the chat surface's monospace marker. Callers that need several tables to
/// align uniformly merge the per-table widths and render with the result.
pub struct TextTable {
    header: Vec<String>,
    justify: Vec<Justify>,
    rows: Vec<Row>,
}

impl TextTable {
    pub fn new(header: Vec<String>, justify: Vec<Justify>) -> TextTable {
        assert_eq!(header.len(), justify.len());
        TextTable {
            header,
            justify,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<String>) {
        assert_eq!(cells.len(), self.header.len());
        self.rows.push(Row::Cells(cells));
    }

    pub fn push_divider(&mut self) {
        self.rows.push(Row::Divider);
    }

    pub fn row_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row, Row::Cells(_)))
            .count()
    }

    pub fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.header.iter().map(|cell| cell.chars().count()).collect();
        for row in &self.rows {
            if let Row::Cells(cells) = row {
                for (column, cell) in cells.iter().enumerate() {
                    widths[column] = widths[column].max(cell.chars().count());
                }
            }
        }
        widths
    }

    pub fn render(&self) -> String {
        self.render_with(&self.widths())
    }

    /// Renders with externally supplied column widths; a width smaller than
    /// a cell does not truncate, the cell just overflows its column.
    pub fn render_with(&self, widths: &[usize]) -> String {
        let line_width = widths.iter().sum::<usize>()
            + COLUMN_SEPARATOR.len() * widths.len().saturating_sub(1);
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(format_cells(&self.header, widths, &self.justify));
        for row in &self.rows {
            match row {
                Row::Cells(cells) => lines.push(format_cells(cells, widths, &self.justify)),
                Row::Divider => lines.push("-".repeat(line_width)),
            }
        }
        format!("```\n{}\n```", lines.join("\n"))
    }
}

/// Column-wise maximum, used to align separate table blocks of one report.
pub fn merge_widths(into: &mut [usize], other: &[usize]) {
    for (current, candidate) in into.iter_mut().zip(other) {
        *current = (*current).max(*candidate);
    }
}

fn format_cells(cells: &[String], widths: &[usize], justify: &[Justify]) -> String {
    let mut line = String::new();
    for (column, cell) in cells.iter().enumerate() {
        if column > 0 {
            line.push_str(COLUMN_SEPARATOR);
        }
        let width = widths.get(column).copied().unwrap_or(0);
        let padding = width.saturating_sub(cell.chars().count());
        match justify[column] {
            Justify::Right => {
                line.extend(std::iter::repeat_n(' ', padding));
                line.push_str(cell);
            }
            Justify::Left => {
                line.push_str(cell);
                line.extend(std::iter::repeat_n(' ', padding));
            }
        }
    }
    line.trim_end().to_string()
}
