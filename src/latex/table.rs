use crate::error::Error;
use crate::model::{Block, ParagraphKind, Table, TableCell};

use super::{Emitter, Mode, bracket_guard};

/// Share of `\linewidth` a table may occupy.
const TABLE_WIDTH: f32 = 0.9;

/// Column widths as fractions of `\linewidth`, from the table grid when it
/// is usable, otherwise split evenly.
fn column_fractions(table: &Table, columns: usize) -> Vec<f32> {
    let total: f32 = table.col_widths.iter().sum();
    if table.col_widths.len() == columns && total > 0.0 {
        table
            .col_widths
            .iter()
            .map(|w| w / total * TABLE_WIDTH)
            .collect()
    } else {
        vec![TABLE_WIDTH / columns as f32; columns]
    }
}

fn p_column(fraction: f32) -> String {
    format!("p{{{fraction:.3}\\linewidth}}")
}

impl<'d> Emitter<'d> {
    pub(super) fn table(&mut self, table: &'d Table) -> Result<(), Error> {
        let columns = table.column_count();
        if columns == 0 || table.rows.is_empty() {
            self.warn("tbl", "empty table omitted");
            return Ok(());
        }
        let fractions = column_fractions(table, columns);
        let booktabs = self.options.preserve_styles;

        let layout = if booktabs {
            fractions.iter().map(|f| p_column(*f)).collect::<String>()
        } else {
            let cols: Vec<String> = fractions.iter().map(|f| p_column(*f)).collect();
            format!("|{}|", cols.join("|"))
        };

        if booktabs {
            self.push("\\begin{table}[H]\n\\centering\n");
        } else {
            self.push("\\noindent\n");
        }
        self.push(&format!("\\begin{{tabular}}{{{layout}}}\n"));
        self.push(if booktabs { "\\toprule\n" } else { "\\hline\n" });

        let last_header = table.rows.iter().rposition(|r| r.is_header);
        for (row_index, row) in table.rows.iter().enumerate() {
            let mut cells = Vec::with_capacity(columns);
            let mut col = 0usize;
            for cell in &row.cells {
                if col >= columns {
                    break;
                }
                let span = (cell.grid_span.max(1) as usize).min(columns - col);
                let content = self.cell(cell, fractions[col..col + span].iter().sum())?;
                if span > 1 {
                    let width: f32 = fractions[col..col + span].iter().sum();
                    let border_left = if !booktabs && col == 0 { "|" } else { "" };
                    let border_right = if booktabs { "" } else { "|" };
                    cells.push(format!(
                        "\\multicolumn{{{span}}}{{{border_left}{}{border_right}}}{{{content}}}",
                        p_column(width)
                    ));
                } else {
                    cells.push(content);
                }
                col += span;
            }
            while col < columns {
                cells.push(String::new());
                col += 1;
            }
            let line = cells.join(" & ");
            self.push(&format!("{}{line} \\\\\n", bracket_guard(&line)));

            if booktabs {
                if Some(row_index) == last_header {
                    self.push("\\midrule\n");
                }
            } else {
                self.push("\\hline\n");
            }
        }

        if booktabs {
            self.push("\\bottomrule\n\\end{tabular}\n\\end{table}\n\n");
        } else {
            self.push("\\end{tabular}\n\n");
        }
        Ok(())
    }

    /// Flatten a cell's blocks into one tabular cell. Paragraphs are joined
    /// with `\newline`; nested tables are reduced to their text.
    fn cell(&mut self, cell: &'d TableCell, width_fraction: f32) -> Result<String, Error> {
        if cell.merged_above {
            return Ok(String::new());
        }
        let mut parts = Vec::new();
        self.cell_blocks(&cell.blocks, width_fraction, &mut parts)?;
        Ok(parts.join(" \\newline "))
    }

    fn cell_blocks(
        &mut self,
        blocks: &'d [Block],
        width_fraction: f32,
        parts: &mut Vec<String>,
    ) -> Result<(), Error> {
        for block in blocks {
            match block {
                Block::Paragraph(p) => {
                    if p.is_empty() {
                        continue;
                    }
                    let text = self.inlines(&p.inlines, Mode::Cell(width_fraction))?;
                    let text = text.trim_start();
                    let text = match &p.kind {
                        ParagraphKind::Heading(_) => format!("\\textbf{{{text}}}"),
                        ParagraphKind::ListItem { .. } => format!("\\textbullet{{}} {text}"),
                        ParagraphKind::Body => text.to_string(),
                    };
                    parts.push(text);
                }
                Block::Table(nested) => {
                    self.warn("tbl", "nested table flattened into its parent cell");
                    for row in &nested.rows {
                        for cell in &row.cells {
                            self.cell_blocks(&cell.blocks, width_fraction, parts)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(widths: Vec<f32>) -> Table {
        Table {
            col_widths: widths,
            rows: Vec::new(),
        }
    }

    #[test]
    fn fractions_follow_grid() {
        let f = column_fractions(&table(vec![100.0, 300.0]), 2);
        assert!((f[0] - 0.225).abs() < 1e-4);
        assert!((f[1] - 0.675).abs() < 1e-4);
    }

    #[test]
    fn fractions_fall_back_to_even_split() {
        let f = column_fractions(&table(vec![100.0]), 3);
        assert_eq!(f.len(), 3);
        assert!((f[0] - 0.3).abs() < 1e-4);
    }

    #[test]
    fn column_spec_format() {
        assert_eq!(p_column(0.25), "p{0.250\\linewidth}");
    }
}
