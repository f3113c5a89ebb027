//! Terminal tables for `inox libs`.
//!
//! Columns are sized to their widest cell and shrunk, widest first, until
//! the table fits the terminal. Cells may carry ANSI colors; widths are
//! measured on the visible text only.

use colored::*;

const INDENT: &str = "  ";
/// Columns are never shrunk below this many characters.
const MIN_COLUMN: usize = 8;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row.iter().map(|c| single_line(c)).collect());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) {
        let (_, width) = console::Term::stdout().size();
        print!("{}", self.render(width as usize));
    }

    /// The table laid out for a terminal `max_width` columns wide.
    pub fn render(&self, max_width: usize) -> String {
        if self.headers.is_empty() {
            return String::new();
        }
        let widths = self.column_widths(max_width);

        let border = |left: &str, mid: &str, right: &str| {
            let parts: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("{}{}{}{}\n", INDENT, left, parts.join(mid), right)
        };
        let line = |cells: Vec<String>| {
            let mut out = format!("{}│", INDENT);
            for (cell, width) in cells.iter().zip(&widths) {
                let shown = console::truncate_str(cell, *width, "...");
                let pad = width.saturating_sub(console::measure_text_width(&shown));
                out.push_str(&format!(" {}{} │", shown, " ".repeat(pad)));
            }
            out.push('\n');
            out
        };

        let mut out = border("┌", "┬", "┐");
        out.push_str(&line(self.headers.iter().map(|h| h.bold().to_string()).collect()));
        out.push_str(&border("├", "┼", "┤"));
        for row in &self.rows {
            out.push_str(&line(row.clone()));
        }
        out.push_str(&border("└", "┴", "┘"));
        out
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(console::measure_text_width(cell));
            }
        }

        let overhead = INDENT.len() + 1 + 3 * widths.len();
        let available = max_width.saturating_sub(overhead);
        while widths.iter().sum::<usize>() > available {
            let Some(widest) = widths
                .iter_mut()
                .filter(|w| **w > MIN_COLUMN)
                .max_by_key(|w| **w)
            else {
                break;
            };
            *widest -= 1;
        }
        widths
    }
}

fn single_line(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect()
}
