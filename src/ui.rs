//! Terminal UI utilities.
//!
//! This module provides UI components for CLI output, including a responsive
//! table with Unicode box-drawing characters.
//!
//! ## Components
//!
//! - `Table` - Auto-sizing table with headers and rows
//! - `unit_table` - The `mb list` view of a build plan
//!
//! ## Example
//!
//! ```rust
//! use modbuild::ui::Table;
//!
//! let mut table = Table::new(&["Name", "Value"]);
//! table.add_row(vec!["key".to_string(), "value".to_string()]);
//! table.print();
//! ```

use colored::*;
use std::cmp;
use std::fmt::Write;

use crate::scan::TranslationUnit;

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

    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) {
        let term = console::Term::stdout();
        let (_term_height, term_width) = term.size();
        print!("{}", self.render(term_width as usize));
    }

    /// Renders the table to fit in `max_width` columns where possible.
    pub fn render(&self, max_width: usize) -> String {
        let mut out = String::new();
        if self.headers.is_empty() {
            return out;
        }

        // Calculate initial max content widths per column
        let mut col_widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let clean_len = strip_ansi(&sanitize_content(cell)).chars().count();
                col_widths[i] = cmp::max(col_widths[i], clean_len);
            }
        }

        let overhead = 3 + 3 * self.headers.len();
        let total_content_width: usize = col_widths.iter().sum();
        if overhead + total_content_width > max_width {
            let available_content_width = max_width.saturating_sub(overhead);
            let mut current_width = total_content_width;

            // Shrink the widest column until it fits or nothing is wider than 8
            while current_width > available_content_width {
                let Some((max_idx, &max_val)) =
                    col_widths.iter().enumerate().max_by_key(|&(_, w)| *w)
                else {
                    break;
                };
                if max_val <= 8 {
                    break;
                }
                col_widths[max_idx] -= 1;
                current_width -= 1;
            }
        }

        let make_sep = |left: &str, mid: &str, right: &str| -> String {
            let segments: Vec<String> = col_widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}\n", left, segments.join(mid), right)
        };

        out.push_str(&make_sep("┌", "┬", "┐"));

        out.push_str("  │");
        for (header, &width) in self.headers.iter().zip(&col_widths) {
            let truncated = truncate(header, width);
            let padding = width.saturating_sub(truncated.chars().count());
            let _ = write!(out, " {} {}│", truncated.bold(), " ".repeat(padding));
        }
        out.push('\n');

        out.push_str(&make_sep("├", "┼", "┤"));

        for row in &self.rows {
            out.push_str("  │");
            for (cell, &width) in row.iter().zip(&col_widths) {
                let clean_raw = sanitize_content(cell);
                let truncated = console::truncate_str(&clean_raw, width, "...").to_string();
                let visible_len = strip_ansi(&truncated).chars().count();
                let padding = width.saturating_sub(visible_len);
                let _ = write!(out, " {} {}│", truncated, " ".repeat(padding));
            }
            out.push('\n');
        }

        out.push_str(&make_sep("└", "┴", "┘"));
        out
    }
}

/// One row per unit: file, module, kind, level and markers.
pub fn unit_table(units: &[TranslationUnit]) -> Table {
    let mut table = Table::new(&["File", "Module", "Kind", "Level", "Markers"]);
    for unit in units {
        let mut markers = Vec::new();
        if unit.has_main {
            markers.push("main".green().to_string());
        }
        if unit.is_test {
            markers.push("test".magenta().to_string());
        }
        let level = unit
            .level()
            .map_or_else(|| "-".to_string(), |level| level.to_string());
        table.add_row(vec![
            unit.relative_path(),
            if unit.module.is_empty() {
                "-".to_string()
            } else {
                unit.module.cyan().to_string()
            },
            unit.kind.label().to_string(),
            level,
            markers.join(" "),
        ]);
    }
    table
}

fn truncate(s: &str, max_width: usize) -> String {
    if s.chars().count() > max_width {
        let mut result: String = s.chars().take(max_width.saturating_sub(3)).collect();
        result.push_str("...");
        result
    } else {
        s.to_string()
    }
}

fn sanitize_content(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect()
}

fn strip_ansi(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(&'[') = chars.peek() {
                chars.next();
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
