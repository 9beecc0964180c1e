//! Table and JSON output for CLI commands

use crate::error::Result;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Color, Modify, Padding, Style},
    Table, Tabled,
};

/// Output options shared by every command
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub no_color: bool,
}

/// Apply the standard table styling
pub fn format_table(mut table: Table, no_color: bool) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .with(Padding::new(1, 1, 0, 0));

    if !no_color {
        table.with(Modify::new(Rows::first()).with(Color::FG_BLUE));
    }

    table.to_string()
}

/// Render rows as a table or as pretty JSON
pub fn render_rows<T: Tabled + Serialize>(
    rows: &[T],
    output: OutputOptions,
    empty_message: &str,
) -> Result<String> {
    if output.json {
        return Ok(serde_json::to_string_pretty(rows)?);
    }

    if rows.is_empty() {
        return Ok(empty_message.to_string());
    }

    Ok(format_table(Table::new(rows), output.no_color))
}

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled, Serialize)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
    }

    #[test]
    fn test_render_table_without_color() {
        let rows = vec![Row {
            name: "uploads".to_string(),
        }];
        let output = render_rows(
            &rows,
            OutputOptions {
                json: false,
                no_color: true,
            },
            "No containers found",
        )
        .unwrap();

        assert!(output.contains("Name"));
        assert!(output.contains("uploads"));
        assert!(output.starts_with('╭'));
    }

    #[test]
    fn test_render_json_and_empty() {
        let rows: Vec<Row> = Vec::new();
        let output = OutputOptions {
            json: false,
            no_color: true,
        };
        assert_eq!(render_rows(&rows, output, "No blobs found").unwrap(), "No blobs found");

        let json = render_rows(
            &rows,
            OutputOptions {
                json: true,
                no_color: true,
            },
            "",
        )
        .unwrap();
        assert_eq!(json, "[]");
    }
}
