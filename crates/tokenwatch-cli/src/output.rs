use anyhow::Result;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum Format {
    Table,
    Json,
}

/// Render rows as a table. Only used for `Format::Table`; JSON output goes
/// through [`print_json`] with the typed values instead.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("(no data)");
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(headers);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON of `value`, or a table built from it.
pub fn emit<T, F>(format: Format, value: &T, headers: &[&str], to_rows: F) -> Result<()>
where
    T: serde::Serialize + ?Sized,
    F: FnOnce(&T) -> Vec<Vec<String>>,
{
    match format {
        Format::Json => print_json(value),
        Format::Table => {
            print_table(headers, to_rows(value));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_accepts_only_known_names() {
        assert_eq!(Format::from_str("json", false), Ok(Format::Json));
        assert_eq!(Format::from_str("table", false), Ok(Format::Table));
        assert!(Format::from_str("yaml", false).is_err());
    }
}
