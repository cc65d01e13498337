use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

const SCHEMA_BASE: &str = "https://schemas.3leaps.dev/hashxdm/cli/v1";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn schema_id(name: &str) -> String {
    format!("{SCHEMA_BASE}/{name}.schema.json")
}

/// One command result, renderable in every output format.
pub struct Record<'a, T: Serialize> {
    /// Full document for `json`.
    pub value: &'a T,
    /// Key/value view for `table` and `pretty`.
    pub fields: Vec<(&'static str, String)>,
    /// Bare payload for `raw`.
    pub raw: String,
}

pub fn print_record<T: Serialize>(record: &Record<'_, T>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(record.value),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in &record.fields {
                table.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = record
                .fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
        OutputFormat::Raw => {
            print_raw(record.raw.as_bytes());
            print_raw(b"\n");
        }
    }
}

/// Print rows under `header`. `json` prints one document per row.
pub fn print_rows<T: Serialize>(
    header: &[&str],
    rows: &[(T, Vec<String>)],
    raw: &[String],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            for (value, _) in rows {
                print_json(value);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header.to_vec());
            for (_, cells) in rows {
                table.add_row(cells.clone());
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (_, cells) in rows {
                let line = header
                    .iter()
                    .zip(cells)
                    .map(|(name, cell)| format!("{}={cell}", name.to_lowercase()))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{line}");
            }
        }
        OutputFormat::Raw => {
            for line in raw {
                print_raw(line.as_bytes());
                print_raw(b"\n");
            }
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
