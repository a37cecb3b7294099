//! Pure presentation: block data rendering and the sector/card tables.

use crate::card::{BlockData, SectorDump};
use crate::error::AccessError;
use std::fmt::Write as _;
use std::str::FromStr;

/// How block bytes are rendered for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Space-separated two-digit uppercase hex per byte
    Hex,
    /// Printable ASCII per byte, `.` for everything else
    Str,
    /// The raw byte sequence
    Raw,
}

impl FromStr for DataFormat {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" | "hexstring" => Ok(DataFormat::Hex),
            "string" | "str" => Ok(DataFormat::Str),
            "raw" | "bytestring" => Ok(DataFormat::Raw),
            other => Err(AccessError::InvalidFormat(format!(
                "unknown data format {other:?} (expected hex, string or raw)"
            ))),
        }
    }
}

/// Render bytes in the requested format. Deterministic and stateless.
pub fn format_bytes(bytes: &[u8], format: DataFormat) -> String {
    match format {
        DataFormat::Hex => bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" "),
        DataFormat::Str => bytes
            .iter()
            .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
            .collect(),
        DataFormat::Raw => format!("{bytes:?}"),
    }
}

fn render_block(data: &Option<BlockData>, format: DataFormat) -> String {
    match data {
        Some(bytes) => format_bytes(bytes, format),
        None => "<read failed>".to_string(),
    }
}

/// Draw an aligned text grid with a header row.
fn draw_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut rule = String::from("+");
    for width in &widths {
        rule.push_str(&"-".repeat(width + 2));
        rule.push('+');
    }

    let mut out = String::new();
    let write_row = |cells: &[String], out: &mut String| {
        out.push('|');
        for (cell, width) in cells.iter().zip(&widths) {
            let _ = write!(out, " {cell:<width$} |");
        }
        out.push('\n');
    };

    out.push_str(&rule);
    out.push('\n');
    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    write_row(&header_cells, &mut out);
    out.push_str(&rule);
    out.push('\n');
    for row in rows {
        write_row(row, &mut out);
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

/// Render one sector as a Block/Data table.
pub fn sector_table(dump: &SectorDump, format: DataFormat) -> String {
    let rows: Vec<Vec<String>> = dump
        .blocks
        .iter()
        .enumerate()
        .map(|(offset, data)| {
            vec![
                format!("Block {}", dump.block_address(offset)),
                render_block(data, format),
            ]
        })
        .collect();
    draw_table(&["Block", "Data"], &rows)
}

/// Render a full-card dump as a Sector/Block/Data table.
pub fn card_table(dumps: &[SectorDump], format: DataFormat) -> String {
    let mut rows = Vec::new();
    for dump in dumps {
        for (offset, data) in dump.blocks.iter().enumerate() {
            rows.push(vec![
                format!("Sector {}", dump.sector),
                format!("Block {}", dump.block_address(offset)),
                render_block(data, format),
            ]);
        }
    }
    draw_table(&["Sector", "Block", "Data"], &rows)
}
