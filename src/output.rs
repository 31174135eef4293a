use std::io::Write;

use holdbook::{AlignedRow, LedgerDiffRow, PrefetchSummary, PriceLevelRow};
use serde::Serialize;

use crate::error::CliError;

/// A row printable as one TSV line.
pub trait TsvRow {
    fn write_tsv(&self, buf: &mut String);
}

impl TsvRow for PriceLevelRow {
    // price \t to_back \t to_lay \t traded \t highlight
    fn write_tsv(&self, buf: &mut String) {
        format_f64(buf, self.price);
        buf.push('\t');
        format_f64(buf, self.to_back);
        buf.push('\t');
        format_f64(buf, self.to_lay);
        buf.push('\t');
        format_f64(buf, self.traded);
        buf.push('\t');
        buf.push(char::from(b'0' + u8::from(self.highlight)));
    }
}

impl TsvRow for LedgerDiffRow {
    // price \t traded
    fn write_tsv(&self, buf: &mut String) {
        format_f64(buf, self.price);
        buf.push('\t');
        format_f64(buf, self.traded);
    }
}

impl TsvRow for AlignedRow {
    // price \t current traded \t previous traded \t delta
    fn write_tsv(&self, buf: &mut String) {
        format_f64(buf, self.price);
        buf.push('\t');
        format_opt(buf, self.current.map(|r| r.traded));
        buf.push('\t');
        format_opt(buf, self.previous.map(|r| r.traded));
        buf.push('\t');
        format_f64(buf, self.delta);
    }
}

/// Per-record block printed by `prefetch`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReport<'a> {
    pub record_id: u64,
    pub selection: &'a str,
    pub failed: bool,
    pub heavy: bool,
    pub diff: &'a [LedgerDiffRow],
}

/// Write rows, one per line, as TSV or JSON.
pub fn write_rows<T, W>(
    rows: &[T],
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<(), CliError>
where
    T: TsvRow + Serialize,
    W: Write,
{
    for row in rows {
        buf.clear();
        if json_mode {
            buf.push_str(&serde_json::to_string(row)?);
        } else {
            row.write_tsv(buf);
        }
        buf.push('\n');
        writer.write_all(buf.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Write one record's diff block. In TSV mode a `#` header line precedes the
/// rows; in JSON mode the whole block is a single line.
pub fn write_report<W: Write>(
    report: &RecordReport<'_>,
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<(), CliError> {
    if json_mode {
        buf.clear();
        buf.push_str(&serde_json::to_string(report)?);
        buf.push('\n');
        writer.write_all(buf.as_bytes())?;
        writer.flush()?;
        return Ok(());
    }

    buf.clear();
    buf.push_str("# ");
    buf.push_str(&report.record_id.to_string());
    buf.push('\t');
    buf.push_str(report.selection);
    if report.failed {
        buf.push_str("\tfailed");
    }
    if report.heavy {
        buf.push_str("\theavy");
    }
    buf.push('\n');
    writer.write_all(buf.as_bytes())?;
    write_rows(report.diff, false, buf, writer)
}

pub fn write_summary<W: Write>(
    summary: &PrefetchSummary,
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<(), CliError> {
    buf.clear();
    if json_mode {
        buf.push_str("{\"requested\":");
        buf.push_str(&summary.requested.to_string());
        buf.push_str(",\"succeeded\":");
        buf.push_str(&summary.succeeded.to_string());
        buf.push_str(",\"failed\":");
        buf.push_str(&summary.failed.to_string());
        buf.push('}');
    } else {
        buf.push_str("requested\t");
        buf.push_str(&summary.requested.to_string());
        buf.push_str("\tsucceeded\t");
        buf.push_str(&summary.succeeded.to_string());
        buf.push_str("\tfailed\t");
        buf.push_str(&summary.failed.to_string());
    }
    buf.push('\n');
    writer.write_all(buf.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Fast f64 formatting via `ryu`.
fn format_f64(buf: &mut String, val: f64) {
    let mut b = ryu::Buffer::new();
    buf.push_str(b.format(val));
}

fn format_opt(buf: &mut String, val: Option<f64>) {
    match val {
        Some(v) => format_f64(buf, v),
        None => buf.push('-'),
    }
}
