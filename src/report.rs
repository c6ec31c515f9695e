//! Result rows: one line per strategy with raw counts and sums.
//!
//! Column order is fixed: `strategy, games, reached_16 .. reached_131072,
//! total_score, total_moves`. Downstream tools turn counts into percentages
//! (`count * 100 / games`) and sums into per-game averages.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::harness::AggregateStats;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output format of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    #[default]
    Csv,
    Json,
}

pub fn write_report<W: Write>(out: W, rows: &[AggregateStats], format: Format) -> Result<(), ReportError> {
    match format {
        Format::Csv => write_csv(out, rows),
        Format::Json => write_json(out, rows),
    }
}

pub fn csv_header() -> String {
    let mut cols = vec!["strategy".to_string(), "games".to_string()];
    cols.extend(AggregateStats::default().thresholds().map(|(face, _)| format!("reached_{face}")));
    cols.push("total_score".into());
    cols.push("total_moves".into());
    cols.join(",")
}

pub fn write_csv<W: Write>(mut out: W, rows: &[AggregateStats]) -> Result<(), ReportError> {
    writeln!(out, "{}", csv_header())?;
    for row in rows {
        write!(out, "{},{}", csv_field(&row.strategy), row.games_played)?;
        for (_, count) in row.thresholds() {
            write!(out, ",{count}")?;
        }
        writeln!(out, ",{},{}", row.total_score, row.total_moves)?;
    }
    out.flush()?;
    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[derive(Serialize)]
struct JsonRow<'a> {
    strategy: &'a str,
    games: u64,
    /// Keyed by face value.
    reached: BTreeMap<u64, u64>,
    total_score: u64,
    total_moves: u64,
    discarded: u64,
}

impl<'a> From<&'a AggregateStats> for JsonRow<'a> {
    fn from(s: &'a AggregateStats) -> Self {
        JsonRow {
            strategy: &s.strategy,
            games: s.games_played,
            reached: s.thresholds().collect(),
            total_score: s.total_score,
            total_moves: s.total_moves,
            discarded: s.discarded,
        }
    }
}

pub fn write_json<W: Write>(mut out: W, rows: &[AggregateStats]) -> Result<(), ReportError> {
    let rows: Vec<JsonRow<'_>> = rows.iter().map(JsonRow::from).collect();
    serde_json::to_writer_pretty(&mut out, &rows)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Board;
    use crate::harness::GameResult;

    fn sample(name: &str) -> AggregateStats {
        let mut stats = AggregateStats::new(name);
        stats.record(&GameResult { max_tile_log: 7, total_score: 1200, total_moves: 150, final_board: Board::EMPTY });
        stats
    }

    #[test]
    fn header_lists_every_threshold() {
        let header = csv_header();
        assert!(header.starts_with("strategy,games,reached_16,reached_32,"));
        assert!(header.ends_with("reached_65536,reached_131072,total_score,total_moves"));
        assert_eq!(header.split(',').count(), 2 + 14 + 2);
    }

    #[test]
    fn csv_rows_hold_raw_counts() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[sample("merge")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row, "merge,1,1,1,1,1,0,0,0,0,0,0,0,0,0,0,1200,150");
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[sample("monte-carlo(n=100,cap=none)")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("\"monte-carlo(n=100,cap=none)\",1,"));
    }

    #[test]
    fn json_keys_thresholds_by_face_value() {
        let mut buf = Vec::new();
        write_json(&mut buf, &[sample("merge")]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["strategy"], "merge");
        assert_eq!(value[0]["reached"]["128"], 1);
        assert_eq!(value[0]["reached"]["256"], 0);
        assert_eq!(value[0]["total_moves"], 150);
    }
}
