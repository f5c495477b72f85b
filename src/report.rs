// 📄 Correspondence Reports - JSON (full provenance) + CSV + summary
//
// JSON record shape, one per correspondence:
//   {"bsdd": {uri, code, name, definition},
//    "oekobaudat": {id, name_de, path_de},
//    "match_type", "confidence", "reasoning", "method"}
//
// Reading a report back re-derives the band from the confidence, so an
// edited match_type in the file never survives a reload.

use crate::alignment::{
    AlignmentRun, CategoryRef, Correspondence, CorrespondenceSet, EntryRef, MatchFailure, MatchType, RunStats,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// JSON RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSide {
    pub uri: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomySide {
    pub id: String,
    pub name_de: String,
    pub path_de: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub bsdd: ExternalSide,
    pub oekobaudat: TaxonomySide,
    pub match_type: MatchType,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_match_type: Option<MatchType>,
}

impl From<&Correspondence> for ReportRecord {
    fn from(c: &Correspondence) -> Self {
        let entry = c.entry();
        let category = c.category();
        ReportRecord {
            bsdd: ExternalSide {
                uri: entry.uri.clone(),
                code: entry.code.clone(),
                name: entry.name.clone(),
                definition: entry.definition.clone(),
            },
            oekobaudat: TaxonomySide {
                id: category.id.clone(),
                name_de: category.native_label.clone(),
                path_de: category.native_path.clone(),
            },
            match_type: c.match_type(),
            confidence: c.confidence(),
            reasoning: c.rationale().to_string(),
            method: c.method().to_string(),
            proposed_match_type: c.proposed_band(),
        }
    }
}

impl ReportRecord {
    pub fn into_correspondence(self) -> Result<Correspondence> {
        let code = self.bsdd.code.clone();
        Correspondence::restore(
            EntryRef {
                code: self.bsdd.code,
                name: self.bsdd.name,
                definition: self.bsdd.definition,
                uri: self.bsdd.uri,
            },
            CategoryRef {
                id: self.oekobaudat.id,
                native_label: self.oekobaudat.name_de,
                native_path: self.oekobaudat.path_de,
            },
            self.confidence,
            self.reasoning,
            self.method,
            self.proposed_match_type,
        )
        .with_context(|| format!("Invalid report record for {}", code))
    }
}

// ============================================================================
// JSON
// ============================================================================

pub fn to_records(set: &CorrespondenceSet) -> Vec<ReportRecord> {
    set.iter().map(ReportRecord::from).collect()
}

pub fn write_json<P: AsRef<Path>>(set: &CorrespondenceSet, path: P) -> Result<usize> {
    let records = to_records(set);
    let json = serde_json::to_string_pretty(&records).context("Failed to serialize report")?;
    fs::write(path.as_ref(), json).with_context(|| format!("Failed to write report: {:?}", path.as_ref()))?;
    Ok(records.len())
}

pub fn read_json<P: AsRef<Path>>(path: P) -> Result<CorrespondenceSet> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read report: {:?}", path.as_ref()))?;
    parse_json(&content)
}

pub fn parse_json(content: &str) -> Result<CorrespondenceSet> {
    let records: Vec<ReportRecord> = serde_json::from_str(content).context("Failed to parse report JSON")?;
    records.into_iter().map(ReportRecord::into_correspondence).collect()
}

// ============================================================================
// CSV
// ============================================================================

/// Flat row for spreadsheet review
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    code: &'a str,
    name: &'a str,
    uri: &'a str,
    category_id: &'a str,
    category_name_de: &'a str,
    category_path_de: &'a str,
    match_type: &'static str,
    confidence: f64,
    method: &'a str,
    reasoning: &'a str,
}

pub fn write_csv<P: AsRef<Path>>(set: &CorrespondenceSet, path: P) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create CSV file: {:?}", path.as_ref()))?;

    for c in set.iter() {
        writer
            .serialize(CsvRow {
                code: &c.entry().code,
                name: &c.entry().name,
                uri: &c.entry().uri,
                category_id: &c.category().id,
                category_name_de: &c.category().native_label,
                category_path_de: &c.category().native_path,
                match_type: c.match_type().as_str(),
                confidence: c.confidence(),
                method: c.method(),
                reasoning: c.rationale(),
            })
            .context("Failed to write CSV row")?;
    }

    writer.flush().context("Failed to flush CSV file")?;
    Ok(set.len())
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// Run-level summary written next to the report
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub method: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub fingerprint: String,
    pub stats: RunStats,
    pub failures: Vec<MatchFailure>,
}

impl RunSummary {
    pub fn from_run(run: &AlignmentRun) -> Self {
        RunSummary {
            run_id: run.run_id.clone(),
            method: run.method.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            fingerprint: run.correspondences.fingerprint(),
            stats: run.stats.clone(),
            failures: run.failures.clone(),
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json).with_context(|| format!("Failed to write summary: {:?}", path.as_ref()))
    }

    /// Human-readable lines for the CLI
    pub fn lines(&self) -> Vec<String> {
        let stats = &self.stats;
        let share = |band: MatchType| {
            let n = stats.count(band);
            let pct = if stats.matched == 0 {
                0.0
            } else {
                100.0 * n as f64 / stats.matched as f64
            };
            format!("  {:<13} {:>5} ({:.1}%)", band.as_str(), n, pct)
        };

        let mut lines = vec![
            format!("Run {} ({})", self.run_id, self.method),
            format!("  Processed:  {}", stats.processed),
            format!("  Matched:    {}", stats.matched),
            format!("  Failed:     {}", stats.failed),
        ];
        lines.extend(MatchType::all().into_iter().map(share));
        lines.push(format!("  Average confidence: {:.3}", stats.mean_confidence));
        lines
    }
}

/// Highest-confidence correspondences first (ties by code)
pub fn top_examples(set: &CorrespondenceSet, n: usize) -> Vec<&Correspondence> {
    let mut sorted: Vec<&Correspondence> = set.iter().collect();
    sorted.sort_by(|a, b| {
        b.confidence()
            .total_cmp(&a.confidence())
            .then_with(|| a.code().cmp(b.code()))
    });
    sorted.truncate(n);
    sorted
}

// ============================================================================
// TESTS
// ============================================================================
