//! The output document: one record per scanned target, assembled into a
//! timestamped JSON file.
//!
//! The shape here is a contract with downstream analytics and must not drift:
//! flat string statuses, "yes"/"no" for the found flag, lowercase tier and
//! risk names. Everything is a closed type; validation happens once when the
//! document is assembled.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::acquisition::{AccessStatus, FetchOutcome};
use crate::catalog::CrawlTarget;
use crate::classify::{classify, CoverageTier, RiskLevel};
use crate::detection::Detections;

/// Run-level header of the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub target_count: usize,
    pub scan_timestamp: DateTime<Utc>,
    pub catalog_size: usize,
}

/// The whole run: metadata plus one record per target, completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDocument {
    pub metadata: ScanMetadata,
    pub results: Vec<CasinoRecord>,
}

impl ScanDocument {
    /// Assemble and validate: every input target must have produced exactly
    /// one record.
    pub fn assemble(
        target_count: usize,
        catalog_size: usize,
        results: Vec<CasinoRecord>,
    ) -> Result<Self> {
        if results.len() != target_count {
            bail!(
                "record count {} does not match target count {}",
                results.len(),
                target_count
            );
        }
        Ok(Self {
            metadata: ScanMetadata {
                target_count,
                scan_timestamp: Utc::now(),
                catalog_size,
            },
            results,
        })
    }
}

/// Evidence record for one target. Built by exactly one work unit, populated
/// in stages (fetch, detect, classify), never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasinoRecord {
    pub url: String,
    pub name: String,
    pub region: String,
    pub country: String,
    pub access_status: AccessStatus,
    #[serde(with = "yes_no")]
    pub found: bool,
    pub detected_entities: Vec<String>,
    pub deep_links: BTreeMap<String, String>,
    pub provider_mention: bool,
    pub evidence: Vec<String>,
    pub notes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub pages_scanned: u32,
    pub coverage_category: CoverageTier,
    pub issues: Vec<String>,
    pub risk_level: RiskLevel,
}

impl CasinoRecord {
    /// Fresh record for a target that has not been fetched yet.
    pub fn pending(target: &CrawlTarget) -> Self {
        Self {
            url: target.url.clone(),
            name: target.name.clone(),
            region: target.region.clone(),
            country: target.country.clone(),
            access_status: AccessStatus::Unknown,
            found: false,
            detected_entities: Vec::new(),
            deep_links: BTreeMap::new(),
            provider_mention: false,
            evidence: Vec::new(),
            notes: Vec::new(),
            timestamp: Utc::now(),
            pages_scanned: 0,
            coverage_category: CoverageTier::None,
            issues: Vec::new(),
            risk_level: RiskLevel::None,
        }
    }

    /// Record what the fetch saw. Non-online statuses leave a note.
    pub fn apply_outcome(&mut self, outcome: &FetchOutcome) {
        self.access_status = outcome.status;
        if !outcome.status.is_online() && outcome.status != AccessStatus::Unknown {
            self.notes
                .push(format!("Could not access website: {}", outcome.status));
        }
    }

    /// Fold detection results in.
    pub fn apply_detections(&mut self, det: Detections) {
        self.evidence = det.evidence_strings();
        self.detected_entities = det.entities().map(str::to_string).collect();
        self.provider_mention = det.provider_mention;
        self.deep_links = det.deep_links;
    }

    /// Final stage: derive found flag, coverage tier, issues and risk.
    /// Idempotent; the record is frozen after this.
    pub fn finalize(&mut self) {
        self.found = !self.detected_entities.is_empty();
        let outcome = classify(
            self.access_status,
            self.detected_entities.len(),
            self.provider_mention,
            self.deep_links.len(),
        );
        self.coverage_category = outcome.coverage;
        self.issues = outcome.issues;
        self.risk_level = outcome.risk;
    }
}

// "found" travels as "yes"/"no" in the document.
mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "yes" } else { "no" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected \"yes\" or \"no\", got {other:?}"
            ))),
        }
    }
}

/// Write the document to `dir` as `casino_scan_<local timestamp>.json`,
/// pretty-printed. Returns the path written.
pub fn write_document(doc: &ScanDocument, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("casino_scan_{stamp}.json"));
    let json = serde_json::to_string_pretty(doc).context("serializing scan document")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

    info!(
        path = %path.display(),
        records = doc.results.len(),
        "scan document written"
    );
    Ok(path)
}

/// Human-readable run summary for the CLI.
pub fn summarize(doc: &ScanDocument) -> String {
    let total = doc.results.len();
    let online = doc
        .results
        .iter()
        .filter(|r| r.access_status.is_online())
        .count();
    let with_games = doc.results.iter().filter(|r| r.found).count();
    let high_risk = doc
        .results
        .iter()
        .filter(|r| r.risk_level == RiskLevel::High)
        .count();

    let mut out = String::new();
    out.push_str(&format!("Scanned {total} targets ({online} reachable)\n"));
    out.push_str(&format!("Catalog detected on {with_games} targets\n"));
    out.push_str(&format!("High-risk targets: {high_risk}\n"));

    let mut flagged: Vec<&CasinoRecord> = doc.results.iter().filter(|r| r.found).collect();
    flagged.sort_by(|a, b| b.detected_entities.len().cmp(&a.detected_entities.len()));
    for record in flagged.iter().take(10) {
        out.push_str(&format!(
            "  {} [{}]: {} entities, {} coverage\n",
            record.name,
            record.region,
            record.detected_entities.len(),
            record.coverage_category
        ));
    }
    out
}
