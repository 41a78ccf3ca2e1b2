//! Pure classification of a completed scan record: coverage tier, issue
//! list, risk level. No I/O, no clock, same inputs always give the same
//! answer.

use serde::{Deserialize, Serialize};

use crate::acquisition::AccessStatus;

/// How much of the catalog surfaced on the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageTier {
    #[default]
    None,
    Partial,
    Moderate,
    Strong,
}

impl CoverageTier {
    pub fn from_count(entities: usize) -> Self {
        match entities {
            0 => CoverageTier::None,
            1..=2 => CoverageTier::Partial,
            3..=5 => CoverageTier::Moderate,
            _ => CoverageTier::Strong,
        }
    }
}

impl std::fmt::Display for CoverageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoverageTier::None => "none",
            CoverageTier::Partial => "partial",
            CoverageTier::Moderate => "moderate",
            CoverageTier::Strong => "strong",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub coverage: CoverageTier,
    pub issues: Vec<String>,
    pub risk: RiskLevel,
}

/// Derive tier, issues and risk from the observable facts of one record.
///
/// Issue conditions are independent; any subset can apply. Risk is a ladder:
/// an access problem dominates, any other issue is medium, clean detection is
/// low, a clean empty result carries no risk at all.
pub fn classify(
    status: AccessStatus,
    entity_count: usize,
    provider_mention: bool,
    deep_link_count: usize,
) -> Classification {
    let mut issues = Vec::new();

    if status.is_access_issue() {
        issues.push(format!("Access issue: {status}"));
    }
    if entity_count > 0 && !provider_mention {
        issues.push("Games found but provider not listed".to_string());
    }
    if provider_mention && entity_count == 0 {
        issues.push("Provider listed but no product found".to_string());
    }
    if entity_count > 0 && deep_link_count == 0 {
        issues.push("Games detected but no direct links found".to_string());
    }

    let risk = if status.is_access_issue() {
        RiskLevel::High
    } else if !issues.is_empty() {
        RiskLevel::Medium
    } else if entity_count > 0 {
        RiskLevel::Low
    } else {
        RiskLevel::None
    };

    Classification {
        coverage: CoverageTier::from_count(entity_count),
        issues,
        risk,
    }
}
