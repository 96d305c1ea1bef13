use crate::store::{ProfileRecord, TelemetryRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub safety_score: u8,
}

/// Scoring strategy for tracked subjects. The roster builder only depends on
/// this trait; swapping in a real scorer does not touch the pipeline.
pub trait RiskModel: Send + Sync {
    fn assess(&self, record: &TelemetryRecord, profile: Option<&ProfileRecord>) -> RiskAssessment;
}

/// Placeholder scorer: every subject is low risk with a safety score of 85.
pub struct FixedRiskModel;

impl RiskModel for FixedRiskModel {
    fn assess(
        &self,
        _record: &TelemetryRecord,
        _profile: Option<&ProfileRecord>,
    ) -> RiskAssessment {
        RiskAssessment {
            level: RiskLevel::Low,
            safety_score: 85,
        }
    }
}
