pub mod profiler;

pub use profiler::{
    assess_risk, level_for_score, recommended_allocation, AssetClassAllocation,
    RiskAssessmentResult, RiskQuestionnaire, RiskSummary,
};
