pub mod harvester;

pub use harvester::{
    find_opportunities, harvest_position, HarvestCandidate, HarvestOutcome, TaxLossOpportunity,
    TaxLossReport,
};
