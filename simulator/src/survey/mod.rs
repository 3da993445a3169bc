//! Survey model: cadence, threshold crossings, discovery and rates.

pub mod cadence;
pub mod discovery;
pub mod outcome;
pub mod rates;
pub mod threshold;

pub use cadence::{CadenceTable, LUNAR_MONTH_DAYS, SURVEY_YEAR_DAYS};
pub use discovery::{
    discover_object, CampaignLengthRecord, DiscoveryRecord, DiscoveryState, FilterDiscovery,
    MissReason, ObjectDiscovery,
};
pub use outcome::{classify, Outcome};
pub use rates::{RateModel, RateSummary, ShellRate};
pub use threshold::Crossing;
