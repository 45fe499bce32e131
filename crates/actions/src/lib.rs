//! Action blocks: parsing model output and executing what it asks for.

pub mod executor;
pub mod parser;

pub use executor::{ActionExecutor, ActionOutcome, summarize};
pub use parser::{ParseReport, SkippedBlock, parse_actions, parse_report, serialize_action};
