//! Core domain types shared by the storage, search and agent layers.
//!
//! Nothing in here talks to the network or the database; these are plain
//! data types plus small text helpers.

pub mod outcome;
pub mod record;
pub mod text;

pub use outcome::StageOutcome;
pub use record::{Company, Incentive, ScoredCompany};
pub use text::{crop_opt, crop_text, find_char_boundary};
