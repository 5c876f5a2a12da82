pub mod card;
pub mod review;

pub use card::{Card, CardId, CardLearningState};
pub use review::{ReviewEvent, ReviewOutcome};
