pub mod progress;
pub mod queue;
pub mod sm2;
pub mod stats;

pub use progress::{calculate_card_progress, calculate_forgetting_index, is_card_due_for_review};
pub use queue::{build_study_queue, QueueCategory, QueueOptions, StudyQueueEntry};
pub use sm2::{
  format_interval, initialize_learning_state, preview_intervals, reset_progress, schedule_next_review,
  OutcomePreview,
};
pub use stats::{generate_study_stats, StudyStats};
