// ============================================
// Background Jobs Module
// ============================================
//
// Periodic work of a personalization session:
// 1. Tier evolution (every 5 minutes by default)
// 2. Classifier retraining (every 24 hours by default)
//
// Time is read through a `Clock` so tests can drive the schedule with a
// `ManualClock` instead of waiting on wall-clock timers.

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{Scheduler, TaskKind};
