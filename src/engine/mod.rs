pub mod controller;
pub mod timer;

pub use controller::{ControllerStats, IntegrityReport, TimerKind, TocController, TocEvent};
