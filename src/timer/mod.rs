pub mod controller;
pub mod schedule;
pub mod state;

pub use controller::{Collaborators, CycleController, CycleEvent, CycleSnapshot};
pub use schedule::{build_schedule, Phase, PhaseKind};
pub use state::CycleStatus;
