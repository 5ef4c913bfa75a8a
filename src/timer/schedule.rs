use serde::Serialize;

use crate::settings::Settings;

/// Game sessions per cycle; a short study break follows every game but the last.
pub const GAME_ROUNDS: u8 = 4;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TargetApp {
    Game,
    Study,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "round")]
pub enum PhaseKind {
    Game(u8),
    StudyBreak(u8),
    LongStudy,
}

impl PhaseKind {
    pub fn target(&self) -> TargetApp {
        match self {
            PhaseKind::Game(_) => TargetApp::Game,
            PhaseKind::StudyBreak(_) | PhaseKind::LongStudy => TargetApp::Study,
        }
    }

    pub fn label(&self) -> String {
        match self {
            PhaseKind::Game(round) => format!("Game Time ({round}/{GAME_ROUNDS})"),
            PhaseKind::StudyBreak(round) => {
                format!("Study Break ({round}/{})", GAME_ROUNDS - 1)
            }
            PhaseKind::LongStudy => "Long Study Session".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub kind: PhaseKind,
    pub app_path: String,
    pub target_title: String,
    pub duration_secs: u64,
}

impl Phase {
    fn new(kind: PhaseKind, settings: &Settings, minutes: i64) -> Self {
        let (app_path, target_title) = match kind.target() {
            TargetApp::Game => (&settings.apps.game_path, &settings.apps.game_title),
            TargetApp::Study => (&settings.apps.study_app_path, &settings.apps.study_app_title),
        };
        Self {
            kind,
            app_path: app_path.trim().to_string(),
            target_title: target_title.clone(),
            duration_secs: minutes_to_secs(minutes),
        }
    }

    pub fn label(&self) -> String {
        self.kind.label()
    }

    /// Phases without a target title are timed but never alert.
    pub fn is_enforced(&self) -> bool {
        !self.target_title.is_empty()
    }

    /// Case-sensitive containment of the target title.
    pub fn is_focused(&self, active_title: &str) -> bool {
        active_title.contains(&self.target_title)
    }
}

/// Expands the fixed cycle template against the configured durations and apps.
pub fn build_schedule(settings: &Settings) -> Vec<Phase> {
    let durations = &settings.durations;
    let mut phases = Vec::with_capacity(GAME_ROUNDS as usize * 2);

    for round in 1..=GAME_ROUNDS {
        phases.push(Phase::new(PhaseKind::Game(round), settings, durations.game_min));
        if round < GAME_ROUNDS {
            phases.push(Phase::new(
                PhaseKind::StudyBreak(round),
                settings,
                durations.short_study_min,
            ));
        }
    }
    phases.push(Phase::new(
        PhaseKind::LongStudy,
        settings,
        durations.long_study_min,
    ));

    phases
}

/// Zero or negative minutes give a phase that ends on its first tick.
fn minutes_to_secs(minutes: i64) -> u64 {
    u64::try_from(minutes).unwrap_or(0).saturating_mul(60)
}
