use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::{EnforcementSettings, MAX_ALERT_STAGE};

use super::schedule::Phase;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CycleStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

impl CycleStatus {
    /// Running or paused; a new cycle cannot start.
    pub fn is_active(&self) -> bool {
        matches!(self, CycleStatus::Running | CycleStatus::Paused)
    }
}

/// Side effects requested by a transition. The controller carries them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PhaseStarted {
        index: usize,
        label: String,
        duration_secs: u64,
    },
    Launch {
        path: String,
    },
    PlayAlert(u8),
    StopAlerts,
    StageEscalated(u8),
    FocusRegained,
    Completed,
}

/// Polling and escalation constants, fixed for the lifetime of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub tick_secs: u64,
    pub escalation_secs: u64,
    pub launch_grace_secs: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self::from(&EnforcementSettings::default())
    }
}

impl From<&EnforcementSettings> for Tuning {
    fn from(settings: &EnforcementSettings) -> Self {
        Self {
            tick_secs: settings.tick_secs(),
            escalation_secs: settings.escalation_secs(),
            launch_grace_secs: settings.launch_grace_secs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FocusTracker {
    lost_secs: u64,
    stage: u8,
    /// Alert audio has been started and not yet stopped.
    sounding: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CycleState {
    status: CycleStatus,
    cycle_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    schedule: Vec<Phase>,
    tuning: Tuning,
    phase_index: usize,
    phase_remaining_secs: u64,
    phase_elapsed_secs: u64,
    focus: FocusTracker,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> CycleStatus {
        self.status
    }

    pub fn cycle_id(&self) -> Option<&str> {
        self.cycle_id.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn schedule(&self) -> &[Phase] {
        &self.schedule
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        match self.status {
            CycleStatus::Running | CycleStatus::Paused => self.schedule.get(self.phase_index),
            CycleStatus::Idle | CycleStatus::Completed => None,
        }
    }

    pub fn phase_remaining_secs(&self) -> u64 {
        self.phase_remaining_secs
    }

    pub fn focus_lost_secs(&self) -> u64 {
        self.focus.lost_secs
    }

    pub fn alert_stage(&self) -> u8 {
        self.focus.stage
    }

    pub fn begin(
        &mut self,
        cycle_id: String,
        schedule: Vec<Phase>,
        tuning: Tuning,
        started_at: DateTime<Utc>,
    ) -> Result<Vec<Effect>> {
        if self.status.is_active() {
            bail!("cycle already active");
        }
        if schedule.is_empty() {
            bail!("cycle schedule is empty");
        }

        *self = Self {
            status: CycleStatus::Running,
            cycle_id: Some(cycle_id),
            started_at: Some(started_at),
            schedule,
            tuning,
            ..Self::default()
        };

        Ok(self.enter_phase(0))
    }

    /// Clock half of a tick: counts the phase down and moves to the next phase at zero.
    /// The launch grace window runs before the phase's own duration starts counting.
    pub fn advance_clock(&mut self) -> Vec<Effect> {
        if self.status != CycleStatus::Running {
            return Vec::new();
        }

        let step = self.tuning.tick_secs;
        let grace = self.tuning.launch_grace_secs;
        let grace_left = grace.saturating_sub(self.phase_elapsed_secs);
        self.phase_elapsed_secs = self.phase_elapsed_secs.saturating_add(step);
        self.phase_remaining_secs = self
            .phase_remaining_secs
            .saturating_sub(step.saturating_sub(grace_left));

        if self.phase_remaining_secs > 0 || self.phase_elapsed_secs < grace {
            return Vec::new();
        }

        let mut effects = self.silence();
        self.focus = FocusTracker::default();

        let next = self.phase_index + 1;
        if next < self.schedule.len() {
            effects.extend(self.enter_phase(next));
        } else {
            self.status = CycleStatus::Completed;
            self.phase_index = self.schedule.len();
            effects.push(Effect::Completed);
        }
        effects
    }

    /// Focus half of a tick. `None` (unknown) leaves the focus counters untouched.
    pub fn observe(&mut self, active_title: Option<&str>) -> Vec<Effect> {
        if self.status != CycleStatus::Running {
            return Vec::new();
        }
        let Some(title) = active_title else {
            return Vec::new();
        };
        let Some(phase) = self.schedule.get(self.phase_index) else {
            return Vec::new();
        };
        if !phase.is_enforced() {
            return Vec::new();
        }

        if phase.is_focused(title) {
            let regained = self.focus != FocusTracker::default();
            let mut effects = self.silence();
            self.focus = FocusTracker::default();
            if regained {
                effects.push(Effect::FocusRegained);
            }
            return effects;
        }

        if self.phase_elapsed_secs <= self.tuning.launch_grace_secs {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if !self.focus.sounding {
            self.focus.sounding = true;
            effects.extend((0..=self.focus.stage).map(Effect::PlayAlert));
        }

        let threshold = self.tuning.escalation_secs;
        let before = self.focus.lost_secs;
        self.focus.lost_secs = before.saturating_add(self.tuning.tick_secs);
        let crossings = self.focus.lost_secs / threshold - before / threshold;

        for _ in 0..crossings {
            if self.focus.stage >= MAX_ALERT_STAGE {
                break;
            }
            self.focus.stage += 1;
            effects.push(Effect::PlayAlert(self.focus.stage));
            effects.push(Effect::StageEscalated(self.focus.stage));
        }

        effects
    }

    /// One full tick: clock first, then focus against whatever phase is current.
    pub fn tick(&mut self, active_title: Option<&str>) -> Vec<Effect> {
        let mut effects = self.advance_clock();
        effects.extend(self.observe(active_title));
        effects
    }

    pub fn pause(&mut self) -> Result<Vec<Effect>> {
        if self.status != CycleStatus::Running {
            bail!("no running cycle to pause");
        }
        self.status = CycleStatus::Paused;
        Ok(self.silence())
    }

    pub fn resume(&mut self) -> Result<Vec<Effect>> {
        if self.status != CycleStatus::Paused {
            bail!("cycle is not paused");
        }
        self.status = CycleStatus::Running;
        Ok(Vec::new())
    }

    /// Cancels from any state and returns to idle.
    pub fn stop(&mut self) -> Vec<Effect> {
        *self = Self::default();
        vec![Effect::StopAlerts]
    }

    fn enter_phase(&mut self, index: usize) -> Vec<Effect> {
        let phase = &self.schedule[index];
        let effects = vec![
            Effect::PhaseStarted {
                index,
                label: phase.label(),
                duration_secs: phase.duration_secs,
            },
            Effect::Launch {
                path: phase.app_path.clone(),
            },
        ];

        self.phase_index = index;
        self.phase_remaining_secs = phase.duration_secs;
        self.phase_elapsed_secs = 0;
        effects
    }

    fn silence(&mut self) -> Vec<Effect> {
        if std::mem::take(&mut self.focus.sounding) {
            vec![Effect::StopAlerts]
        } else {
            Vec::new()
        }
    }
}
