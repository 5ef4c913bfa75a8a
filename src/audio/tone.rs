use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const BASE_FREQ: f32 = 660.0;
const FREQ_STEP: f32 = 110.0;
const BEEP_MS: u32 = 200;

/// Synthesized alarm used when a stage has no playable sound file.
/// Pitch rises and the pause between beeps shrinks as the stage increases.
pub struct AlarmTone {
    freq: f32,
    sample_rate: u32,
    num_sample: u32,
    beep_samples: u32,
    period_samples: u32,
}

impl AlarmTone {
    pub fn new(stage: u8) -> Self {
        let sample_rate = 44100;
        let gap_ms = 800u32.saturating_sub(100 * stage as u32).max(300);
        Self {
            freq: BASE_FREQ + FREQ_STEP * stage as f32,
            sample_rate,
            num_sample: 0,
            beep_samples: sample_rate * BEEP_MS / 1000,
            period_samples: sample_rate * (BEEP_MS + gap_ms) / 1000,
        }
    }
}

impl Iterator for AlarmTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.num_sample;
        self.num_sample = (self.num_sample + 1) % self.period_samples;

        if position >= self.beep_samples {
            return Some(0.0);
        }

        let t = position as f32 / self.sample_rate as f32;
        Some((2.0 * PI * self.freq * t).sin() * 0.3)
    }
}

impl Source for AlarmTone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beeps_then_goes_quiet() {
        let tone = AlarmTone::new(0);
        let beep = tone.beep_samples as usize;
        let period = tone.period_samples as usize;

        let samples: Vec<f32> = tone.take(period * 2).collect();
        assert!(samples[..beep].iter().any(|s| s.abs() > 0.1));
        assert!(samples[beep..period].iter().all(|s| *s == 0.0));
        assert!(samples[period..period + beep].iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn higher_stages_are_higher_and_denser() {
        let calm = AlarmTone::new(0);
        let urgent = AlarmTone::new(5);
        assert!(urgent.freq > calm.freq);
        assert!(urgent.period_samples < calm.period_samples);
        assert!(urgent.total_duration().is_none());
    }
}
