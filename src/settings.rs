use anyhow::{Context, Result};
use log::warn;
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{PoisonError, RwLock},
};

use crate::error::SettingsError;
use crate::launcher::resolve_executable;

/// Highest alert stage; stages run `0..=MAX_ALERT_STAGE`.
pub const MAX_ALERT_STAGE: u8 = 5;
pub const STAGE_COUNT: usize = MAX_ALERT_STAGE as usize + 1;

/// Literal older config files used to mean "no custom sound".
const LEGACY_BELL: &str = "system_bell";

const STAGE_KEYS: [&str; STAGE_COUNT] = [
    "stage_0", "stage_1", "stage_2", "stage_3", "stage_4", "stage_5",
];

pub type StageSounds = [Option<PathBuf>; STAGE_COUNT];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "Settings", default)]
    pub apps: AppSettings,
    #[serde(rename = "Durations", default)]
    pub durations: DurationSettings,
    #[serde(rename = "Sounds", default)]
    pub sounds: SoundSettings,
    #[serde(rename = "Enforcement", default)]
    pub enforcement: EnforcementSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    #[serde(deserialize_with = "lenient_text")]
    pub game_path: String,
    #[serde(deserialize_with = "lenient_text")]
    pub game_title: String,
    #[serde(deserialize_with = "lenient_text")]
    pub study_app_path: String,
    #[serde(deserialize_with = "lenient_text")]
    pub study_app_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDurations")]
pub struct DurationSettings {
    pub game_min: i64,
    pub short_study_min: i64,
    pub long_study_min: i64,
}

impl Default for DurationSettings {
    fn default() -> Self {
        Self {
            game_min: 25,
            short_study_min: 5,
            long_study_min: 30,
        }
    }
}

/// A hand-edited value: the expected type, a string holding it, or something unusable.
/// Unusable values fall back to the key's default instead of failing the whole file.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Exact(T),
    Text(String),
    Other(IgnoredAny),
}

impl<T: FromStr> Lenient<T> {
    fn resolve(self, fallback: T) -> T {
        match self {
            Lenient::Exact(value) => value,
            Lenient::Text(text) => text.trim().parse().unwrap_or(fallback),
            Lenient::Other(_) => fallback,
        }
    }
}

fn pick<T: FromStr>(value: Option<Lenient<T>>, fallback: T) -> T {
    match value {
        Some(value) => value.resolve(fallback),
        None => fallback,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Lenient::<String>::deserialize(deserializer)? {
        Lenient::Exact(text) | Lenient::Text(text) => Ok(text),
        Lenient::Other(_) => {
            warn!("Ignoring a settings value that is not text");
            Ok(String::new())
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDurations {
    game_min: Option<Lenient<i64>>,
    short_study_min: Option<Lenient<i64>>,
    long_study_min: Option<Lenient<i64>>,
}

impl From<RawDurations> for DurationSettings {
    fn from(raw: RawDurations) -> Self {
        let defaults = DurationSettings::default();
        Self {
            game_min: pick(raw.game_min, defaults.game_min),
            short_study_min: pick(raw.short_study_min, defaults.short_study_min),
            long_study_min: pick(raw.long_study_min, defaults.long_study_min),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundSettings {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "sound_path")]
    pub stage_0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "sound_path")]
    pub stage_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "sound_path")]
    pub stage_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "sound_path")]
    pub stage_3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "sound_path")]
    pub stage_4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "sound_path")]
    pub stage_5: Option<String>,
}

fn sound_path<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(normalize_sound(lenient_text(deserializer)?))
}

fn normalize_sound(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == LEGACY_BELL {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl SoundSettings {
    fn slot_mut(&mut self, stage: usize) -> Option<&mut Option<String>> {
        match stage {
            0 => Some(&mut self.stage_0),
            1 => Some(&mut self.stage_1),
            2 => Some(&mut self.stage_2),
            3 => Some(&mut self.stage_3),
            4 => Some(&mut self.stage_4),
            5 => Some(&mut self.stage_5),
            _ => None,
        }
    }

    pub fn stage(&self, stage: usize) -> Option<&str> {
        let slot = match stage {
            0 => &self.stage_0,
            1 => &self.stage_1,
            2 => &self.stage_2,
            3 => &self.stage_3,
            4 => &self.stage_4,
            5 => &self.stage_5,
            _ => return None,
        };
        slot.as_deref()
    }

    pub fn stage_sounds(&self) -> StageSounds {
        std::array::from_fn(|stage| self.stage(stage).map(PathBuf::from))
    }
}

/// Polling and escalation constants for the focus monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEnforcement")]
pub struct EnforcementSettings {
    pub tick_secs: u64,
    pub escalation_secs: u64,
    pub launch_grace_secs: u64,
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self {
            tick_secs: 1,
            escalation_secs: 10,
            launch_grace_secs: 3,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEnforcement {
    tick_secs: Option<Lenient<u64>>,
    escalation_secs: Option<Lenient<u64>>,
    launch_grace_secs: Option<Lenient<u64>>,
}

impl From<RawEnforcement> for EnforcementSettings {
    fn from(raw: RawEnforcement) -> Self {
        let defaults = EnforcementSettings::default();
        Self {
            tick_secs: pick(raw.tick_secs, defaults.tick_secs),
            escalation_secs: pick(raw.escalation_secs, defaults.escalation_secs),
            launch_grace_secs: pick(raw.launch_grace_secs, defaults.launch_grace_secs),
        }
    }
}

impl EnforcementSettings {
    pub fn tick_secs(&self) -> u64 {
        self.tick_secs.max(1)
    }

    pub fn escalation_secs(&self) -> u64 {
        self.escalation_secs.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PathStatus {
    NotConfigured,
    Found,
    Missing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathCheck {
    pub label: &'static str,
    pub path: String,
    pub status: PathStatus,
}

impl Settings {
    /// Reads settings from `path`, substituting defaults for anything missing or unreadable.
    pub fn load(path: &Path) -> Settings {
        if !path.exists() {
            return Settings::default();
        }

        Self::read(path).unwrap_or_else(|err| {
            warn!("{}; using default settings", err);
            Settings::default()
        })
    }

    pub fn read(path: &Path) -> Result<Settings, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Settings, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let serialized = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, serialized).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sets one field by its file key, e.g. `game_min` or `Durations.game_min`.
    /// A section qualifier must name the section the key lives in (case-insensitive).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let (section, field) = match key.rsplit_once('.') {
            Some((section, field)) => (Some(section), field),
            None => (None, key),
        };
        let home = section_of(field).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        if section.is_some_and(|section| !section.eq_ignore_ascii_case(home)) {
            return Err(SettingsError::UnknownKey(key.to_string()));
        }
        let value = value.trim();

        match field {
            "game_path" => self.apps.game_path = value.to_string(),
            "game_title" => self.apps.game_title = value.to_string(),
            "study_app_path" => self.apps.study_app_path = value.to_string(),
            "study_app_title" => self.apps.study_app_title = value.to_string(),
            "game_min" => self.durations.game_min = parse_minutes(key, value)?,
            "short_study_min" => self.durations.short_study_min = parse_minutes(key, value)?,
            "long_study_min" => self.durations.long_study_min = parse_minutes(key, value)?,
            "tick_secs" => self.enforcement.tick_secs = parse_secs(key, value)?,
            "escalation_secs" => self.enforcement.escalation_secs = parse_secs(key, value)?,
            "launch_grace_secs" => self.enforcement.launch_grace_secs = parse_secs(key, value)?,
            other => {
                let slot = other
                    .strip_prefix("stage_")
                    .and_then(|n| n.parse::<usize>().ok())
                    .and_then(|stage| self.sounds.slot_mut(stage))
                    .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
                *slot = normalize_sound(value.to_string());
            }
        }

        Ok(())
    }

    /// Reports whether the configured executables and custom stage sounds can be found.
    pub fn check_paths(&self) -> Vec<PathCheck> {
        let apps = [
            ("game", &self.apps.game_path),
            ("study", &self.apps.study_app_path),
        ]
        .into_iter()
        .map(|(label, path)| {
            let status = if path.trim().is_empty() {
                PathStatus::NotConfigured
            } else if resolve_executable(path).is_some() {
                PathStatus::Found
            } else {
                PathStatus::Missing
            };
            PathCheck {
                label,
                path: path.clone(),
                status,
            }
        });

        let sounds = STAGE_KEYS.into_iter().enumerate().filter_map(|(stage, label)| {
            let path = self.sounds.stage(stage)?;
            let status = if Path::new(path).is_file() {
                PathStatus::Found
            } else {
                PathStatus::Missing
            };
            Some(PathCheck {
                label,
                path: path.to_string(),
                status,
            })
        });

        apps.chain(sounds).collect()
    }
}

/// File section a settings key belongs to.
fn section_of(field: &str) -> Option<&'static str> {
    match field {
        "game_path" | "game_title" | "study_app_path" | "study_app_title" => Some("Settings"),
        "game_min" | "short_study_min" | "long_study_min" => Some("Durations"),
        "tick_secs" | "escalation_secs" | "launch_grace_secs" => Some("Enforcement"),
        _ if STAGE_KEYS.iter().any(|stage| *stage == field) => Some("Sounds"),
        _ => None,
    }
}

fn parse_minutes(key: &str, value: &str) -> Result<i64, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_secs(key: &str, value: &str) -> Result<u64, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        let data = Settings::load(&path);
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `edit` to the file's current contents and persists the result.
    /// A file that exists but cannot be parsed is never overwritten; the in-memory
    /// copy is left untouched on any failure.
    pub fn update<F>(&self, edit: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<(), SettingsError>,
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = if self.path.exists() {
            Settings::read(&self.path).with_context(|| {
                format!("refusing to overwrite {}; fix or remove it first", self.path.display())
            })?
        } else {
            guard.clone()
        };
        edit(&mut next)?;
        next.save(&self.path)?;
        *guard = next.clone();
        Ok(next)
    }
}
