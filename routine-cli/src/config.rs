use anyhow::{Context, Result};
use chrono_tz::Tz;
use routine_core::time::{parse_clock_time, parse_tz};
use routine_core::ReminderPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub reminders: RemindersSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSection {
    /// Default sleep block for `routine setup` (minutes).
    pub sleep_minutes: i64,
    /// Default work block for `routine setup` (minutes).
    pub work_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemindersSection {
    /// Local "HH:MM" for the daily summary.
    pub daily_summary: String,
    pub notify_start: bool,
    pub notify_end: bool,
    /// Also raise a desktop notification (osascript / notify-send) when available.
    pub desktop_notifications: bool,
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            schedule: ScheduleSection::default(),
            reminders: RemindersSection::default(),
        }
    }
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            sleep_minutes: 8 * 60,
            work_minutes: 8 * 60,
        }
    }
}

impl Default for RemindersSection {
    fn default() -> Self {
        Self {
            daily_summary: "21:00".to_string(),
            notify_start: true,
            notify_end: true,
            desktop_notifications: true,
        }
    }
}

impl Config {
    pub fn tz(&self) -> Result<Tz> {
        Ok(parse_tz(&self.timezone)?)
    }

    pub fn reminder_policy(&self) -> Result<ReminderPolicy> {
        let daily_summary_at = parse_clock_time(&self.reminders.daily_summary)
            .context("config [reminders].daily_summary")?;
        Ok(ReminderPolicy {
            daily_summary_at,
            notify_start: self.reminders.notify_start,
            notify_end: self.reminders.notify_end,
        })
    }
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

pub fn load_config(home: &Path) -> Result<Config> {
    let p = config_path(home);
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(home: &Path, cfg: &Config) -> Result<()> {
    let p = config_path(home);
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config(home: &Path) -> Result<()> {
    let p = config_path(home);
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(home, &Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}
