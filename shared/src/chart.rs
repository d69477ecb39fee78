//! Chart files: the note sequence both clients and the server play from.

use crate::error::{ChartError, ChartResult};
use crate::judgment::{optional_label, Judgment};
use crate::LANE_COUNT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: usize,
    pub lane: u8,
    /// Onset in milliseconds from session start.
    pub time: i64,
    /// Zero for tap notes.
    pub duration: i64,
    #[serde(with = "optional_label", default)]
    pub judgment: Option<Judgment>,
}

impl Note {
    pub fn new(id: usize, lane: u8, time: i64, duration: i64) -> Self {
        Self {
            id,
            lane,
            time,
            duration,
            judgment: None,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.duration > 0
    }

    pub fn end_time(&self) -> i64 {
        self.time + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub notes: Vec<Note>,
    /// Session end in milliseconds from session start.
    pub end: i64,
    pub audio: String,
    #[serde(default)]
    pub offset: i64,
}

impl Chart {
    /// Reads and validates a chart from disk.
    pub fn load(path: impl AsRef<Path>) -> ChartResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ChartError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> ChartResult<Self> {
        let chart: Chart = serde_json::from_str(raw)?;
        chart.validate()?;
        Ok(chart)
    }

    /// Checks the invariants the judgment engine and reconciler rely on.
    pub fn validate(&self) -> ChartResult<()> {
        let mut previous_time = i64::MIN;
        for (position, note) in self.notes.iter().enumerate() {
            if note.id != position {
                return Err(ChartError::Invalid(format!(
                    "note at position {} has id {}",
                    position, note.id
                )));
            }
            if note.lane == 0 || note.lane as usize > LANE_COUNT {
                return Err(ChartError::Invalid(format!(
                    "note {} uses lane {}, expected 1..={}",
                    note.id, note.lane, LANE_COUNT
                )));
            }
            if note.duration < 0 {
                return Err(ChartError::Invalid(format!(
                    "note {} has negative duration {}",
                    note.id, note.duration
                )));
            }
            if note.time < previous_time {
                return Err(ChartError::Invalid(format!(
                    "note {} starts before the note preceding it",
                    note.id
                )));
            }
            previous_time = note.time;
        }
        Ok(())
    }

    /// Resolves the audio file next to the chart and fails if it is absent.
    pub fn audio_path(&self, chart_path: impl AsRef<Path>) -> ChartResult<PathBuf> {
        let directory = chart_path
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let audio = directory.join(&self.audio);
        if audio.is_file() {
            Ok(audio)
        } else {
            Err(ChartError::MissingAudio(audio))
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
