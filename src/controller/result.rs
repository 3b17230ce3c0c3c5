use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Committed values for one microgrid, one entry per completed hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicrogridSeries {
    pub microgrid: String,
    /// Adjusted load actually served
    pub load_kw: Vec<f64>,
    pub generation_kw: Vec<f64>,
    /// Discharge minus charge
    pub battery_kw: Vec<f64>,
    /// Utility buy minus sell
    pub utility_kw: Vec<f64>,
    /// Community receive minus send
    pub community_kw: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled { at_hour: usize },
}

/// One microgrid's values for the hour being committed.
#[derive(Debug, Clone, PartialEq)]
pub struct HourEntry {
    pub microgrid: String,
    pub load_kw: f64,
    pub generation_kw: f64,
    pub battery_kw: f64,
    pub utility_kw: f64,
    pub community_kw: f64,
}

/// Everything committed at the end of one hourly iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct HourRecord {
    pub hour: usize,
    pub community_output_kw: f64,
    /// Shared battery discharge minus charge
    pub community_battery_kw: f64,
    pub entries: Vec<HourEntry>,
}

/// Outcome of a rolling-horizon run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub horizon: usize,
    pub status: RunStatus,
    /// DSO generator output per committed hour
    pub community_output_kw: Vec<f64>,
    /// Shared battery discharge minus charge per committed hour
    pub community_battery_kw: Vec<f64>,
    pub microgrids: Vec<MicrogridSeries>,
}

impl RollingResult {
    pub fn new(horizon: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            horizon,
            status: RunStatus::Running,
            community_output_kw: Vec::new(),
            community_battery_kw: Vec::new(),
            microgrids: Vec::new(),
        }
    }

    pub fn completed_hours(&self) -> usize {
        self.community_output_kw.len()
    }

    pub fn series(&self, microgrid: &str) -> Option<&MicrogridSeries> {
        self.microgrids.iter().find(|s| s.microgrid == microgrid)
    }

    /// Append a whole hour. Records arrive in hour order.
    pub(crate) fn commit(&mut self, record: HourRecord) {
        debug_assert_eq!(record.hour, self.completed_hours());
        self.community_output_kw.push(record.community_output_kw);
        self.community_battery_kw.push(record.community_battery_kw);
        for entry in record.entries {
            let index = match self
                .microgrids
                .iter()
                .position(|s| s.microgrid == entry.microgrid)
            {
                Some(index) => index,
                None => {
                    self.microgrids.push(MicrogridSeries {
                        microgrid: entry.microgrid.clone(),
                        ..MicrogridSeries::default()
                    });
                    self.microgrids.len() - 1
                }
            };
            let series = &mut self.microgrids[index];
            series.load_kw.push(entry.load_kw);
            series.generation_kw.push(entry.generation_kw);
            series.battery_kw.push(entry.battery_kw);
            series.utility_kw.push(entry.utility_kw);
            series.community_kw.push(entry.community_kw);
        }
    }

    pub(crate) fn finish(mut self, status: RunStatus) -> Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(microgrid: &str, load: f64) -> HourEntry {
        HourEntry {
            microgrid: microgrid.into(),
            load_kw: load,
            generation_kw: load,
            battery_kw: 0.0,
            utility_kw: 0.0,
            community_kw: 0.0,
        }
    }

    #[test]
    fn test_commit_appends_aligned_series() {
        let mut result = RollingResult::new(2);
        for hour in 0..2 {
            result.commit(HourRecord {
                hour,
                community_output_kw: 0.0,
                community_battery_kw: -2.5,
                entries: vec![entry("mg1", 10.0 + hour as f64), entry("mg2", 5.0)],
            });
        }

        assert_eq!(result.completed_hours(), 2);
        assert_eq!(result.community_battery_kw, vec![-2.5, -2.5]);
        assert_eq!(result.series("mg1").unwrap().load_kw, vec![10.0, 11.0]);
        assert_eq!(result.series("mg2").unwrap().generation_kw, vec![5.0, 5.0]);
        assert!(result.series("mg3").is_none());
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let result = RollingResult::new(3).finish(RunStatus::Cancelled { at_hour: 1 });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"]["state"], "cancelled");
        assert_eq!(json["status"]["at_hour"], 1);
        assert!(result.finished_at.is_some());
    }
}
