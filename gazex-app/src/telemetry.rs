//! Session telemetry as JSON lines, one tagged record per line. Every timestamp comes
//! from the session timer so the streams can be aligned afterwards.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use gazex_core::{ObjectId, PhaseCodeTable, Pose, TrialParameters, TrialPhase, TrialSummary, Vec2};
use gazex_eye::{CalibrationParameters, Resolution};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TrackerKind;

/// Per-tick frame vector:
/// `[pos x, pos y, pos z, yaw, gaze x, gaze y, phase code, photodiode, trial number]`.
/// Gaze is in device units and only meaningful when `new_sample` is set. Non-finite
/// values are written as `null` and read back as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp_ns: u64,
    #[serde(with = "nullable")]
    pub values: [f64; 9],
    pub new_sample: bool,
}

impl FrameRecord {
    pub fn new(
        timestamp_ns: u64,
        pose: Pose,
        gaze: Option<Vec2>,
        phase_code: u8,
        photodiode: f32,
        trial_number: u32,
    ) -> Self {
        let g = gaze.unwrap_or_else(gazex_core::invalid_pixel);
        Self {
            timestamp_ns,
            values: [
                pose.position[0] as f64,
                pose.position[1] as f64,
                pose.position[2] as f64,
                pose.yaw as f64,
                g.x as f64,
                g.y as f64,
                phase_code as f64,
                photodiode as f64,
                trial_number as f64,
            ],
            new_sample: gaze.is_some(),
        }
    }

    pub fn pose(&self) -> Pose {
        let v = &self.values;
        Pose {
            position: [v[0] as f32, v[1] as f32, v[2] as f32],
            yaw: v[3] as f32,
        }
    }

    pub fn gaze(&self) -> Option<Vec2> {
        self.new_sample
            .then(|| Vec2::new(self.values[4] as f32, self.values[5] as f32))
    }

    pub fn phase_code(&self) -> f64 {
        self.values[6]
    }

    pub fn photodiode(&self) -> f64 {
        self.values[7]
    }

    pub fn trial_number(&self) -> u32 {
        self.values[8] as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Metadata {
        tracker: TrackerKind,
        display: Resolution,
        phase_table: PhaseCodeTable,
        phases: Vec<(u8, TrialPhase)>,
        objects: Vec<(ObjectId, String)>,
    },
    Calibration {
        timestamp_ns: u64,
        parameters: CalibrationParameters,
    },
    Trial {
        timestamp_ns: u64,
        parameters: TrialParameters,
    },
    Summary {
        timestamp_ns: u64,
        text: String,
        summary: Option<TrialSummary>,
    },
    Frame(FrameRecord),
    /// Raw device rows received since the previous frame.
    Samples {
        timestamp_ns: u64,
        #[serde(with = "nullable::rows")]
        rows: Vec<[f64; 10]>,
    },
}

/// JSON has no NaN or infinity. A device can report either, and replay must still see
/// the frame, so they travel as `null`.
mod nullable {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    fn encode(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| v.is_finite().then_some(*v)).collect()
    }

    fn decode<E: serde::de::Error, const N: usize>(values: Vec<Option<f64>>) -> Result<[f64; N], E> {
        let len = values.len();
        let values: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        values
            .try_into()
            .map_err(|_| E::invalid_length(len, &"a fixed-length row"))
    }

    pub fn serialize<S: Serializer, const N: usize>(values: &[f64; N], s: S) -> Result<S::Ok, S::Error> {
        encode(values).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[f64; N], D::Error> {
        decode(Vec::deserialize(d)?)
    }

    pub mod rows {
        use super::*;

        #[allow(clippy::ptr_arg)]
        pub fn serialize<S: Serializer, const N: usize>(
            rows: &Vec<[f64; N]>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            let rows: Vec<_> = rows.iter().map(|r| encode(r)).collect();
            rows.serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
            d: D,
        ) -> Result<Vec<[f64; N]>, D::Error> {
            let rows: Vec<Vec<Option<f64>>> = Vec::deserialize(d)?;
            rows.into_iter().map(decode::<D::Error, N>).collect()
        }
    }
}

pub trait TelemetrySink {
    fn write(&mut self, record: &TelemetryRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct JsonLinesTelemetry<W: Write> {
    out: W,
    records: u64,
}

impl JsonLinesTelemetry<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("creating telemetry file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesTelemetry<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TelemetrySink for JsonLinesTelemetry<W> {
    fn write(&mut self, record: &TelemetryRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        debug!("telemetry flushed after {} records", self.records);
        Ok(())
    }
}

/// Reads a recording. Lines that do not parse are skipped with a warning.
pub fn read_records(reader: impl BufRead) -> Result<Vec<TelemetryRecord>> {
    let mut records = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("reading telemetry")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping telemetry line {}: {}", n + 1, e),
        }
    }
    Ok(records)
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<TelemetryRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening recording {}", path.display()))?;
    read_records(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_core::TrialOutcome;

    #[test]
    fn frame_vector_layout() {
        let pose = Pose {
            position: [1.0, 0.5, -2.0],
            yaw: 90.0,
        };
        let f = FrameRecord::new(7, pose, Some(Vec2::new(3.5, -1.25)), 8, 0.25, 12);
        assert_eq!(f.values, [1.0, 0.5, -2.0, 90.0, 3.5, -1.25, 8.0, 0.25, 12.0]);
        assert_eq!(f.pose(), pose);
        assert_eq!(f.gaze(), Some(Vec2::new(3.5, -1.25)));
        assert_eq!(f.trial_number(), 12);

        let idle = FrameRecord::new(8, pose, None, 0, 0.0, 0);
        assert_eq!(idle.gaze(), None);
        assert_eq!(idle.values[4], -1.0);
    }

    #[test]
    fn records_are_tagged_lines() {
        let mut sink = JsonLinesTelemetry::new(Vec::new());
        sink.write(&TelemetryRecord::Summary {
            timestamp_ns: 5,
            text: "ignored".to_string(),
            summary: Some(TrialSummary {
                trial_number: 2,
                outcome: TrialOutcome::Ignored,
                reward: gazex_core::RewardTier::None,
                reaction_time_ns: None,
                timestamp_ns: 5,
            }),
        })
        .unwrap();
        sink.write(&TelemetryRecord::Frame(FrameRecord::new(
            6,
            Pose::default(),
            None,
            14,
            0.5,
            2,
        )))
        .unwrap();
        assert_eq!(sink.records(), 2);

        let bytes = sink.into_inner();
        let text = String::from_utf8(bytes.clone()).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["record"], "summary");
        assert_eq!(first["summary"]["outcome"]["kind"], "ignored");

        let back = read_records(&bytes[..]).unwrap();
        assert_eq!(back.len(), 2);
        assert!(matches!(&back[1], TelemetryRecord::Frame(f) if f.timestamp_ns == 6));
    }

    #[test]
    fn non_finite_values_survive_a_round_trip() {
        let mut sink = JsonLinesTelemetry::new(Vec::new());
        let frame = FrameRecord::new(1, Pose::default(), Some(Vec2::new(f32::NAN, 0.5)), 3, 0.0, 1);
        sink.write(&TelemetryRecord::Frame(frame)).unwrap();
        sink.write(&TelemetryRecord::Samples {
            timestamp_ns: 1,
            rows: vec![[f64::INFINITY, 0.5, 3.0, 1.0, 0.5, 0.5, 3.0, 1.0, 10.0, 0.001]],
        })
        .unwrap();

        let bytes = sink.into_inner();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.lines().next().unwrap().contains("[0.0,0.0,0.0,0.0,null,0.5,3.0,0.0,1.0]"));

        let back = read_records(&bytes[..]).unwrap();
        assert_eq!(back.len(), 2);
        let TelemetryRecord::Frame(f) = &back[0] else {
            panic!("expected a frame, got {:?}", back[0]);
        };
        let gaze = f.gaze().unwrap();
        assert!(gaze.x.is_nan());
        assert_eq!(gaze.y, 0.5);
        assert_eq!(f.phase_code(), 3.0);
        let TelemetryRecord::Samples { rows, .. } = &back[1] else {
            panic!("expected samples, got {:?}", back[1]);
        };
        assert!(rows[0][0].is_nan());
        assert_eq!(rows[0][8], 10.0);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let input = "{\"record\":\"frame\",\"timestamp_ns\":1,\"values\":[0,0,0,0,0,0,0,0,0],\"new_sample\":false}\nnot json\n\n";
        let records = read_records(input.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }
}
