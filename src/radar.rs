//! Radar point messages → one text line per message.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rosbag::{ChunkRecord, MessageRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use thiserror::Error;

use crate::msgdef::{MessageSchema, MessageValue, Value};
use crate::rosbags_io::{collect_connections, open_bag};

/// Layout assumed when a connection carries no definition text.
pub const DEFAULT_RADAR_DEFINITION: &str = "\
Header header
uint32 radar_frame_idx
uint16 point_id
float32 x
float32 y
float32 z
float32 range
float32 velocity
uint16 doppler_bin
float32 bearing
float32 intensity
float32 intensity_snr_noise
float32 noise
string time_human
";

#[derive(Debug, Error)]
pub enum RadarFieldError {
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("field `{field}` has kind {kind}, expected {expected}")]
    WrongKind {
        field: &'static str,
        kind: &'static str,
        expected: &'static str,
    },
}

/// One radar point as exported.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarRecord {
    pub frame_id: String,
    pub radar_frame_idx: i64,
    pub point_id: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub range: f64,
    pub velocity: f64,
    pub doppler_bin: f64,
    pub bearing: f64,
    pub intensity: f64,
    pub intensity_snr_noise: f64,
    pub noise: f64,
    pub time_human: String,
}

impl RadarRecord {
    pub fn from_message(msg: &MessageValue) -> Result<Self, RadarFieldError> {
        Ok(Self {
            frame_id: text(msg, "header.frame_id")?,
            radar_frame_idx: int(msg, "radar_frame_idx")?,
            point_id: int(msg, "point_id")?,
            x: float(msg, "x")?,
            y: float(msg, "y")?,
            z: float(msg, "z")?,
            range: float(msg, "range")?,
            velocity: float(msg, "velocity")?,
            doppler_bin: float(msg, "doppler_bin")?,
            bearing: float(msg, "bearing")?,
            intensity: float(msg, "intensity")?,
            intensity_snr_noise: float(msg, "intensity_snr_noise")?,
            noise: float(msg, "noise")?,
            time_human: text(msg, "time_human")?,
        })
    }

    /// Render the comma separated line, newline included.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            self.frame_id,
            self.radar_frame_idx,
            self.point_id,
            f6(self.x),
            f6(self.y),
            f6(self.z),
            f6(self.range),
            f6(self.velocity),
            f6(self.doppler_bin),
            f6(self.bearing),
            f6(self.intensity),
            f6(self.intensity_snr_noise),
            f6(self.noise),
            self.time_human
        )
    }
}

fn lookup<'a>(msg: &'a MessageValue, field: &'static str) -> Result<&'a Value, RadarFieldError> {
    msg.get_path(field).ok_or(RadarFieldError::Missing(field))
}

fn int(msg: &MessageValue, field: &'static str) -> Result<i64, RadarFieldError> {
    let v = lookup(msg, field)?;
    v.as_i64().ok_or(RadarFieldError::WrongKind {
        field,
        kind: v.kind(),
        expected: "integer",
    })
}

fn float(msg: &MessageValue, field: &'static str) -> Result<f64, RadarFieldError> {
    let v = lookup(msg, field)?;
    v.as_f64().ok_or(RadarFieldError::WrongKind {
        field,
        kind: v.kind(),
        expected: "number",
    })
}

fn text(msg: &MessageValue, field: &'static str) -> Result<String, RadarFieldError> {
    let value = lookup(msg, field)?;
    if let Some(s) = value.as_str() {
        return Ok(s.to_string());
    }
    match value {
        v @ (Value::Time { .. } | Value::Duration { .. }) => Ok(v.to_string()),
        v => Err(RadarFieldError::WrongKind {
            field,
            kind: v.kind(),
            expected: "string",
        }),
    }
}

/// Fixed six decimals; non-finite values use the lowercase spellings.
fn f6(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:.6}", v)
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Path to the input .bag file
    pub bag_path: String,
    /// Path to the text file to create
    pub output_path: String,
    /// Topic carrying the radar points
    pub topic: String,
    /// Show a spinner while exporting
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub connections: usize,
    pub lines_written: u64,
}

/// Export every message on `options.topic`, one line each, ordered by
/// message time the way `rosbag` playback orders them. Messages with equal
/// times keep their position in the file.
///
/// The output file is created even when the topic has no messages. Any
/// message that cannot be decoded aborts the export before a line is
/// written.
pub fn export_radar(options: &ExportOptions) -> Result<ExportSummary> {
    println!(
        "Extract radar data from {} on topic {} into {}",
        options.bag_path, options.topic, options.output_path
    );

    let bag = open_bag(&options.bag_path)?;
    let connections = collect_connections(&bag)?;

    let mut schemas: HashMap<u32, MessageSchema> = HashMap::new();
    for conn in connections.values().filter(|c| c.topic == options.topic) {
        let definition = if conn.definition.trim().is_empty() {
            tracing::warn!(
                topic = %conn.topic,
                tp = %conn.tp,
                "connection has no message definition; assuming the default radar layout"
            );
            DEFAULT_RADAR_DEFINITION
        } else {
            conn.definition.as_str()
        };
        let schema = MessageSchema::parse(&conn.tp, definition)
            .with_context(|| format!("invalid message definition for {} ({})", conn.topic, conn.tp))?;
        tracing::debug!(conn = conn.id, tp = schema.root_type(), fields = schema.fields().len(), "radar connection");
        schemas.insert(conn.id, schema);
    }
    if schemas.is_empty() {
        tracing::warn!(topic = %options.topic, "topic not present in bag; output will be empty");
    }

    let file = File::create(&options.output_path)
        .with_context(|| format!("failed to create output file: {}", options.output_path))?;
    let mut out = BufWriter::new(file);

    let pb = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner} {pos} points")?);
        Some(pb)
    } else {
        None
    };

    // (message time, line); only the formatted lines are held, never chunks
    let mut rows: Vec<(u64, String)> = Vec::new();
    for record in bag.chunk_records() {
        let record = record?;
        if let ChunkRecord::Chunk(chunk) = record {
            for msg in chunk.messages() {
                let msg = msg?;
                if let MessageRecord::MessageData(msg_data) = msg
                    && let Some(schema) = schemas.get(&msg_data.conn_id)
                {
                    let n = rows.len();
                    let value = schema
                        .decode(msg_data.data)
                        .with_context(|| format!("message {} on {} is malformed", n, options.topic))?;
                    let rec = RadarRecord::from_message(&value)
                        .with_context(|| format!("message {} on {} is malformed", n, options.topic))?;
                    rows.push((msg_data.time, rec.to_line()));
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                }
            }
        }
    }

    rows.sort_by_key(|(time, _)| *time);
    for (_, line) in &rows {
        out.write_all(line.as_bytes())
            .with_context(|| format!("failed to write {}", options.output_path))?;
    }
    let lines = rows.len() as u64;
    out.flush()
        .with_context(|| format!("failed to write {}", options.output_path))?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    println!("Wrote radar data to {}", options.output_path);

    Ok(ExportSummary {
        connections: schemas.len(),
        lines_written: lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload(frame_id: &str, idx: u32, point: u16, time_human: &str) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&10u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&(frame_id.len() as u32).to_le_bytes());
        p.extend_from_slice(frame_id.as_bytes());
        p.extend_from_slice(&idx.to_le_bytes());
        p.extend_from_slice(&point.to_le_bytes());
        for v in [1.5f32, -2.25, 0.125, 3.0, -0.5] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        p.extend_from_slice(&7u16.to_le_bytes());
        for v in [0.75f32, 12.0, 4.5, 0.001] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        p.extend_from_slice(&(time_human.len() as u32).to_le_bytes());
        p.extend_from_slice(time_human.as_bytes());
        p
    }

    #[test]
    fn test_default_layout_line() {
        let schema = MessageSchema::parse("radar/RadarScan", DEFAULT_RADAR_DEFINITION).unwrap();
        let msg = schema
            .decode(&sample_payload("ti_mmwave", 42, 3, "12:00:01.5"))
            .unwrap();
        let rec = RadarRecord::from_message(&msg).unwrap();
        assert_eq!(
            rec.to_line(),
            "ti_mmwave,42,3,1.500000,-2.250000,0.125000,3.000000,-0.500000,7.000000,0.750000,12.000000,4.500000,0.001000,12:00:01.5\n"
        );
        assert_eq!(rec.to_line().trim_end().split(',').count(), 14);
    }

    #[test]
    fn test_missing_field_is_reported() {
        let schema = MessageSchema::parse("radar/Partial", "Header header\nuint32 radar_frame_idx\n").unwrap();
        let mut p = sample_payload("f", 1, 0, "");
        p.truncate(4 + 8 + 4 + 1 + 4);
        let msg = schema.decode(&p).unwrap();
        let err = RadarRecord::from_message(&msg).unwrap_err();
        assert!(matches!(err, RadarFieldError::Missing("point_id")));
    }

    #[test]
    fn test_wrong_kind_is_reported() {
        let schema = MessageSchema::parse(
            "radar/Odd",
            &DEFAULT_RADAR_DEFINITION.replace("string time_human", "float32[] time_human"),
        )
        .unwrap();
        let p = sample_payload("f", 1, 0, "");
        // empty string and empty array share the same zero length prefix
        let msg = schema.decode(&p).unwrap();
        let err = RadarRecord::from_message(&msg).unwrap_err();
        assert!(matches!(
            err,
            RadarFieldError::WrongKind {
                field: "time_human",
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(f6(f64::NAN), "nan");
        assert_eq!(f6(f64::NEG_INFINITY), "-inf");
        assert_eq!(f6(0.1234567), "0.123457");
    }
}
