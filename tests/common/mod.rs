//! Builds small uncompressed ROS1 v2.0 bags for tests.

#![allow(dead_code)]

use std::path::Path;

const OP_MSG_DATA: u8 = 0x02;
const OP_BAG_HEADER: u8 = 0x03;
const OP_INDEX_DATA: u8 = 0x04;
const OP_CHUNK: u8 = 0x05;
const OP_CHUNK_INFO: u8 = 0x06;
const OP_CONNECTION: u8 = 0x07;

const BAG_HEADER_LEN: usize = 4096;

pub const RADAR_TYPE: &str = "radar_msgs/RadarPoint";

pub const RADAR_DEFINITION: &str = "\
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

================================================================================
MSG: std_msgs/Header
uint32 seq
time stamp
string frame_id
";

struct Connection {
    id: u32,
    topic: String,
    tp: String,
    definition: String,
}

struct Message {
    conn: u32,
    sec: u32,
    nsec: u32,
    data: Vec<u8>,
}

#[derive(Default)]
pub struct BagBuilder {
    connections: Vec<Connection>,
    messages: Vec<Message>,
}

impl BagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic; returns its connection id.
    pub fn connection(&mut self, topic: &str, tp: &str, definition: &str) -> u32 {
        let id = self.connections.len() as u32;
        self.connections.push(Connection {
            id,
            topic: topic.to_string(),
            tp: tp.to_string(),
            definition: definition.to_string(),
        });
        id
    }

    pub fn message(&mut self, conn: u32, sec: u32, nsec: u32, data: Vec<u8>) -> &mut Self {
        self.messages.push(Message { conn, sec, nsec, data });
        self
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.to_bytes()).unwrap();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut chunk_data = Vec::new();
        let mut offsets: Vec<u32> = Vec::with_capacity(self.messages.len());
        for conn in &self.connections {
            connection_record(&mut chunk_data, conn);
        }
        for msg in &self.messages {
            offsets.push(chunk_data.len() as u32);
            record(
                &mut chunk_data,
                &[
                    field_u8("op", OP_MSG_DATA),
                    field_u32("conn", msg.conn),
                    field_time("time", msg.sec, msg.nsec),
                ],
                &msg.data,
            );
        }

        let chunk_pos = (13 + BAG_HEADER_LEN) as u64;
        let mut body = Vec::new();
        record(
            &mut body,
            &[
                field_u8("op", OP_CHUNK),
                field("compression", b"none"),
                field_u32("size", chunk_data.len() as u32),
            ],
            &chunk_data,
        );

        for conn in &self.connections {
            let mut entries = Vec::new();
            let mut count = 0u32;
            for (msg, offset) in self.messages.iter().zip(&offsets) {
                if msg.conn == conn.id {
                    entries.extend_from_slice(&msg.sec.to_le_bytes());
                    entries.extend_from_slice(&msg.nsec.to_le_bytes());
                    entries.extend_from_slice(&offset.to_le_bytes());
                    count += 1;
                }
            }
            record(
                &mut body,
                &[
                    field_u8("op", OP_INDEX_DATA),
                    field_u32("ver", 1),
                    field_u32("conn", conn.id),
                    field_u32("count", count),
                ],
                &entries,
            );
        }

        let index_pos = chunk_pos + body.len() as u64;
        for conn in &self.connections {
            connection_record(&mut body, conn);
        }
        let (start, end) = self.time_span();
        let mut counts = Vec::new();
        for conn in &self.connections {
            let n = self.messages.iter().filter(|m| m.conn == conn.id).count() as u32;
            counts.extend_from_slice(&conn.id.to_le_bytes());
            counts.extend_from_slice(&n.to_le_bytes());
        }
        record(
            &mut body,
            &[
                field_u8("op", OP_CHUNK_INFO),
                field_u32("ver", 1),
                field("chunk_pos", &chunk_pos.to_le_bytes()),
                field_time("start_time", start.0, start.1),
                field_time("end_time", end.0, end.1),
                field_u32("count", self.connections.len() as u32),
            ],
            &counts,
        );

        let mut out = b"#ROSBAG V2.0\n".to_vec();
        let header_fields = [
            field_u8("op", OP_BAG_HEADER),
            field("index_pos", &index_pos.to_le_bytes()),
            field_u32("conn_count", self.connections.len() as u32),
            field_u32("chunk_count", 1),
        ];
        let header_len: usize = header_fields.iter().map(Vec::len).sum();
        let padding = vec![b' '; BAG_HEADER_LEN - 8 - header_len];
        record(&mut out, &header_fields, &padding);
        assert_eq!(out.len(), 13 + BAG_HEADER_LEN);

        out.extend_from_slice(&body);
        out
    }

    fn time_span(&self) -> ((u32, u32), (u32, u32)) {
        let times = self.messages.iter().map(|m| (m.sec, m.nsec));
        let start = times.clone().min().unwrap_or((0, 0));
        let end = times.max().unwrap_or((0, 0));
        (start, end)
    }
}

fn connection_record(out: &mut Vec<u8>, conn: &Connection) {
    let mut data = Vec::new();
    for f in [
        field("topic", conn.topic.as_bytes()),
        field("type", conn.tp.as_bytes()),
        field("md5sum", b"0123456789abcdef0123456789abcdef"),
        field("message_definition", conn.definition.as_bytes()),
    ] {
        data.extend_from_slice(&f);
    }
    record(
        out,
        &[
            field_u8("op", OP_CONNECTION),
            field_u32("conn", conn.id),
            field("topic", conn.topic.as_bytes()),
        ],
        &data,
    );
}

fn record(out: &mut Vec<u8>, header: &[Vec<u8>], data: &[u8]) {
    let header_len: usize = header.iter().map(Vec::len).sum();
    out.extend_from_slice(&(header_len as u32).to_le_bytes());
    for f in header {
        out.extend_from_slice(f);
    }
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn field(name: &str, value: &[u8]) -> Vec<u8> {
    let len = name.len() + 1 + value.len();
    let mut f = Vec::with_capacity(4 + len);
    f.extend_from_slice(&(len as u32).to_le_bytes());
    f.extend_from_slice(name.as_bytes());
    f.push(b'=');
    f.extend_from_slice(value);
    f
}

fn field_u8(name: &str, value: u8) -> Vec<u8> {
    field(name, &[value])
}

fn field_u32(name: &str, value: u32) -> Vec<u8> {
    field(name, &value.to_le_bytes())
}

fn field_time(name: &str, sec: u32, nsec: u32) -> Vec<u8> {
    let mut v = sec.to_le_bytes().to_vec();
    v.extend_from_slice(&nsec.to_le_bytes());
    field(name, &v)
}

/// A radar point serialized the way rospy writes it.
#[derive(Debug, Clone)]
pub struct RadarPoint {
    pub seq: u32,
    pub frame_id: String,
    pub radar_frame_idx: u32,
    pub point_id: u16,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub range: f32,
    pub velocity: f32,
    pub doppler_bin: u16,
    pub bearing: f32,
    pub intensity: f32,
    pub intensity_snr_noise: f32,
    pub noise: f32,
    pub time_human: String,
}

impl RadarPoint {
    pub fn sample(frame: u32, point: u16) -> Self {
        Self {
            seq: frame * 100 + point as u32,
            frame_id: "radar_link".to_string(),
            radar_frame_idx: frame,
            point_id: point,
            x: 1.5,
            y: -0.25,
            z: 0.125,
            range: 10.0 + point as f32,
            velocity: -2.5,
            doppler_bin: 7,
            bearing: 0.5,
            intensity: 33.0,
            intensity_snr_noise: 12.75,
            noise: 0.0625,
            time_human: format!("12:00:0{frame}"),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&self.seq.to_le_bytes());
        b.extend_from_slice(&1_600_000_000u32.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        put_str(&mut b, &self.frame_id);
        b.extend_from_slice(&self.radar_frame_idx.to_le_bytes());
        b.extend_from_slice(&self.point_id.to_le_bytes());
        for v in [self.x, self.y, self.z, self.range, self.velocity] {
            b.extend_from_slice(&v.to_le_bytes());
        }
        b.extend_from_slice(&self.doppler_bin.to_le_bytes());
        for v in [self.bearing, self.intensity, self.intensity_snr_noise, self.noise] {
            b.extend_from_slice(&v.to_le_bytes());
        }
        put_str(&mut b, &self.time_human);
        b
    }
}

fn put_str(b: &mut Vec<u8>, s: &str) {
    b.extend_from_slice(&(s.len() as u32).to_le_bytes());
    b.extend_from_slice(s.as_bytes());
}

/// Preview that records what it was shown and presses the quit key after a
/// fixed number of frames.
pub struct ScriptedPreview {
    pub quit_after: usize,
    pub quit_key: char,
    pub shown: Vec<(String, image::RgbImage)>,
    pub closed: bool,
}

impl ScriptedPreview {
    pub fn quit_after(quit_after: usize) -> Self {
        Self {
            quit_after,
            quit_key: 'q',
            shown: Vec::new(),
            closed: false,
        }
    }
}

impl sensorgrab::capture::Preview for ScriptedPreview {
    fn show(&mut self, window: &str, image: &image::RgbImage) -> anyhow::Result<()> {
        self.shown.push((window.to_string(), image.clone()));
        Ok(())
    }

    fn poll_key(&mut self, _timeout: std::time::Duration) -> Option<char> {
        (self.shown.len() >= self.quit_after).then_some(self.quit_key)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

pub fn jpeg_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "jpg"))
        .count()
}
