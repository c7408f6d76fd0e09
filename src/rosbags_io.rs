use anyhow::{Context, Result};
use prettytable::{Table, row};
use rosbag::{ChunkRecord, MessageRecord, RosBag};
use serde::Serialize;
use std::collections::BTreeMap;

/// A connection record: which topic and type a `conn_id` refers to.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u32,
    pub topic: String,
    pub tp: String,
    /// Full `.msg` text, dependent types included
    pub definition: String,
}

pub fn open_bag(path: &str) -> Result<RosBag> {
    RosBag::new(path).with_context(|| format!("failed to open bag: {}", path))
}

/// Collect every connection record found inside the chunks.
///
/// Chunks are streamed one at a time; compressed chunks are decompressed on
/// demand and dropped before the next one is read.
pub fn collect_connections(bag: &RosBag) -> Result<BTreeMap<u32, ConnectionInfo>> {
    let mut connections = BTreeMap::new();
    for record in bag.chunk_records() {
        let record = record?;
        if let ChunkRecord::Chunk(chunk) = record {
            for msg in chunk.messages() {
                let msg = msg?;
                if let MessageRecord::Connection(conn) = msg {
                    connections.insert(
                        conn.id,
                        ConnectionInfo {
                            id: conn.id,
                            topic: conn.topic.to_string(),
                            tp: conn.tp.to_string(),
                            definition: conn.message_definition.to_string(),
                        },
                    );
                }
            }
        }
    }
    Ok(connections)
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    pub topic: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub count: u64,
    /// Seconds from bag start
    pub first: f64,
    pub last: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BagSummary {
    pub path: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub total_messages: u64,
    pub topics: Vec<TopicStats>,
}

/// Gather per-topic counts and time spans, relative to the first message.
pub fn summarize_bag(path: &str) -> Result<BagSummary> {
    let bag = open_bag(path)?;
    let connections = collect_connections(&bag)?;

    let mut stats: BTreeMap<String, TopicStats> = BTreeMap::new();
    let mut bag_start_ns = u64::MAX;
    let mut total: u64 = 0;

    for record in bag.chunk_records() {
        let record = record?;
        if let ChunkRecord::Chunk(chunk) = record {
            for msg in chunk.messages() {
                let msg = msg?;
                if let MessageRecord::MessageData(msg_data) = msg
                    && let Some(conn) = connections.get(&msg_data.conn_id)
                {
                    bag_start_ns = bag_start_ns.min(msg_data.time);
                    let ts = msg_data.time as f64 / 1_000_000_000.0;
                    let entry = stats.entry(conn.topic.clone()).or_insert_with(|| TopicStats {
                        topic: conn.topic.clone(),
                        ty: conn.tp.clone(),
                        count: 0,
                        first: ts,
                        last: ts,
                    });
                    entry.count += 1;
                    entry.first = entry.first.min(ts);
                    entry.last = entry.last.max(ts);
                    total += 1;
                }
            }
        }
    }

    let mut topics: Vec<TopicStats> = stats.into_values().collect();
    let (mut start, mut end) = (0.0_f64, 0.0_f64);
    if total > 0 {
        let bag_start_s = bag_start_ns as f64 / 1_000_000_000.0;
        start = f64::INFINITY;
        end = f64::NEG_INFINITY;
        for t in topics.iter_mut() {
            t.first -= bag_start_s;
            t.last -= bag_start_s;
            start = start.min(t.first);
            end = end.max(t.last);
        }
    }

    Ok(BagSummary {
        path: path.to_string(),
        start,
        end,
        duration: end - start,
        total_messages: total,
        topics,
    })
}

pub fn inspect_bag(path: &str, json: bool) -> Result<()> {
    let summary = summarize_bag(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Bag: {}", summary.path);
    println!(
        "Start (s): {:.6}, End (s): {:.6}, Duration (s): {:.6}, Total messages: {}\n",
        summary.start, summary.end, summary.duration, summary.total_messages
    );

    let mut table = Table::new();
    table.set_titles(row!["Topic", "Type", "Count", "Start(s)", "End(s)"]);
    for t in &summary.topics {
        table.add_row(row![
            t.topic,
            t.ty,
            r->t.count,
            r->format!("{:.6}", t.first),
            r->format!("{:.6}", t.last)
        ]);
    }
    table.printstd();

    Ok(())
}
