use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use cobslink_channel::StatsSnapshot;
use cobslink_frame::command::{ANALOG, KEYPAD, STATISTICS, TASK_STATUS};
use cobslink_frame::{
    command_name, AnalogReading, KeyEvent, Message, StatisticsEntry, TaskStatus,
};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    id: u16,
    command: u8,
    command_name: &'a str,
    length: u8,
    checksum: u8,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    timestamp: String,
}

pub fn print_message(message: &Message, format: OutputFormat) {
    let payload = hex::encode(message.payload());
    let detail = describe_payload(message);

    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                id: message.id(),
                command: message.command(),
                command_name: command_name(message.command()),
                length: message.length(),
                checksum: message.checksum(),
                payload,
                detail,
                timestamp: now_unix_millis(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "COMMAND", "LEN", "PAYLOAD", "DETAIL"])
                .add_row(vec![
                    message.id().to_string(),
                    format!(
                        "{} ({})",
                        command_name(message.command()),
                        message.command()
                    ),
                    message.length().to_string(),
                    payload,
                    detail.unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!(
                "id={} command={} ({}) len={} payload={}",
                message.id(),
                message.command(),
                command_name(message.command()),
                message.length(),
                if payload.is_empty() { "-" } else { payload.as_str() }
            );
            if let Some(detail) = detail {
                line.push_str("  ");
                line.push_str(&detail);
            }
            println!("{line}");
        }
        OutputFormat::Raw => {
            print_raw(message.payload());
        }
    }
}

#[derive(Serialize)]
pub struct EchoReport {
    pub id: u16,
    pub sent: String,
    pub received: String,
    pub matched: bool,
    pub latency_us: u128,
}

pub fn print_echo(report: &EchoReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "SENT", "RECEIVED", "MATCHED", "LATENCY"])
                .add_row(vec![
                    report.id.to_string(),
                    report.sent.clone(),
                    report.received.clone(),
                    report.matched.to_string(),
                    format!("{}us", report.latency_us),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "echo id={} {} in {}us",
                report.id,
                if report.matched { "matched" } else { "MISMATCHED" },
                report.latency_us
            );
        }
    }
}

pub fn print_stats(link: &str, stats: &StatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct StatsOutput<'a> {
                link: &'a str,
                #[serde(flatten)]
                stats: &'a StatsSnapshot,
            }
            print_json(&StatsOutput { link, stats });
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in stats_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            let rendered: Vec<String> = stats_rows(stats)
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{link}: {}", rendered.join(" "));
        }
    }
}

fn stats_rows(stats: &StatsSnapshot) -> [(&'static str, u64); 11] {
    [
        ("bytes_sent", stats.bytes_sent),
        ("bytes_received", stats.bytes_received),
        ("frames_dispatched", stats.frames_dispatched),
        ("frames_unhandled", stats.frames_unhandled),
        ("checksum_errors", stats.checksum_errors),
        ("corrupt_frames", stats.corrupt_frames),
        ("truncated_messages", stats.truncated_messages),
        ("buffer_overflows", stats.buffer_overflows),
        ("oversized_payloads", stats.oversized_payloads),
        ("flow_pauses", stats.flow_pauses),
        ("flow_resumes", stats.flow_resumes),
    ]
}

/// Human readable decoding for the commands whose payload layout is known.
pub fn describe_payload(message: &Message) -> Option<String> {
    match message.command() {
        KEYPAD => KeyEvent::from_payload(message.payload()).map(|event| {
            format!(
                "key col={} row={} {}",
                event.column,
                event.row,
                if event.pressed { "pressed" } else { "released" }
            )
        }),
        ANALOG => AnalogReading::from_payload(message.payload())
            .map(|reading| format!("analog ch={} value={}", reading.channel, reading.value)),
        STATISTICS => StatisticsEntry::from_payload(message.payload())
            .map(|entry| format!("stat[{}]={}", entry.index, entry.value)),
        TASK_STATUS => TaskStatus::from_payload(message.payload()).map(|task| {
            format!(
                "task[{}] abs={}us pct={} watermark={}",
                task.index, task.absolute_time_us, task.percent_time, task.high_watermark
            )
        }),
        _ => None,
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
