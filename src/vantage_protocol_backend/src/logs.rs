use candid::CandidType;
use ic_canister_log::{declare_log_buffer, export, GlobalBuffer, Sink};
use serde::Deserialize;

// High-priority messages.
declare_log_buffer!(name = INFO_BUF, capacity = 1000);

// Low-priority info messages.
declare_log_buffer!(name = DEBUG_BUF, capacity = 1000);

// Price-feed interactions.
declare_log_buffer!(name = TRACE_ORACLE_BUF, capacity = 1000);

pub const INFO: PrintProxySink = PrintProxySink("INFO", &INFO_BUF);
pub const DEBUG: PrintProxySink = PrintProxySink("DEBUG", &DEBUG_BUF);
pub const TRACE_ORACLE: PrintProxySink = PrintProxySink("TRACE_ORACLE", &TRACE_ORACLE_BUF);

pub struct PrintProxySink(&'static str, &'static GlobalBuffer);

impl Sink for PrintProxySink {
    fn append(&self, entry: ic_canister_log::LogEntry) {
        ic_cdk::println!("{} {}:{} {}", self.0, entry.file, entry.line, entry.message);
        self.1.append(entry)
    }
}

#[derive(CandidType, Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Priority {
    Info,
    Debug,
    TraceOracle,
}

#[derive(CandidType, Clone, Debug, Deserialize)]
pub struct LogRecord {
    pub timestamp: u64,
    pub priority: Priority,
    pub file: String,
    pub line: u32,
    pub message: String,
}

/// Drains the selected buffers into a timestamp-ordered record list.
pub fn collect_logs(priority: Option<Priority>) -> Vec<LogRecord> {
    let mut records: Vec<LogRecord> = Vec::new();
    let mut push = |priority: Priority, buf: &'static GlobalBuffer| {
        for entry in export(buf) {
            records.push(LogRecord {
                timestamp: entry.timestamp,
                priority,
                file: entry.file.to_string(),
                line: entry.line,
                message: entry.message,
            });
        }
    };
    match priority {
        Some(Priority::Info) => push(Priority::Info, &INFO_BUF),
        Some(Priority::Debug) => push(Priority::Debug, &DEBUG_BUF),
        Some(Priority::TraceOracle) => push(Priority::TraceOracle, &TRACE_ORACLE_BUF),
        None => {
            push(Priority::Info, &INFO_BUF);
            push(Priority::Debug, &DEBUG_BUF);
            push(Priority::TraceOracle, &TRACE_ORACLE_BUF);
        }
    }
    records.sort_by_key(|r| r.timestamp);
    records
}
