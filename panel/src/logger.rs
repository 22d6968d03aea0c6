use std::{any::Any, fs::{File, OpenOptions}, io::Write, path::Path, sync::Mutex};
use can_core::{utils::{format_time_of_day, hex_spaced, system_timestamp}, CanFrame, EventDirection, Listener};

/// Frame log line: `DIR HH:MM:SS.mmm 0xID DLC DATA`.
pub fn format_frame_line(direction: EventDirection, frame: &CanFrame) -> String {
    format!(
        "{} {} 0x{:08X} {} {}",
        direction,
        format_time_of_day(frame.timestamp()),
        frame.id(),
        frame.length(),
        hex_spaced(frame.data()),
    )
}

/// Text log line, with `-` in the id and length columns.
pub fn format_text_line(direction: EventDirection, timestamp: u64, message: &str) -> String {
    format!("{} {} - - {}", direction, format_time_of_day(timestamp), message)
}

/// Writes every session event as one log line, to the `log` facade and
/// optionally appended to a file.
#[derive(Default)]
pub struct LogSink {
    file: Option<Mutex<File>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        Ok(Self { file: Some(Mutex::new(file)) })
    }

    fn write_line(&self, line: &str) {
        log::info!(target: "canpanel::frames", "{}", line);
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = writeln!(file, "{}", line) {
                log::warn!("CAN-PANEL - unable to append frame log: {}", e);
            }
        }
    }
}

impl Listener for LogSink {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_status_changed(&self, up: bool) {
        let status = if up { "Connected" } else { "Disconnected" };
        self.write_line(&format_text_line(EventDirection::Sys, system_timestamp(), &format!("CAN status: {}", status)));
    }

    fn on_frame_transmitted(&self, frame: &CanFrame) {
        self.write_line(&format_frame_line(EventDirection::Tx, frame));
    }

    fn on_frame_received(&self, frame: &CanFrame) {
        self.write_line(&format_frame_line(EventDirection::Rx, frame));
    }

    fn on_text_event(&self, direction: EventDirection, message: &str) {
        self.write_line(&format_text_line(direction, system_timestamp(), message));
    }
}
