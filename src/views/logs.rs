//! Per-player excerpts from the server logs.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::events::{Event, Subscriber};
use crate::model::LogFile;

use super::Latest;

pub struct PlayerLogs {
    logs: Latest<[LogFile]>,
}

impl Default for PlayerLogs {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerLogs {
    pub fn new() -> Self {
        Self {
            logs: Latest::empty(),
        }
    }

    pub fn update(&self, logs: Arc<[LogFile]>) {
        self.logs.set(logs);
    }

    /// Log files mentioning `name`, each with only the matching lines.
    pub fn mentions(&self, name: &str) -> Vec<LogFile> {
        self.logs
            .get()
            .iter()
            .filter_map(|log| {
                let lines: Vec<String> = log
                    .lines
                    .iter()
                    .filter(|line| line.contains(name))
                    .cloned()
                    .collect();
                (!lines.is_empty()).then(|| LogFile {
                    lines,
                    ..log.clone()
                })
            })
            .collect()
    }

    /// Plain-text report of every line mentioning `name`, grouped by file.
    pub fn report(&self, name: &str) -> String {
        let banner = format!("{}\n", "#".repeat(15));
        let mut out = String::new();
        for log in self.mentions(name) {
            out.push('\n');
            out.push_str(&banner);
            out.push_str(&banner);
            let _ = writeln!(out, "#{} Log: {} | {}", log.index, log.name, log.date);
            out.push_str(&banner);
            out.push_str(&banner);
            out.push('\n');
            for line in &log.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

impl Subscriber for PlayerLogs {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn handle(&self, event: &Event) {
        if let Event::LogsRead(logs) = event {
            self.update(Arc::clone(logs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(index: u32, name: &str, lines: &[&str]) -> LogFile {
        LogFile {
            index,
            name: name.to_string(),
            date: "2025-06-15".to_string(),
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    fn view() -> PlayerLogs {
        let view = PlayerLogs::new();
        view.update(Arc::from(vec![
            log(1, "2025-06-15-1.log.gz", &["Luffy joined the game", "Zoro joined the game"]),
            log(2, "2025-06-15-2.log.gz", &["Nami left the game"]),
        ]));
        view
    }

    #[test]
    fn mentions_keep_only_matching_lines() {
        let found = view().mentions("Luffy");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].lines, ["Luffy joined the game"]);
        assert_eq!(found[0].index, 1);
    }

    #[test]
    fn report_groups_by_file() {
        let report = view().report("Nami");

        assert!(report.contains("#2 Log: 2025-06-15-2.log.gz | 2025-06-15"));
        assert!(report.contains("Nami left the game\n"));
        assert!(!report.contains("Luffy"));
        assert!(view().report("Robin").is_empty());
    }
}
