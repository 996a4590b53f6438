//! Per-test progress logging on stderr.
//!
//! `TEST_LOG_LEVEL=debug` shows phase changes; `TEST_LOG_JSON=1` switches to
//! one JSON object per line.
#![allow(dead_code)]

use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Debug,
    Info,
}

impl Severity {
    const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
        }
    }
}

struct Output {
    verbose: bool,
    json: bool,
}

fn output() -> &'static Output {
    static OUTPUT: OnceLock<Output> = OnceLock::new();
    OUTPUT.get_or_init(|| Output {
        verbose: std::env::var("TEST_LOG_LEVEL")
            .is_ok_and(|v| matches!(v.to_lowercase().as_str(), "trace" | "debug")),
        json: std::env::var("TEST_LOG_JSON")
            .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

/// Tracks a test's name, current phase and elapsed time.
pub struct TestLogger {
    name: String,
    started: Instant,
    phase: Mutex<&'static str>,
}

impl TestLogger {
    #[must_use]
    pub fn new(name: &str) -> Self {
        let logger = Self {
            name: name.to_string(),
            started: Instant::now(),
            phase: Mutex::new("setup"),
        };
        logger.emit(Severity::Info, "started", None);
        logger
    }

    pub fn phase(&self, phase: &'static str) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        self.emit(Severity::Debug, &format!("phase {phase}"), None);
    }

    pub fn debug(&self, message: &str) {
        self.emit(Severity::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.emit(Severity::Info, message, None);
    }

    pub fn finish_ok(&self) {
        let elapsed = self.elapsed_ms();
        self.emit(Severity::Info, &format!("passed in {elapsed}ms"), Some(elapsed));
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn emit(&self, severity: Severity, message: &str, elapsed_ms: Option<u64>) {
        let out = output();
        if severity == Severity::Debug && !out.verbose {
            return;
        }
        let phase = *self.phase.lock().unwrap_or_else(PoisonError::into_inner);

        if out.json {
            let line = json!({
                "ts": Utc::now().to_rfc3339(),
                "level": severity.label(),
                "test": self.name,
                "phase": phase,
                "message": message,
                "elapsedMs": elapsed_ms,
            });
            eprintln!("{line}");
        } else {
            eprintln!(
                "[{}] {:<5} {} ({phase}): {message}",
                Utc::now().format("%H:%M:%S%.3f"),
                severity.label(),
                self.name
            );
        }
    }
}
