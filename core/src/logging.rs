// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! # Logging
//!
//! Genkit logs through the `log` facade. Applications may install any logger;
//! [`init`] installs a small stderr logger whose level can be changed at
//! runtime with [`set_log_level`].

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use once_cell::sync::Lazy;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

pub use log::{debug, error, info, trace, warn};

static LOG_LEVEL: Lazy<Mutex<LevelFilter>> = Lazy::new(|| Mutex::new(LevelFilter::Info));

fn current_level() -> LevelFilter {
    *LOG_LEVEL.lock().unwrap_or_else(PoisonError::into_inner)
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= current_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Installs the stderr logger. Fails if another logger is already installed.
pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Trace))
}

pub fn set_log_level(level: LevelFilter) {
    *LOG_LEVEL.lock().unwrap_or_else(PoisonError::into_inner) = level;
}

/// Logs `msg` with a JSON payload at info level.
pub fn log_structured(msg: &str, metadata: serde_json::Value) {
    info!("{}: {}", msg, metadata);
}

pub fn log_structured_error(msg: &str, metadata: serde_json::Value) {
    error!("{}: {}", msg, metadata);
}
