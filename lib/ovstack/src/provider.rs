// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Providers allow the stack to run in different contexts by letting
//! implementations of core services be plugged into a namespace. At
//! the moment that is only logging: a test wants `println!`, a daemon
//! wants a structured logger. If something doesn't have at least two
//! obvious implementations, it probably doesn't need to be a provider.

use alloc::boxed::Box;
use core::fmt;
use core::fmt::Display;

/// The set of all providers required by a namespace.
pub struct Providers {
    pub log: Box<dyn LogProvider>,
}

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the stack is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

cfg_if! {
    if #[cfg(feature = "userland")] {
        use slog::Drain;
        use slog::Logger;

        /// Forward to an `slog` logger.
        pub struct SlogLog {
            log: Logger,
        }

        impl SlogLog {
            pub fn new(log: Logger) -> Self {
                Self { log }
            }
        }

        impl LogProvider for SlogLog {
            fn log(&self, level: LogLevel, msg: &str) {
                match level {
                    LogLevel::Note => slog::info!(self.log, "{}", msg),
                    LogLevel::Warn => slog::warn!(self.log, "{}", msg),
                    LogLevel::Error => slog::error!(self.log, "{}", msg),
                }
            }
        }

        /// Build the standard terminal logger, filtered by `RUST_LOG`.
        pub fn default_slog() -> Logger {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog_envlogger::new(drain).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, slog::o!("component" => "ovstack"))
        }
    }
}
