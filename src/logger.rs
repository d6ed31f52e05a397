/*
 * This file is part of hw-tagger.
 *
 * Copyright (C) 2026 hw-tagger contributors
 *
 * hw-tagger is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * hw-tagger is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with hw-tagger. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fmt;
use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stdout,
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Journald => write!(f, "systemd journal"),
            Self::Stdout => write!(f, "stdout"),
        }
    }
}

/// Install the global subscriber
///
/// Logs go to the systemd journal when its socket exists, to stdout
/// otherwise. `log_level` is an `EnvFilter` directive such as `info` or
/// `ht_core=debug,info`.
pub fn init_logging(log_level: &str) -> LogTarget {
    let filter = || EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(filter())
                    .init();
                return LogTarget::Journald;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter())
        .init();
    LogTarget::Stdout
}
