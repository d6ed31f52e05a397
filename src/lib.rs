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

//! hw-tagger - device identifier labels for Kubernetes nodes
//!
//! Process bootstrap around the `ht-*` crates: command line, scope
//! configuration, logging and the one-shot scan.

pub mod cli;
pub mod config;
pub mod logger;
pub mod scan;
