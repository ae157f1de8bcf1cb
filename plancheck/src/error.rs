// Plancheck: Metamorphic Testing of Action Policies for Classical Planning
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing all error types

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// The time or memory budget of a component is exhausted. This error is raised cooperatively
    /// at suspension points and is caught only by the engine; partial progress is kept.
    #[error("Out of time or memory")]
    OutOfResource,
    /// The chosen set of options is missing something or inconsistent. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A task, pool, bug or simulation file could not be parsed.
    #[error("Input error: {0}")]
    InputFormat(String),
    /// Communication with a remote policy server failed.
    #[error("Remote policy error: {0}")]
    PolicyTransport(String),
    /// The requested combination of components is not implemented.
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// Underlying I/O error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process exit codes, compatible across all engines.
pub mod exit_code {
    /// Successful run
    pub const SUCCESS: i32 = 0;
    /// The run ended without completing its budgeted work
    pub const UNSOLVED_INCOMPLETE: i32 = 12;
    /// An input file could not be parsed
    pub const INPUT_ERROR: i32 = 31;
    /// Inconsistent options or an internal error
    pub const CRITICAL_ERROR: i32 = 32;
    /// An unimplemented combination of components was requested
    pub const UNSUPPORTED: i32 = 34;
    /// Communication with a remote policy failed
    pub const REMOTE_POLICY_ERROR: i32 = 36;
    /// Memory was exhausted outside of a recoverable section
    pub const OUT_OF_MEMORY: i32 = 22;
}

impl Error {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::OutOfResource => exit_code::OUT_OF_MEMORY,
            Error::Configuration(_) => exit_code::CRITICAL_ERROR,
            Error::InputFormat(_) => exit_code::INPUT_ERROR,
            Error::PolicyTransport(_) => exit_code::REMOTE_POLICY_ERROR,
            Error::Unsupported(_) => exit_code::UNSUPPORTED,
            Error::Io(_) => exit_code::INPUT_ERROR,
        }
    }
}
