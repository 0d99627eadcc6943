// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level pieces of the Max CLI, kept separate from `main` for
//! testability.

pub mod commands;
