// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the single writer connection.

pub mod commands;
pub mod devices;
