// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for operations on storage entities.

pub mod contacts;
pub mod deliveries;
pub mod scheduled;
pub mod templates;
