/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time-slotted radio operation scheduler.
//!
//! Upper layers allocate Transmit / Receive / Energy-scan records, position
//! them on the radio's frame timeline and insert them; a single worker hands
//! them to the radio ahead of time and routes completions back.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/         – YAML scheduler configuration
//! ├── time/           – frame geometry and radio clocks
//! ├── record.rs       – operation records, priorities, callbacks
//! ├── radio/          – radio control interface + loopback radio
//! └── scheduler/      – pending queue, in-flight table, dispatch worker
//! ```

pub mod config;
pub mod radio;
pub mod record;
pub mod scheduler;
pub mod time;
