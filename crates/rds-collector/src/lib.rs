// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod basic;
pub mod catalog;
pub mod client;
pub mod cloudwatch;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod enhanced;
pub mod errors;
pub mod exporter;
pub mod fanout;
pub mod logs;
pub mod payload;
pub mod registry;
pub mod sample;
pub mod server;
pub mod session;
pub mod settings;
pub mod signing;
pub mod stats;
