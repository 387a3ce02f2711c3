// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Collects Prometheus metrics from every authority of a running testbed and
//! reduces each requested family to a single scalar per authority.

mod collector;
mod error;
mod family;
mod table;
mod thresholds;

pub use collector::*;
pub use error::*;
pub use family::*;
pub use table::*;
pub use thresholds::*;
