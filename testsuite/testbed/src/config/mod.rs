// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

mod bench;
mod error;
mod node;
mod persistable_config;
mod settings;

pub use bench::*;
pub use error::*;
pub use node::*;
pub use persistable_config::*;
pub use settings::*;
