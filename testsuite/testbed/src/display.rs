// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Operator-facing output. Diagnostics go through `tracing`; these helpers
//! print the phase headings and outcomes a person running a benchmark reads.

use crate::BenchError;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;

pub fn heading(message: &str) {
    println!("{}", message.bold().green());
}

pub fn info(message: &str) {
    println!("{}", message);
}

pub fn warn(message: &str) {
    println!("{} {}", "WARN:".bold().yellow(), message);
}

/// Prints the error followed by its chain of causes.
pub fn error(error: &BenchError) {
    println!("\n{} {}", "ERROR:".bold().red(), error);
    let mut source = error.source();
    let mut depth = 1;
    while let Some(cause) = source {
        println!("{}{} {}", "  ".repeat(depth), "Caused by:".red(), cause);
        source = cause.source();
        depth += 1;
    }
}

pub fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(ProgressStyle::default_bar().template(&format!(
        "{} [{{elapsed_precise}}] {{bar:60.cyan/blue}} {{pos}}/{{len}}",
        prefix
    )));
    bar
}
