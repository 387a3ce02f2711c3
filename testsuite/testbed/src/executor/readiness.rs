// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use futures::future::join_all;
use std::time::Duration;
use tokio::{
    net::TcpStream,
    time::{Instant, sleep, timeout},
};
use tracing::{debug, warn};

/// Polls `host:port` until it accepts a TCP connection or `deadline` has
/// elapsed. Returns whether the port came up.
pub async fn wait_for_port(host: &str, port: u16, deadline: Duration, interval: Duration) -> bool {
    let start = Instant::now();
    loop {
        if let Ok(Ok(_)) = timeout(interval, TcpStream::connect((host, port))).await {
            debug!("{}:{} is accepting connections", host, port);
            return true;
        }
        if start.elapsed() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}

/// Waits for every target concurrently. Targets that never come up are
/// logged and returned; the caller carries on regardless.
pub async fn wait_for_all(
    targets: &[(String, u16)],
    deadline: Duration,
    interval: Duration,
) -> Vec<(String, u16)> {
    let waits = targets.iter().map(|(host, port)| async move {
        (host, *port, wait_for_port(host, *port, deadline, interval).await)
    });
    join_all(waits)
        .await
        .into_iter()
        .filter(|(_, _, ready)| !ready)
        .map(|(host, port, _)| {
            warn!("{}:{} not ready after {:?}", host, port, deadline);
            (host.clone(), port)
        })
        .collect()
}
