#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use anyhow::{anyhow, Context};
use core_sim::{load_simulation_config_from_env, start_server, ServerHandle};
use sim_runtime::ControlState;
use tokio::sync::watch;

static INIT: Once = Once::new();

pub const WAIT: Duration = Duration::from_secs(5);

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_simulation_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test simulation config at {}",
            config_path.display()
        );

        std::env::set_var("SIM_CONFIG_PATH", &config_path);
    });
}

/// Start a server on an ephemeral loopback port.
pub async fn spawn_server() -> anyhow::Result<ServerHandle> {
    ensure_test_config();
    let config = load_simulation_config_from_env();
    anyhow::ensure!(config.bind.port() == 0, "test config was not loaded");
    Ok(start_server(config).await?)
}

pub async fn within<T>(what: &str, future: impl Future<Output = T>) -> anyhow::Result<T> {
    tokio::time::timeout(WAIT, future)
        .await
        .map_err(|_| anyhow!("timed out waiting for {what}"))
}

/// Wait until the published control state satisfies `accept`.
pub async fn wait_for_state(
    control: &mut watch::Receiver<ControlState>,
    what: &str,
    accept: impl Fn(&ControlState) -> bool,
) -> anyhow::Result<ControlState> {
    within(what, async {
        loop {
            let state = *control.borrow_and_update();
            if accept(&state) {
                return Ok::<_, anyhow::Error>(state);
            }
            control
                .changed()
                .await
                .context("viewer session dropped its state channel")?;
        }
    })
    .await?
}
