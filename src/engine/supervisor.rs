//! Engine process lifecycle.
//!
//! The supervisor owns the child process. Each loop iteration is one
//! generation: spawn, attach the pipe, mark ready, bulk load, wait for exit,
//! mark down, back off, repeat. It returns only when shutdown is signalled.
//!
//! Readiness goes up as soon as the pipe is attached, before the bulk load
//! finishes. Queries that arrive during the load see a partially populated
//! engine and get `not_found` for regions not loaded yet. Availability is
//! preferred over completeness here.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::EngineContext;
use super::state::Readiness;
use crate::config::EngineConfig;
use crate::consts::{SHUTDOWN_GRACE, format_millis};
use crate::loader::{self, IndicatorSource};

/// How one generation ended.
#[derive(Debug)]
enum GenerationEnd {
    Exited(ExitStatus),
    Shutdown,
}

pub struct Supervisor {
    ctx: Arc<EngineContext>,
    config: EngineConfig,
    source: Arc<dyn IndicatorSource>,
}

impl Supervisor {
    pub fn new(
        ctx: Arc<EngineContext>,
        config: EngineConfig,
        source: Arc<dyn IndicatorSource>,
    ) -> Self {
        Self {
            ctx,
            config,
            source,
        }
    }

    /// Keep an engine running until `shutdown` flips to true (or its sender
    /// is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let delay = self.config.restart_delay();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let generation = self.ctx.state.next_generation();
            match self.run_generation(generation, &mut shutdown).await {
                Ok(GenerationEnd::Shutdown) => break,
                Ok(GenerationEnd::Exited(status)) => {
                    warn!(generation, %status, "engine exited");
                }
                Err(e) => {
                    self.ctx.state.set_readiness(Readiness::Down);
                    error!(generation, "engine generation failed: {:#}", e);
                }
            }

            info!("restarting engine in {}", format_millis(delay));
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.ctx.state.set_readiness(Readiness::Down);
        info!("engine supervisor stopped");
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.config.program)
            .args(self.config.args.iter().filter(|a| !a.is_empty()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    async fn run_generation(
        &self,
        generation: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<GenerationEnd> {
        let mut child = self
            .spawn()
            .with_context(|| format!("failed to start engine {}", self.config.program.display()))?;

        let stdin = child.stdin.take().context("engine stdin was not captured")?;
        let stdout = child.stdout.take().context("engine stdout was not captured")?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(generation, stderr));
        }

        self.ctx.pipe.attach(generation, stdin, stdout).await;
        self.ctx.state.set_readiness(Readiness::Ready);
        info!(generation, pid = child.id(), "engine started");

        let mut wedged = self.ctx.pipe.subscribe_wedged();

        let end = {
            // Dropped at the end of this block so an unfinished load releases
            // the pipe lock before the pipe is detached below.
            let load = loader::load_all(self.source.as_ref(), &self.ctx.pipe, generation);
            tokio::pin!(load);
            let mut loading = true;

            loop {
                tokio::select! {
                    status = child.wait() => {
                        break status
                            .map(GenerationEnd::Exited)
                            .context("failed to wait on engine");
                    }
                    result = &mut load, if loading => {
                        loading = false;
                        match result {
                            Ok(report) => info!(
                                generation,
                                source = self.source.name(),
                                loaded = report.loaded,
                                skipped = report.skipped,
                                failed = report.failed,
                                "bulk load complete"
                            ),
                            Err(e) => warn!(
                                generation,
                                source = self.source.name(),
                                skipped = e.report.skipped,
                                "{}; engine keeps the partial load", e
                            ),
                        }
                    }
                    Ok(()) = wedged.changed() => {
                        if *wedged.borrow_and_update() == generation {
                            warn!(generation, "engine stopped answering, killing it");
                            if let Err(e) = child.start_kill() {
                                warn!(generation, "failed to kill engine: {}", e);
                            }
                        }
                    }
                    _ = shutdown.changed() => break Ok(GenerationEnd::Shutdown),
                }
            }
        };

        // No command may go to this generation from here on.
        self.ctx.state.set_readiness(Readiness::Down);

        if let Ok(GenerationEnd::Shutdown) = end {
            self.stop(generation, &mut child).await;
        }
        self.ctx.pipe.detach(generation).await;

        end
    }

    /// Ask the engine to exit, then kill it if it does not within the grace period.
    async fn stop(&self, generation: u64, child: &mut Child) {
        if let Err(e) = self.ctx.pipe.shutdown(generation).await {
            debug!(generation, "could not send shutdown command: {}", e);
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => info!(generation, %status, "engine shut down"),
            Ok(Err(e)) => warn!(generation, "failed to wait on engine: {}", e),
            Err(_) => {
                warn!(generation, "engine ignored shutdown command, killing it");
                if let Err(e) = child.kill().await {
                    warn!(generation, "failed to kill engine: {}", e);
                }
            }
        }
    }
}

/// Forward the engine's diagnostics into our log.
async fn drain_stderr(generation: u64, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(generation, "engine: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(generation, "engine stderr closed: {}", e);
                break;
            }
        }
    }
}
