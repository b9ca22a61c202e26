use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::ApprovalQueue;
use crate::console::Notice;
use crate::error::RemediationError;
use crate::probe::dashboard::Gauges;
use crate::probe::history::MetricHistory;
use crate::probe::ProbeReport;
use crate::sandbox::SandboxExecutor;
use crate::supervisor::{ControlCommand, ControlHandle, Feature};

/// Queue length from which the operator is warned about a backlog.
const BACKLOG_WARN: usize = 50;

/// Control handles of the periodic units.
#[derive(Clone)]
pub struct Controls {
    pub architecture: ControlHandle,
    pub dashboard: ControlHandle,
}

impl Controls {
    fn get(&self, feature: Feature) -> &ControlHandle {
        match feature {
            Feature::Architecture => &self.architecture,
            Feature::Dashboard => &self.dashboard,
        }
    }
}

/// Owns the approval queue and the operator surface.
///
/// Receives probe reports, queues their actions, and answers console
/// commands. Confirmed actions run on the blocking pool; the runtime
/// waits for them, so one action executes at a time.
pub struct ApprovalRuntime {
    queue: ApprovalQueue,
    executor: Arc<SandboxExecutor>,
    controls: Controls,
    gauges: watch::Receiver<Gauges>,
    history: MetricHistory,
    adhoc_timeout: Duration,
    start_time: std::time::Instant,
}

impl ApprovalRuntime {
    pub fn new(
        executor: Arc<SandboxExecutor>,
        controls: Controls,
        gauges: watch::Receiver<Gauges>,
        adhoc_timeout: Duration,
    ) -> Self {
        Self {
            queue: ApprovalQueue::new(),
            executor,
            controls,
            gauges,
            history: MetricHistory::default(),
            adhoc_timeout,
            start_time: std::time::Instant::now(),
        }
    }

    /// Main loop. Returns when the operator input closes.
    pub async fn run(
        &mut self,
        mut reports: mpsc::UnboundedReceiver<ProbeReport>,
        mut operator: mpsc::Receiver<String>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Result<()> {
        info!("Approval runtime started, type /help for commands");
        let mut probe_open = true;

        loop {
            tokio::select! {
                report = reports.recv(), if probe_open => match report {
                    Some(report) => {
                        for notice in self.on_report(report) {
                            let _ = notices.send(notice);
                        }
                    }
                    None => {
                        warn!("Probe loop is gone, no more proposals");
                        probe_open = false;
                    }
                },
                line = operator.recv() => match line {
                    Some(line) => {
                        let notice = self.handle_line(&line).await;
                        let _ = notices.send(notice);
                    }
                    None => break,
                },
            }
        }

        info!("Operator input closed, {} action(s) left unapproved", self.queue.len());
        Ok(())
    }

    /// Queues the report's actions and keeps its history snapshot.
    pub fn on_report(&mut self, report: ProbeReport) -> Vec<Notice> {
        self.history = report.history;
        let before = self.queue.len();
        let mut notices = Vec::new();
        for action in report.actions {
            let description = action.description.clone();
            match self.queue.enqueue(action) {
                Ok(id) => {
                    info!("Queued #{id}: {description}");
                    notices.push(Notice::Queued { id, description });
                }
                Err(e) => warn!("Dropped proposal {description}: {e}"),
            }
        }
        if before < BACKLOG_WARN && self.queue.len() >= BACKLOG_WARN {
            warn!(
                "{} actions waiting for approval, /reject them or /disable architecture",
                self.queue.len()
            );
        }
        notices
    }

    // ── Console commands ─────────────────────────────────

    /// Handles one operator line and returns what to show.
    pub async fn handle_line(&mut self, line: &str) -> Notice {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        info!("Console command: {command}");

        let result = match command.as_str() {
            "/list" => Ok(self.cmd_list()),
            "/show" => self.cmd_show(arg),
            "/confirm" => return self.cmd_confirm(arg).await.unwrap_or_else(reply_error),
            "/reject" => self.cmd_reject(arg),
            "/enable" => self.cmd_control(arg, ControlCommand::Enable).await,
            "/disable" => self.cmd_control(arg, ControlCommand::Disable).await,
            "/rearm" => self.cmd_control(arg, ControlCommand::Rearm).await,
            "/status" => self.cmd_status().await,
            "/history" => Ok(self.history.to_string().trim_end().to_string()),
            "/run" => return self.cmd_run(arg).await.unwrap_or_else(reply_error),
            "/help" => Ok(cmd_help()),
            "/ping" => Ok("pong".to_string()),
            _ => Ok(format!(
                "Unknown command: {command}\nType /help for available commands."
            )),
        };
        result.map(Notice::Reply).unwrap_or_else(reply_error)
    }

    fn entry_id(&self, arg: Option<&str>) -> Result<u64> {
        match arg {
            Some(raw) => raw
                .trim_start_matches('#')
                .parse()
                .map_err(|_| anyhow!("Not an entry id: {raw}")),
            None => self
                .queue
                .oldest_id()
                .ok_or_else(|| anyhow!("No pending actions.")),
        }
    }

    /// /list: pending actions, oldest first
    fn cmd_list(&self) -> String {
        if self.queue.is_empty() {
            return "No pending actions.".to_string();
        }
        let mut text = format!("{} pending action(s):", self.queue.len());
        for entry in self.queue.entries() {
            text.push_str(&format!("\n  #{} {}", entry.id, entry.action.description));
        }
        text
    }

    /// /show [id]: description and full script
    fn cmd_show(&self, arg: Option<&str>) -> Result<String> {
        let id = self.entry_id(arg)?;
        let entry = self
            .queue
            .get(id)
            .ok_or(RemediationError::UnknownEntry(id))?;
        Ok(format!(
            "#{} {} [{}]\n{}",
            entry.id,
            entry.action.description,
            entry.action.kind,
            entry.action.source.trim_end()
        ))
    }

    /// /confirm [id]: run the action and report its outcome
    async fn cmd_confirm(&mut self, arg: Option<&str>) -> Result<Notice> {
        let id = self.entry_id(arg)?;
        let entry = self.queue.take(id)?;
        let description = entry.action.description;
        info!("Confirmed #{id}: {description}");

        let executor = self.executor.clone();
        let source = entry.action.source;
        let outcome = tokio::task::spawn_blocking(move || executor.execute(&source))
            .await
            .map_err(|e| anyhow!("Execution task failed: {e}"))?;

        match &outcome {
            Ok(result) if result.succeeded => info!("#{id} succeeded"),
            Ok(result) => warn!("#{id} failed (exit {:?})", result.exit_code),
            Err(e) => error!("#{id} refused: {e}"),
        }
        Ok(Notice::Executed {
            description,
            outcome,
        })
    }

    /// /reject [id]: discard without running
    fn cmd_reject(&mut self, arg: Option<&str>) -> Result<String> {
        let id = self.entry_id(arg)?;
        let action = self.queue.reject(id)?;
        info!("Rejected #{id}: {}", action.description);
        Ok(format!("Rejected #{id}: {}", action.description))
    }

    /// /enable, /disable, /rearm <feature>
    async fn cmd_control(&mut self, arg: Option<&str>, command: ControlCommand) -> Result<String> {
        let feature: Feature = arg
            .ok_or_else(|| anyhow!("Usage: /enable|/disable|/rearm <architecture|dashboard>"))?
            .parse()
            .map_err(|e: String| anyhow!(e))?;
        let status = self.controls.get(feature).request(command).await?;

        // A fresh start of the probe loop drops proposals made before
        if feature == Feature::Architecture && command == ControlCommand::Enable {
            let dropped = self.queue.clear();
            if dropped > 0 {
                info!("Cleared {dropped} pending action(s)");
                return Ok(format!("{status}\nCleared {dropped} pending action(s)"));
            }
        }
        Ok(status.to_string())
    }

    /// /status: features, queue, executor and live gauges
    async fn cmd_status(&self) -> Result<String> {
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;

        let architecture = self.controls.architecture.request(ControlCommand::Status).await?;
        let dashboard = self.controls.dashboard.request(ControlCommand::Status).await?;
        let gauges = *self.gauges.borrow();
        let backlog = if self.queue.len() >= BACKLOG_WARN {
            " (backlog: /reject or /disable architecture)"
        } else {
            ""
        };

        Ok(format!(
            "ara-agent v{} - status\n\
             Uptime: {hours}h {minutes}m\n\
             {architecture}\n\
             {dashboard}\n\
             Pending actions: {}{backlog}\n\
             Scripts run: {} (in {})\n\
             {gauges}",
            env!("CARGO_PKG_VERSION"),
            self.queue.len(),
            self.executor.spawn_count(),
            self.executor.work_dir().display(),
        ))
    }

    /// /run <file>: operator script with a bounded wait
    async fn cmd_run(&self, arg: Option<&str>) -> Result<Notice> {
        let path = arg.ok_or_else(|| anyhow!("Usage: /run <file>"))?;
        let path = shellexpand::tilde(path).into_owned();
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow!("Cannot read {path}: {e}"))?;
        let outcome = self.executor.execute_bounded(&source, self.adhoc_timeout).await;
        Ok(Notice::Executed {
            description: format!("Run {path}"),
            outcome,
        })
    }
}

fn reply_error(e: anyhow::Error) -> Notice {
    Notice::Reply(format!("Error: {e}"))
}

/// /help: list available commands
fn cmd_help() -> String {
    "\
Commands:\n\
  /list               - Pending actions, oldest first\n\
  /show [id]          - Description and script of an action\n\
  /confirm [id]       - Run an action (default: the oldest)\n\
  /reject [id]        - Discard an action (default: the oldest)\n\
  /enable <feature>   - Resume a feature (architecture, dashboard)\n\
  /disable <feature>  - Pause a feature\n\
  /rearm <feature>    - Unlock a feature's control after a fault\n\
  /status             - Features, queue, gauges\n\
  /history            - Recent metric history\n\
  /run <file>         - Run a script file with a time limit\n\
  /ping               - Check if the agent is alive\n\
  /help               - This message"
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use std::path::Path;

    use tokio::time::Instant;

    use super::*;
    use crate::actions::{ActionKind, ActionParams, Synthesizer};
    use crate::config::BreakerPolicy;
    use crate::probe::dashboard::Dashboard;
    use crate::probe::metrics::scripted::ScriptedSource;
    use crate::supervisor::backoff::Backoff;
    use crate::supervisor::{SupervisedTask, Supervisor};

    struct Fixture {
        runtime: ApprovalRuntime,
        synth: Synthesizer,
        _work: tempfile::TempDir,
    }

    fn control(
        feature: Feature,
        breaker: BreakerPolicy,
        source: &ScriptedSource,
        gauges: watch::Sender<Gauges>,
    ) -> ControlHandle {
        let supervisor = Supervisor::new(
            feature,
            Backoff::fixed(Duration::from_secs(60)),
            breaker,
            true,
        );
        let unit = Dashboard::new(Box::new(source.clone()), Instant::now());
        let (notices, _) = mpsc::unbounded_channel();
        let task = SupervisedTask::new(unit, supervisor, Duration::from_secs(3600), gauges, notices);
        task.spawn().0
    }

    fn fixture_with(executor: SandboxExecutor, work: tempfile::TempDir) -> Fixture {
        let source = ScriptedSource::new();
        let (gauges_tx, gauges_rx) = watch::channel(Gauges::default());
        let controls = Controls {
            architecture: control(
                Feature::Architecture,
                BreakerPolicy::OneShot,
                &source,
                watch::channel(Gauges::default()).0,
            ),
            dashboard: control(Feature::Dashboard, BreakerPolicy::ManualRearm, &source, gauges_tx),
        };
        Fixture {
            runtime: ApprovalRuntime::new(
                Arc::new(executor),
                controls,
                gauges_rx,
                Duration::from_secs(2),
            ),
            synth: Synthesizer::default(),
            _work: work,
        }
    }

    fn fixture() -> Fixture {
        let work = tempfile::tempdir().unwrap();
        let executor = SandboxExecutor::new(work.path().join("scripts"), "/bin/sh").unwrap();
        fixture_with(executor, work)
    }

    fn report(actions: Vec<crate::actions::RemediationAction>) -> ProbeReport {
        ProbeReport {
            actions,
            history: MetricHistory::default(),
        }
    }

    fn reply(notice: Notice) -> String {
        match notice {
            Notice::Reply(text) => text,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    fn cleanup(synth: &Synthesizer, dir: &Path) -> crate::actions::RemediationAction {
        synth
            .synthesize(ActionKind::CleanupTemp, ActionParams::new().path("path", dir))
            .unwrap()
    }

    #[tokio::test]
    async fn test_confirm_cleanup_empties_directory() {
        let mut fx = fixture();
        let target = tempfile::tempdir().unwrap();
        for name in ["a.log", "b.tmp", ".hidden"] {
            std::fs::write(target.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(target.path().join("cache")).unwrap();
        std::fs::write(target.path().join("cache/inner"), "x").unwrap();

        let notices = fx.runtime.on_report(report(vec![cleanup(&fx.synth, target.path())]));
        assert_eq!(
            notices,
            vec![Notice::Queued {
                id: 1,
                description: "Cleanup Temp Folder".into()
            }]
        );

        match fx.runtime.handle_line("/confirm").await {
            Notice::Executed {
                description,
                outcome: Ok(result),
            } => {
                assert_eq!(description, "Cleanup Temp Folder");
                assert!(result.succeeded, "output: {}", result.combined_output);
                assert!(result.combined_output.contains("Temp folder cleaned"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(std::fs::read_dir(target.path()).unwrap().count(), 0);
        assert!(fx.runtime.queue.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_kills_only_the_leaking_process() {
        let work = tempfile::tempdir().unwrap();
        let mut leak = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let mut other = std::process::Command::new("sleep").arg("30").spawn().unwrap();

        // Stand-in `ps` reporting both children at 600 MB resident
        let shims = work.path().join("bin");
        std::fs::create_dir(&shims).unwrap();
        let ps = shims.join("ps");
        std::fs::write(
            &ps,
            format!(
                "#!/bin/sh\necho \"{} 614400 leak.exe\"\necho \"{} 614400 other.exe\"\n",
                leak.id(),
                other.id()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&ps, std::fs::Permissions::from_mode(0o755)).unwrap();
        let path = format!("{}:{}", shims.display(), std::env::var("PATH").unwrap_or_default());
        let executor = SandboxExecutor::new(work.path().join("scripts"), "/bin/sh")
            .unwrap()
            .with_env("PATH", path);
        let mut fx = fixture_with(executor, work);

        let action = fx
            .synth
            .synthesize(
                ActionKind::HighMemory,
                ActionParams::new()
                    .text("process", "leak.exe")
                    .number("threshold_mb", 500.0),
            )
            .unwrap();
        fx.runtime.on_report(report(vec![action]));

        match fx.runtime.handle_line("/confirm 1").await {
            Notice::Executed {
                outcome: Ok(result),
                ..
            } => assert!(result.succeeded, "output: {}", result.combined_output),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(leak.wait().unwrap().signal(), Some(9));
        assert!(other.try_wait().unwrap().is_none());
        other.kill().unwrap();
        other.wait().unwrap();
    }

    #[tokio::test]
    async fn test_confirm_kills_the_sampled_cpu_process() {
        let work = tempfile::tempdir().unwrap();
        let mut busy = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let mut recycled = std::process::Command::new("sleep").arg("30").spawn().unwrap();

        // Stand-in `ps -o comm= -p <pid>`: only the busy child still has
        // the sampled name
        let shims = work.path().join("bin");
        std::fs::create_dir(&shims).unwrap();
        let ps = shims.join("ps");
        std::fs::write(
            &ps,
            format!(
                "#!/bin/sh\nif [ \"$4\" = {} ]; then echo busy.exe; else echo other; fi\n",
                busy.id()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&ps, std::fs::Permissions::from_mode(0o755)).unwrap();
        let path = format!("{}:{}", shims.display(), std::env::var("PATH").unwrap_or_default());
        let executor = SandboxExecutor::new(work.path().join("scripts"), "/bin/sh")
            .unwrap()
            .with_env("PATH", path);
        let mut fx = fixture_with(executor, work);

        let kill = |pid: u32| {
            fx.synth
                .synthesize(
                    ActionKind::HighCpu,
                    ActionParams::new()
                        .text("process", "busy.exe")
                        .number("threshold", 80.0)
                        .number("pid", f64::from(pid)),
                )
                .unwrap()
        };
        let actions = vec![kill(busy.id()), kill(recycled.id())];
        fx.runtime.on_report(report(actions));

        match fx.runtime.handle_line("/confirm 1").await {
            Notice::Executed {
                outcome: Ok(result),
                ..
            } => {
                assert!(result.succeeded, "output: {}", result.combined_output);
                assert!(result.combined_output.starts_with("Killed busy.exe"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(busy.wait().unwrap().signal(), Some(9));

        // The pid no longer runs busy.exe: nothing is killed and the
        // run is reported as failed
        match fx.runtime.handle_line("/confirm 2").await {
            Notice::Executed {
                outcome: Ok(result),
                ..
            } => {
                assert!(!result.succeeded);
                assert!(result.combined_output.contains("nothing killed"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(recycled.try_wait().unwrap().is_none());
        recycled.kill().unwrap();
        recycled.wait().unwrap();
    }

    #[tokio::test]
    async fn test_memory_kill_without_match_fails() {
        let work = tempfile::tempdir().unwrap();
        let shims = work.path().join("bin");
        std::fs::create_dir(&shims).unwrap();
        let ps = shims.join("ps");
        std::fs::write(&ps, "#!/bin/sh\necho \"1 1024 small.exe\"\n").unwrap();
        std::fs::set_permissions(&ps, std::fs::Permissions::from_mode(0o755)).unwrap();
        let path = format!("{}:{}", shims.display(), std::env::var("PATH").unwrap_or_default());
        let executor = SandboxExecutor::new(work.path().join("scripts"), "/bin/sh")
            .unwrap()
            .with_env("PATH", path);
        let mut fx = fixture_with(executor, work);

        let action = fx
            .synth
            .synthesize(
                ActionKind::HighMemory,
                ActionParams::new()
                    .text("process", "leak.exe")
                    .number("threshold_mb", 500.0),
            )
            .unwrap();
        fx.runtime.on_report(report(vec![action]));

        match fx.runtime.handle_line("/confirm").await {
            Notice::Executed {
                outcome: Ok(result),
                ..
            } => {
                assert!(!result.succeeded);
                assert!(result.combined_output.contains("nothing killed"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scripts_survive_temp_cleanup() {
        let temp = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let config = crate::config::Config::parse(&format!(
            "[probe]\ntemp_dir = \"{}\"\n[executor]\nwork_dir = \"{}\"\n",
            temp.path().display(),
            state.path().join("scripts").display()
        ))
        .unwrap();
        let executor = SandboxExecutor::new(config.executor.work_path(), "/bin/sh").unwrap();
        let mut fx = fixture_with(executor, state);
        std::fs::write(temp.path().join("junk.tmp"), "x").unwrap();

        let mut scripts = Vec::new();
        for _ in 0..2 {
            let action = cleanup(&fx.synth, &config.probe.temp_path());
            fx.runtime.on_report(report(vec![action]));
            match fx.runtime.handle_line("/confirm").await {
                Notice::Executed {
                    outcome: Ok(result),
                    ..
                } => {
                    assert!(result.succeeded, "output: {}", result.combined_output);
                    scripts.push(result.script.unwrap());
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
        for script in &scripts {
            assert!(script.is_file(), "{} was swept", script.display());
        }
    }

    #[tokio::test]
    async fn test_status_warns_about_backlog() {
        let mut fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let actions = (0..BACKLOG_WARN).map(|_| cleanup(&fx.synth, dir.path())).collect();
        fx.runtime.on_report(report(actions));

        let status = reply(fx.runtime.handle_line("/status").await);
        assert!(status.contains(&format!("Pending actions: {BACKLOG_WARN} (backlog")));
    }

    #[tokio::test]
    async fn test_reject_discards_without_running() {
        let mut fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        fx.runtime.on_report(report(vec![
            cleanup(&fx.synth, dir.path()),
            cleanup(&fx.synth, dir.path()),
        ]));

        assert_eq!(
            reply(fx.runtime.handle_line("/reject 2").await),
            "Rejected #2: Cleanup Temp Folder"
        );
        assert_eq!(
            reply(fx.runtime.handle_line("/list").await),
            "1 pending action(s):\n  #1 Cleanup Temp Folder"
        );
        assert_eq!(
            reply(fx.runtime.handle_line("/reject 2").await),
            format!("Error: {}", RemediationError::UnknownEntry(2))
        );
        assert_eq!(fx.runtime.executor.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_confirm_on_empty_queue() {
        let mut fx = fixture();
        assert_eq!(
            reply(fx.runtime.handle_line("/confirm").await),
            "Error: No pending actions."
        );
    }

    #[tokio::test]
    async fn test_show_displays_script() {
        let mut fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        fx.runtime.on_report(report(vec![cleanup(&fx.synth, dir.path())]));
        let text = reply(fx.runtime.handle_line("/show #1").await);
        assert!(text.starts_with("#1 Cleanup Temp Folder [cleanup_temp]\n#!/bin/sh"));
    }

    #[tokio::test]
    async fn test_enable_architecture_clears_queue() {
        let mut fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        fx.runtime.on_report(report(vec![cleanup(&fx.synth, dir.path())]));

        let text = reply(fx.runtime.handle_line("/disable architecture").await);
        assert_eq!(text, "architecture: disabled");
        assert_eq!(fx.runtime.queue.len(), 1);

        let text = reply(fx.runtime.handle_line("/enable architecture").await);
        assert_eq!(text, "architecture: running\nCleared 1 pending action(s)");
        assert!(fx.runtime.queue.is_empty());
    }

    #[tokio::test]
    async fn test_control_errors_are_replies() {
        let mut fx = fixture();
        assert_eq!(
            reply(fx.runtime.handle_line("/rearm architecture").await),
            format!(
                "Error: {}",
                RemediationError::RearmNotAllowed(Feature::Architecture)
            )
        );
        assert_eq!(
            reply(fx.runtime.handle_line("/rearm dashboard").await),
            "dashboard: running"
        );
        assert_eq!(
            reply(fx.runtime.handle_line("/enable network").await),
            "Error: Unknown feature: network"
        );
    }

    #[tokio::test]
    async fn test_run_file_bounded() {
        let mut fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let fast = dir.path().join("fast.sh");
        std::fs::write(&fast, "echo hello\n").unwrap();
        let slow = dir.path().join("slow.sh");
        std::fs::write(&slow, "sleep 30\n").unwrap();

        match fx.runtime.handle_line(&format!("/run {}", fast.display())).await {
            Notice::Executed {
                outcome: Ok(result),
                ..
            } => {
                assert!(result.succeeded);
                assert_eq!(result.combined_output, "hello\n");
            }
            other => panic!("unexpected {other:?}"),
        }
        match fx.runtime.handle_line(&format!("/run {}", slow.display())).await {
            Notice::Executed {
                outcome: Ok(result),
                ..
            } => {
                assert!(!result.succeeded);
                assert!(result.combined_output.contains("Timed out"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_and_misc() {
        let mut fx = fixture();
        let status = reply(fx.runtime.handle_line("/status").await);
        assert!(status.contains("architecture: running"));
        assert!(status.contains("dashboard: running"));
        assert!(status.contains("Pending actions: 0\n"));

        assert_eq!(reply(fx.runtime.handle_line("/ping").await), "pong");
        assert!(reply(fx.runtime.handle_line("/help").await).contains("/confirm"));
        assert_eq!(reply(fx.runtime.handle_line("/history").await).lines().count(), 5);
        assert!(reply(fx.runtime.handle_line("/bogus").await).starts_with("Unknown command"));
    }

    #[tokio::test]
    async fn test_run_loop_queues_reports_until_input_closes() {
        let mut fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::channel(4);
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();

        report_tx
            .send(report(vec![cleanup(&fx.synth, dir.path())]))
            .unwrap();
        drop(report_tx);

        let mut runtime = fx.runtime;
        let handle = tokio::spawn(async move {
            runtime.run(report_rx, line_rx, notice_tx).await.unwrap();
            runtime
        });

        assert!(matches!(notice_rx.recv().await, Some(Notice::Queued { id: 1, .. })));
        line_tx.send("/ping".to_string()).await.unwrap();
        assert_eq!(notice_rx.recv().await, Some(Notice::Reply("pong".into())));
        drop(line_tx);

        let runtime = handle.await.unwrap();
        assert_eq!(runtime.queue.len(), 1);
    }
}
