//! 进程运行时生命周期测试

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flare_bootstrap::error::ProcessResult;
use flare_bootstrap::{
    Context, LifecycleState, Process, ProcessRuntime, RuntimeConfig, SpawnProcess,
};

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct MockProcess {
    name: String,
    log: Log,
    pre_run_error: Option<&'static str>,
    run_error: Option<(&'static str, Duration)>,
    run_panics: bool,
    shutdown_error: Option<&'static str>,
}

impl MockProcess {
    fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            ..Default::default()
        }
    }

    fn failing_pre_run(mut self, message: &'static str) -> Self {
        self.pre_run_error = Some(message);
        self
    }

    fn failing_run(mut self, message: &'static str, after: Duration) -> Self {
        self.run_error = Some((message, after));
        self
    }

    fn panicking_run(mut self) -> Self {
        self.run_panics = true;
        self
    }

    fn failing_shutdown(mut self, message: &'static str) -> Self {
        self.shutdown_error = Some(message);
        self
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Process for MockProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_run(&self, _ctx: &Context) -> ProcessResult {
        self.record(format!("pre_run:{}", self.name));
        match self.pre_run_error {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }

    async fn run(&self, ctx: Context) -> ProcessResult {
        self.record(format!("run:{}", self.name));
        if self.run_panics {
            tokio::time::sleep(Duration::from_millis(10)).await;
            panic!("{} blew up", self.name);
        }
        if let Some((message, after)) = self.run_error {
            tokio::time::sleep(after).await;
            return Err(message.into());
        }
        ctx.done().await;
        Ok(())
    }

    async fn shutdown(&self, ctx: &Context) -> ProcessResult {
        let live = !ctx.is_done() && ctx.deadline().is_some();
        self.record(format!("shutdown:{}:live={live}", self.name));
        match self.shutdown_error {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }
}

fn entries(log: &Log, prefix: &str) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}

fn cancel_after(ctx: &Context, after: Duration) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        ctx.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn clean_cancellation_runs_every_phase() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("p1", &log)))
        .add_process(Arc::new(MockProcess::new("p2", &log)));

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(50));

    runtime.run(ctx).await.unwrap();

    assert_eq!(entries(&log, "pre_run:"), vec!["pre_run:p1", "pre_run:p2"]);
    assert_eq!(entries(&log, "run:").len(), 2);
    assert_eq!(
        entries(&log, "shutdown:"),
        vec!["shutdown:p2:live=true", "shutdown:p1:live=true"]
    );
}

#[tokio::test(start_paused = true)]
async fn pre_run_failure_short_circuits() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("p1", &log).failing_pre_run("boom")))
        .add_process(Arc::new(MockProcess::new("p2", &log)));

    let err = runtime.run(Context::background()).await.unwrap_err();

    assert!(err.is_pre_run());
    assert!(err.to_string().contains("boom"));
    assert_eq!(*log.lock().unwrap(), vec!["pre_run:p1"]);
}

#[tokio::test(start_paused = true)]
async fn pre_run_failure_in_middle_skips_later_processes() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("a", &log)))
        .add_process(Arc::new(MockProcess::new("b", &log).failing_pre_run("bind failed")))
        .add_process(Arc::new(MockProcess::new("c", &log)));

    let err = runtime.run(Context::background()).await.unwrap_err();

    assert!(err.to_string().contains("bind failed"));
    assert_eq!(*log.lock().unwrap(), vec!["pre_run:a", "pre_run:b"]);
}

#[tokio::test(start_paused = true)]
async fn run_failure_triggers_shutdown_of_all() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(
            MockProcess::new("p1", &log).failing_run("crash", Duration::from_millis(10)),
        ))
        .add_process(Arc::new(MockProcess::new("p2", &log)));

    let err = runtime.run(Context::background()).await.unwrap_err();

    assert!(err.to_string().contains("crash"));
    assert_eq!(err.process_index(), Some(0));
    assert_eq!(
        entries(&log, "shutdown:"),
        vec!["shutdown:p2:live=true", "shutdown:p1:live=true"]
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_run_failures_report_a_failing_process() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("ok", &log)))
        .add_process(Arc::new(
            MockProcess::new("f1", &log).failing_run("first", Duration::from_millis(20)),
        ))
        .add_process(Arc::new(
            MockProcess::new("f2", &log).failing_run("second", Duration::from_millis(20)),
        ));

    let err = runtime.run(Context::background()).await.unwrap_err();

    let index = err.process_index().unwrap();
    assert!(index == 1 || index == 2);
    assert_eq!(entries(&log, "shutdown:").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_runs_in_reverse_order() {
    let log = Log::default();
    let runtime = ProcessRuntime::default().with_processes(
        ["a", "b", "c"]
            .into_iter()
            .map(|name| Arc::new(MockProcess::new(name, &log)) as Arc<dyn Process>),
    );

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(200));
    runtime.run(ctx).await.unwrap();

    assert_eq!(
        entries(&log, "shutdown:"),
        vec![
            "shutdown:c:live=true",
            "shutdown:b:live=true",
            "shutdown:a:live=true"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_error_does_not_stop_remaining_shutdowns() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("p1", &log)))
        .add_process(Arc::new(MockProcess::new("p2", &log).failing_shutdown("timeout")));

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(50));
    let err = runtime.run(ctx).await.unwrap_err();

    assert!(err.to_string().contains("timeout"));
    assert_eq!(err.process_index(), Some(1));
    assert_eq!(
        entries(&log, "shutdown:"),
        vec!["shutdown:p2:live=true", "shutdown:p1:live=true"]
    );
}

#[tokio::test(start_paused = true)]
async fn run_error_takes_precedence_over_shutdown_error() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(
            MockProcess::new("p1", &log).failing_run("crash", Duration::from_millis(10)),
        ))
        .add_process(Arc::new(MockProcess::new("p2", &log).failing_shutdown("timeout")));

    let err = runtime.run(Context::background()).await.unwrap_err();

    assert!(err.to_string().contains("crash"));
    assert!(!err.to_string().contains("timeout"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_receives_fresh_context_after_cancellation() {
    let log = Log::default();
    let runtime = ProcessRuntime::new(
        RuntimeConfig::default().with_close_timeout(Duration::from_secs(3)),
    )
    .add_process(Arc::new(MockProcess::new("p1", &log)));

    let ctx = Context::with_timeout(Duration::from_millis(150));
    runtime.run(ctx.clone()).await.unwrap();

    assert!(ctx.is_done());
    assert_eq!(entries(&log, "shutdown:"), vec!["shutdown:p1:live=true"]);
}

#[tokio::test(start_paused = true)]
async fn panicking_process_is_reported_as_run_error() {
    let log = Log::default();
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("steady", &log)))
        .add_process(Arc::new(MockProcess::new("bomb", &log).panicking_run()));

    let err = runtime.run(Context::background()).await.unwrap_err();

    assert_eq!(err.process_index(), Some(1));
    assert!(err.to_string().contains("panicked"));
    assert_eq!(entries(&log, "shutdown:").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stuck_run_task_is_aborted_after_close_timeout() {
    let runtime = ProcessRuntime::new(
        RuntimeConfig::default().with_close_timeout(Duration::from_secs(1)),
    )
    .add_process(Arc::new(SpawnProcess::new("stuck", |_ctx| async {
        std::future::pending::<()>().await;
        Ok(())
    })));

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(50));

    let started = tokio::time::Instant::now();
    runtime.run(ctx).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn announcer_runs_once_after_pre_run() {
    let log = Log::default();
    let announce_log = Arc::clone(&log);
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("p1", &log)))
        .add_process(Arc::new(MockProcess::new("p2", &log)))
        .on_started(move || announce_log.lock().unwrap().push("announce".to_string()));

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(500));
    runtime.run(ctx).await.unwrap();

    let log = log.lock().unwrap();
    let announce_at = log.iter().position(|e| e == "announce").unwrap();
    let last_pre_run = log.iter().rposition(|e| e.starts_with("pre_run:")).unwrap();
    let first_shutdown = log.iter().position(|e| e.starts_with("shutdown:")).unwrap();
    assert!(announce_at > last_pre_run);
    assert!(announce_at < first_shutdown);
    assert_eq!(log.iter().filter(|e| *e == "announce").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn announcer_skipped_when_pre_run_fails() {
    let log = Log::default();
    let announce_log = Arc::clone(&log);
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(MockProcess::new("p1", &log).failing_pre_run("boom")))
        .on_started(move || announce_log.lock().unwrap().push("announce".to_string()));

    assert!(runtime.run(Context::background()).await.is_err());
    assert!(!log.lock().unwrap().iter().any(|e| e == "announce"));
}

#[tokio::test(start_paused = true)]
async fn lifecycle_state_transitions() {
    let log = Log::default();
    let runtime = ProcessRuntime::default().add_process(Arc::new(MockProcess::new("p1", &log)));
    let state = runtime.state();
    assert_eq!(*state.borrow(), LifecycleState::Idle);

    let ctx = Context::background();
    let handle = tokio::spawn(runtime.run(ctx.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*state.borrow(), LifecycleState::Running);

    ctx.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(*state.borrow(), LifecycleState::Stopped);
    assert_eq!(LifecycleState::Stopping.to_string(), "stopping");
}

#[tokio::test(start_paused = true)]
async fn empty_runtime_returns_on_cancellation() {
    let runtime = ProcessRuntime::default();
    assert!(runtime.is_empty());

    let ctx = Context::background();
    cancel_after(&ctx, Duration::from_millis(10));
    runtime.run(ctx).await.unwrap();
}

#[tokio::test]
async fn spawn_process_runs_only_once() {
    let process = SpawnProcess::new("once", |_ctx| async { Ok(()) });
    assert_eq!(process.name(), "once");

    process.run(Context::background()).await.unwrap();
    let err = process.run(Context::background()).await.unwrap_err();
    assert!(err.to_string().contains("already been run"));
}

#[tokio::test]
async fn process_names_follow_registration_order() {
    let runtime = ProcessRuntime::default()
        .add_process(Arc::new(SpawnProcess::new("first", |_ctx| async { Ok(()) })))
        .add_process(Arc::new(SpawnProcess::new("second", |_ctx| async { Ok(()) })));

    assert_eq!(runtime.process_names(), vec!["first", "second"]);
    assert_eq!(runtime.len(), 2);
    assert_eq!(runtime.config().close_timeout, Duration::from_secs(10));
}
