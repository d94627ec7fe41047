use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::Pipeline;

type Trigger = Option<PathBuf>;

/// Sending side of one pipeline's debounce queue.
pub struct DebounceHandle {
    name: &'static str,
    tx: UnboundedSender<Trigger>,
    task: JoinHandle<()>,
}

impl DebounceHandle {
    /// Record `trigger` and (re)start the quiescence window.
    pub fn schedule(&self, trigger: Trigger) {
        if self.tx.send(trigger).is_err() {
            tracing::debug!(pipeline = self.name, "pipeline task gone, dropping trigger");
        }
    }

    /// Close the queue and wait for an in-flight run to finish.
    /// A burst still settling is dropped.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            tracing::warn!(pipeline = self.name, error = %err, "pipeline task failed");
        }
    }
}

/// Spawn the task that owns `pipeline` and runs it once per settled burst.
///
/// Within a burst only the newest trigger is kept. Requests that arrive while
/// a run is in flight collapse into one follow-up run, started as soon as the
/// current run returns.
pub fn spawn_debounced<P: Pipeline>(pipeline: P, window: Duration) -> DebounceHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let name = pipeline.name();
    let task = tokio::spawn(drive(pipeline, window, rx));
    DebounceHandle { name, tx, task }
}

async fn drive<P: Pipeline>(
    mut pipeline: P,
    window: Duration,
    mut rx: UnboundedReceiver<Trigger>,
) {
    let mut follow_up: Option<Trigger> = None;

    loop {
        let trigger = match follow_up.take() {
            Some(trigger) => trigger,
            None => {
                let Some(first) = rx.recv().await else {
                    break;
                };
                match settle(first, window, &mut rx).await {
                    Some(trigger) => trigger,
                    None => break,
                }
            }
        };

        tracing::debug!(pipeline = pipeline.name(), trigger = ?trigger, "running pipeline");
        pipeline.run(trigger).await;

        // Everything queued during the run becomes a single follow-up.
        loop {
            match rx.try_recv() {
                Ok(next) => follow_up = Some(next),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
    }
}

/// Wait until `window` passes with no new request; return the newest trigger.
///
/// `None` when the queue closed mid-burst: the burst is dropped.
async fn settle(
    first: Trigger,
    window: Duration,
    rx: &mut UnboundedReceiver<Trigger>,
) -> Option<Trigger> {
    let mut latest = first;
    loop {
        match timeout(window, rx.recv()).await {
            Ok(Some(next)) => latest = next,
            Ok(None) => return None,
            Err(_) => return Some(latest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::time::{Instant, sleep};

    const WINDOW: Duration = Duration::from_millis(350);

    #[derive(Debug, Clone, PartialEq)]
    enum Mark {
        Start(Trigger, Duration),
        End,
    }

    struct Recorder {
        origin: Instant,
        busy_for: Duration,
        marks: Arc<Mutex<Vec<Mark>>>,
    }

    impl Pipeline for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn run(&mut self, trigger: Option<PathBuf>) {
            let at = self.origin.elapsed();
            self.marks.lock().unwrap().push(Mark::Start(trigger, at));
            sleep(self.busy_for).await;
            self.marks.lock().unwrap().push(Mark::End);
        }
    }

    fn recorder(busy_for: Duration) -> (Recorder, Arc<Mutex<Vec<Mark>>>) {
        let marks = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            origin: Instant::now(),
            busy_for,
            marks: Arc::clone(&marks),
        };
        (recorder, marks)
    }

    fn starts(marks: &Arc<Mutex<Vec<Mark>>>) -> Vec<(Trigger, Duration)> {
        marks
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Mark::Start(t, at) => Some((t.clone(), *at)),
                Mark::End => None,
            })
            .collect()
    }

    fn path(p: &str) -> Trigger {
        Some(Path::new(p).to_path_buf())
    }

    fn near(actual: Duration, expected_ms: u64) -> bool {
        let expected = Duration::from_millis(expected_ms);
        actual >= expected && actual <= expected + Duration::from_millis(5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_with_latest_trigger() {
        let (pipeline, marks) = recorder(Duration::ZERO);
        let handle = spawn_debounced(pipeline, WINDOW);

        handle.schedule(path("a.py"));
        sleep(Duration::from_millis(100)).await;
        handle.schedule(path("b.py"));
        sleep(Duration::from_millis(100)).await;
        handle.schedule(path("c.html"));
        sleep(Duration::from_secs(2)).await;

        let runs = starts(&marks);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, path("c.html"));
        assert!(near(runs[0].1, 550), "ran at {:?}", runs[0].1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_run_separately() {
        let (pipeline, marks) = recorder(Duration::ZERO);
        let handle = spawn_debounced(pipeline, WINDOW);

        handle.schedule(path("a.py"));
        sleep(Duration::from_secs(1)).await;
        handle.schedule(path("b.py"));
        sleep(Duration::from_secs(1)).await;

        let runs: Vec<_> = starts(&marks).into_iter().map(|(t, _)| t).collect();
        assert_eq!(runs, vec![path("a.py"), path("b.py")]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_during_run_collapse_into_one_follow_up() {
        let (pipeline, marks) = recorder(Duration::from_secs(1));
        let handle = spawn_debounced(pipeline, WINDOW);

        handle.schedule(path("a.py"));
        // First run spans 350ms..1350ms.
        sleep(Duration::from_millis(500)).await;
        handle.schedule(path("b.py"));
        sleep(Duration::from_millis(100)).await;
        handle.schedule(path("c.py"));
        sleep(Duration::from_secs(5)).await;

        let runs = starts(&marks);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].0, path("c.py"));
        assert!(near(runs[1].1, 1350), "follow-up ran at {:?}", runs[1].1);

        let log = marks.lock().unwrap().clone();
        assert!(
            matches!(
                log.as_slice(),
                [Mark::Start(..), Mark::End, Mark::Start(..), Mark::End]
            ),
            "runs overlapped: {log:?}"
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_settling_burst() {
        let (pipeline, marks) = recorder(Duration::ZERO);
        let handle = spawn_debounced(pipeline, WINDOW);

        handle.schedule(None);
        handle.shutdown().await;

        assert!(starts(&marks).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_run() {
        let (pipeline, marks) = recorder(Duration::from_secs(1));
        let handle = spawn_debounced(pipeline, WINDOW);

        handle.schedule(None);
        sleep(Duration::from_millis(400)).await;
        handle.schedule(path("late.py"));
        handle.shutdown().await;

        let log = marks.lock().unwrap().clone();
        assert_eq!(log.len(), 2, "one complete run, no follow-up: {log:?}");
        assert_eq!(log[1], Mark::End);
    }
}
