use crate::{logger::RunLog, ActionResult, Error};
use std::{future::Future, str::FromStr, time::Duration};

/// Where a batch is in its life. A batch only ever moves forward:
/// `Idle -> Running -> Completed` or `Idle -> Running -> Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// What to do when one invocation fails. Stopping the whole batch on the
/// first failure is the default; skipping keeps going and counts the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    StopOnError,
    SkipOnError,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::StopOnError),
            "skip" => Ok(Self::SkipOnError),
            other => Err(format!("unknown error policy {:?}, expected stop or skip", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// The batch state machine. Holds the identifier list and tracks progress;
/// it never touches the network or the clock, so the abort boundary can be
/// tested on its own.
pub struct Batch {
    user_ids: Vec<String>,
    next: usize,
    state: RunState,
    policy: ErrorPolicy,
    results: Vec<ActionResult>,
    succeeded: usize,
    failed: usize,
}

impl Batch {
    pub fn new(user_ids: Vec<String>, policy: ErrorPolicy) -> Self {
        Self {
            user_ids,
            next: 0,
            state: RunState::Idle,
            policy,
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
        }
    }

    /// Begin the run. An empty list has nothing to do and goes straight to
    /// `Completed`.
    pub fn start(&mut self) {
        if self.state == RunState::Idle {
            self.state = if self.user_ids.is_empty() {
                RunState::Completed
            } else {
                RunState::Running
            };
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// How many identifiers have been attempted so far.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// The identifier to invoke next, while the batch is running.
    pub fn next_user(&self) -> Option<&str> {
        if self.state == RunState::Running {
            self.user_ids.get(self.next).map(String::as_str)
        } else {
            None
        }
    }

    pub fn record_success(&mut self, result: ActionResult) {
        self.succeeded += 1;
        self.results.push(result);
        self.advance();
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
        match self.policy {
            ErrorPolicy::StopOnError => self.state = RunState::Aborted,
            ErrorPolicy::SkipOnError => self.advance(),
        }
    }

    fn advance(&mut self) {
        self.next += 1;
        if self.next == self.user_ids.len() {
            self.state = RunState::Completed;
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            attempted: self.processed(),
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    fn finish(self) -> BatchReport {
        let summary = self.summary();
        BatchReport {
            state: self.state,
            summary,
            results: self.results,
        }
    }
}

/// Final outcome of a run: the terminal state, the counts, and the successful
/// results in invocation order.
pub struct BatchReport {
    pub state: RunState,
    pub summary: RunSummary,
    pub results: Vec<ActionResult>,
}

/// Drive a batch to its terminal state, one invocation at a time. `action`
/// performs a single invocation; between invocations the driver sleeps for
/// `delay`, except after the last one. Strictly sequential: no two
/// invocations or delays ever overlap.
pub async fn run_batch<F, Fut>(
    mut batch: Batch,
    log: &mut RunLog,
    delay: Duration,
    mut action: F,
) -> Result<BatchReport, Error>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ActionResult, Error>>,
{
    batch.start();
    while let Some(user_id) = batch.next_user().map(str::to_owned) {
        log.line(format!("Starting request for user: {}", user_id))?;
        match action(user_id.clone()).await {
            Ok(result) => {
                log.line(format!("User {}: success - {}", user_id, result.status))?;
                batch.record_success(result);
                log.line(format!(
                    "Progress: {}/{} users processed",
                    batch.processed(),
                    batch.len()
                ))?;
            }
            Err(error) => {
                log.line(format!("User {}: error - {}", user_id, error))?;
                batch.record_failure();
                if batch.state() == RunState::Aborted {
                    log.line("Stopping batch due to error")?;
                }
            }
        }
        // Delay between calls, but not after the last one
        if batch.next_user().is_some() {
            log.line(format!(
                "Waiting {}ms before the next call...",
                delay.as_millis()
            ))?;
            tokio::time::sleep(delay).await;
        }
    }
    Ok(batch.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::{Arc, Mutex};

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn ok_result(user_id: &str) -> ActionResult {
        ActionResult {
            user_id: user_id.to_owned(),
            status: StatusCode::NO_CONTENT,
            body: String::new(),
        }
    }

    fn failed(user_id: &str) -> Error {
        Error::ActionRequest {
            user_id: user_id.to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        }
    }

    fn test_log(dir: &tempfile::TempDir) -> RunLog {
        RunLog::open(dir.path().join("run.log")).unwrap()
    }

    #[test]
    fn empty_batch_completes_without_running() {
        let mut batch = Batch::new(Vec::new(), ErrorPolicy::StopOnError);
        assert_eq!(batch.state(), RunState::Idle);
        batch.start();
        assert_eq!(batch.state(), RunState::Completed);
        assert_eq!(batch.next_user(), None);
    }

    #[test]
    fn stop_on_error_aborts_without_advancing() {
        let mut batch = Batch::new(ids(&["a", "b", "c"]), ErrorPolicy::StopOnError);
        batch.start();
        assert_eq!(batch.next_user(), Some("a"));
        batch.record_success(ok_result("a"));
        assert_eq!(batch.next_user(), Some("b"));
        batch.record_failure();
        assert_eq!(batch.state(), RunState::Aborted);
        assert_eq!(batch.next_user(), None);
        assert_eq!(
            batch.summary(),
            RunSummary {
                attempted: 2,
                succeeded: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn skip_on_error_continues_to_completion() {
        let mut batch = Batch::new(ids(&["a", "b", "c"]), ErrorPolicy::SkipOnError);
        batch.start();
        batch.record_success(ok_result("a"));
        batch.record_failure();
        assert_eq!(batch.state(), RunState::Running);
        assert_eq!(batch.next_user(), Some("c"));
        batch.record_success(ok_result("c"));
        assert_eq!(batch.state(), RunState::Completed);
        assert_eq!(
            batch.summary(),
            RunSummary {
                attempted: 3,
                succeeded: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn error_policy_parses_from_cli_values() {
        assert_eq!("stop".parse(), Ok(ErrorPolicy::StopOnError));
        assert_eq!("skip".parse(), Ok(ErrorPolicy::SkipOnError));
        assert!("retry".parse::<ErrorPolicy>().is_err());
    }

    #[tokio::test]
    async fn driver_stops_at_first_failure_and_never_invokes_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = test_log(&dir);
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let seen = invoked.clone();
        let batch = Batch::new(ids(&["a", "b", "c"]), ErrorPolicy::StopOnError);
        let report = run_batch(batch, &mut log, Duration::ZERO, move |user_id| {
            seen.lock().unwrap().push(user_id.clone());
            async move {
                if user_id == "b" {
                    Err(failed(&user_id))
                } else {
                    Ok(ok_result(&user_id))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(*invoked.lock().unwrap(), ids(&["a", "b"]));
        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].user_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_exactly_one_delay_between_calls_and_none_after_the_last() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = test_log(&dir);
        let batch = Batch::new(ids(&["a", "b", "c"]), ErrorPolicy::StopOnError);
        let started = tokio::time::Instant::now();
        let report = run_batch(
            batch,
            &mut log,
            Duration::from_secs(3),
            |user_id| async move { Ok(ok_result(&user_id)) },
        )
        .await
        .unwrap();

        // Three successes, so exactly two delays on the paused clock
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.summary.succeeded, 3);
        assert_eq!(report.summary.failed, 0);
    }

    #[tokio::test]
    async fn skip_policy_driver_reports_partial_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = test_log(&dir);
        let batch = Batch::new(ids(&["a", "b", "c"]), ErrorPolicy::SkipOnError);
        let report = run_batch(batch, &mut log, Duration::ZERO, |user_id| async move {
            if user_id == "b" {
                Err(failed(&user_id))
            } else {
                Ok(ok_result(&user_id))
            }
        })
        .await
        .unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.summary.attempted, 3);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
    }
}
