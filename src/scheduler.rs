use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::error::Result;
use crate::group::ExtractionUnit;

/// The seam between scheduling and the external engines. Production code
/// uses `EngineInvoker`; tests substitute a recording runner.
pub trait UnitRunner: Sync {
    fn run_unit(&self, unit: &ExtractionUnit, archive: &Path) -> Result<()>;
}

/// Dispatches extraction units to a bounded pool of worker threads.
///
/// Each worker blocks on one engine process at a time, so at most `jobs`
/// engine processes exist concurrently (`jobs == 0` runs everything on a
/// single worker). Output paths are unique per unit, so completion order
/// never races on the file tree.
pub struct Scheduler {
    jobs: usize,
    wait: Duration,
}

impl Scheduler {
    pub fn new(jobs: usize, wait: Duration) -> Self {
        Self { jobs, wait }
    }

    /// Run every unit to completion. A failing unit stops new work from
    /// being taken; workers already inside an engine invocation drain
    /// before the first error is returned, so no engine process is
    /// orphaned.
    pub fn run(&self, units: &[ExtractionUnit], archive: &Path, runner: &dyn UnitRunner) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }

        let workers = self.jobs.max(1).min(units.len());
        info!(units = units.len(), workers, "dispatching extraction units");

        let queue: Mutex<VecDeque<&ExtractionUnit>> = Mutex::new(units.iter().collect());
        let abort = AtomicBool::new(false);
        let failures: Mutex<Vec<crate::error::ExtractError>> = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    let unit = queue.lock().unwrap().pop_front();
                    let Some(unit) = unit else {
                        break;
                    };
                    info!(label = %unit.label, path = %unit.path.display(), "extracting");
                    if let Err(err) = runner.run_unit(unit, archive) {
                        error!(label = %unit.label, error = %err, "extraction unit failed");
                        abort.store(true, Ordering::Relaxed);
                        failures.lock().unwrap().push(err);
                        break;
                    }
                    if !self.wait.is_zero() {
                        thread::sleep(self.wait);
                    }
                });
            }
        });

        let failures = failures.into_inner().unwrap();
        match failures.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::group::ExtractStrategy;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn unit(name: &str) -> ExtractionUnit {
        ExtractionUnit {
            path: PathBuf::from(format!("/out/{}.sql", name)),
            strategy: ExtractStrategy::RestoreManifest {
                lines: vec![format!("1; 0 0 TABLE public {} owner", name)],
            },
            label: name.to_string(),
        }
    }

    struct RecordingRunner {
        seen: Mutex<Vec<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        fail_on: Option<String>,
    }

    impl RecordingRunner {
        fn new(fail_on: Option<&str>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_on: fail_on.map(str::to_string),
            }
        }
    }

    impl UnitRunner for RecordingRunner {
        fn run_unit(&self, unit: &ExtractionUnit, _archive: &Path) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.running.fetch_sub(1, Ordering::SeqCst);

            self.seen.lock().unwrap().push(unit.label.clone());
            if self.fail_on.as_deref() == Some(unit.label.as_str()) {
                return Err(ExtractError::Engine {
                    program: "pg_restore".to_string(),
                    command: format!("pg_restore {}", unit.label),
                    status: "exit status: 1".to_string(),
                    output: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_all_units_run_serially_in_order() {
        let units: Vec<_> = ["a", "b", "c"].into_iter().map(unit).collect();
        let runner = RecordingRunner::new(None);
        Scheduler::new(0, Duration::ZERO)
            .run(&units, Path::new("/tmp/a.pgr"), &runner)
            .unwrap();
        assert_eq!(*runner.seen.lock().unwrap(), ["a", "b", "c"]);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let units: Vec<_> = (0..12).map(|i| unit(&format!("u{}", i))).collect();
        let runner = RecordingRunner::new(None);
        Scheduler::new(3, Duration::ZERO)
            .run(&units, Path::new("/tmp/a.pgr"), &runner)
            .unwrap();
        assert_eq!(runner.seen.lock().unwrap().len(), 12);
        assert!(runner.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_failure_aborts_remaining_units() {
        let units: Vec<_> = ["a", "b", "c", "d"].into_iter().map(unit).collect();
        let runner = RecordingRunner::new(Some("b"));
        let err = Scheduler::new(0, Duration::ZERO)
            .run(&units, Path::new("/tmp/a.pgr"), &runner)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Engine { .. }));
        // "c" and "d" were never started.
        assert_eq!(*runner.seen.lock().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_empty_unit_list_is_ok() {
        let runner = RecordingRunner::new(None);
        Scheduler::new(4, Duration::ZERO)
            .run(&[], Path::new("/tmp/a.pgr"), &runner)
            .unwrap();
        assert!(runner.seen.lock().unwrap().is_empty());
    }
}
