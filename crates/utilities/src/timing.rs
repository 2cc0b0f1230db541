use std::cell::RefCell;
use std::io;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::warn;

/// Accumulated time and number of runs for one named phase.
#[derive(Clone, Debug, Default)]
struct PhaseTime {
    name: String,
    total: Duration,
    runs: usize,
}

/// Measures the time spent in the named phases of a computation. Timers with
/// the same name accumulate, which is used for the oracle that is invoked once
/// for every wave.
#[derive(Default)]
pub struct Timing {
    results: Rc<RefCell<Vec<PhaseTime>>>,
}

/// Measures the time between its creation and the call to `finish()`. Finish
/// must be called explicitly, a timer that is dropped unfinished is reported.
pub struct Timer {
    name: String,
    start: Instant,
    results: Rc<RefCell<Vec<PhaseTime>>>,
    registered: bool,
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new timer with the given name.
    pub fn start(&mut self, name: &str) -> Timer {
        Timer {
            name: name.to_string(),
            start: Instant::now(),
            results: self.results.clone(),
            registered: false,
        }
    }

    /// Returns the accumulated time of the given phase, if it has finished at least once.
    pub fn total(&self, name: &str) -> Option<Duration> {
        self.results
            .borrow()
            .iter()
            .find(|phase| phase.name == name)
            .map(|phase| phase.total)
    }

    /// Prints all finished phases to stderr.
    pub fn print(&self) {
        for phase in self.results.borrow().iter() {
            if phase.runs > 1 {
                eprintln!("Time {}: {:.3}s ({} runs)", phase.name, phase.total.as_secs_f64(), phase.runs);
            } else {
                eprintln!("Time {}: {:.3}s", phase.name, phase.total.as_secs_f64());
            }
        }
    }

    /// Writes a YAML report of the finished phases to the given writer.
    pub fn print_yaml(&self, tool_name: &str, writer: &mut impl Write) -> io::Result<()> {
        writeln!(writer, "- tool: {tool_name}")?;
        writeln!(writer, "  timing:")?;

        for phase in self.results.borrow().iter() {
            writeln!(writer, "    {}: {:.3}s", phase.name, phase.total.as_secs_f64())?;
        }
        Ok(())
    }
}

impl Timer {
    /// Finishes the timer, registers the result and returns the elapsed time.
    pub fn finish(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        debug!("Time {}: {:.3}s", self.name, elapsed.as_secs_f64());

        let mut results = self.results.borrow_mut();
        if let Some(phase) = results.iter_mut().find(|phase| phase.name == self.name) {
            phase.total += elapsed;
            phase.runs += 1;
        } else {
            results.push(PhaseTime {
                name: self.name.clone(),
                total: elapsed,
                runs: 1,
            });
        }

        self.registered = true;
        elapsed
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.registered {
            warn!("Timer {} was dropped before 'finish()'", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_accumulates() {
        let mut timing = Timing::new();

        for _ in 0..3 {
            let mut timer = timing.start("oracle");
            timer.finish();
        }

        let mut timer = timing.start("waves");
        timer.finish();

        assert_eq!(timing.results.borrow().len(), 2);
        assert_eq!(timing.results.borrow()[0].runs, 3);
        assert!(timing.total("oracle").is_some());
        assert!(timing.total("shortcut").is_none());

        let mut report = Vec::new();
        timing.print_yaml("sketch-cex", &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.starts_with("- tool: sketch-cex"));
        assert!(report.contains("waves:"));
    }
}
