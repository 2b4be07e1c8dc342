//! Progress reporting for simulation runs.
//!
//! Reporters receive an integer percentage. The [`ProgressTicker`] samples a
//! shared processed-file counter on its own thread, so progress never
//! influences how workers schedule their files.

use crate::infra::error::{SimulationError, SimulationResult};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Progress indicator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStyle {
    /// Simple percentage display
    Percentage,
    /// Progress bar with percentage
    ProgressBar,
    /// Silent mode (no visual indicator)
    Silent,
}

/// Progress reporter trait
pub trait ProgressReporter: Send + Sync {
    /// Report completion as a percentage in `0..=100`
    fn report(&self, percent: u8);

    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Mark the operation as completed
    fn finish(&self);

    /// Mark the operation as failed with error message
    fn finish_with_error(&self, error: &str);
}

/// Percentage of `processed` out of `total`, capped at 100.
#[must_use]
pub fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = processed.saturating_mul(100) / total;
    pct.min(100) as u8
}

struct TerminalState {
    message: String,
    last_percent: Option<u8>,
    finished: bool,
}

/// Terminal-based progress indicator
pub struct TerminalProgress {
    style: ProgressStyle,
    start_time: Instant,
    state: Mutex<TerminalState>,
    bar_width: usize,
}

impl TerminalProgress {
    /// Create a new terminal progress indicator
    #[must_use]
    pub fn new(style: ProgressStyle) -> Self {
        Self {
            style,
            start_time: Instant::now(),
            state: Mutex::new(TerminalState {
                message: String::new(),
                last_percent: None,
                finished: false,
            }),
            bar_width: 40,
        }
    }

    /// Create progress indicator with custom bar width
    #[must_use]
    pub fn with_bar_width(style: ProgressStyle, width: usize) -> Self {
        let mut progress = Self::new(style);
        progress.bar_width = width;
        progress
    }

    fn render_percentage(&self, percent: u8, message: &str) {
        let elapsed = self.start_time.elapsed();
        print!("\r{message} - {percent}% - {:.1}s", elapsed.as_secs_f64());
        let _ = io::stdout().flush();
    }

    fn render_progress_bar(&self, percent: u8, message: &str) {
        let filled = self.bar_width * usize::from(percent) / 100;
        let empty = self.bar_width - filled;
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(empty));
        print!("\r{message} [{bar}] {percent}%");
        let _ = io::stdout().flush();
    }

    fn clear_line(&self) {
        print!("\r{}\r", " ".repeat(self.bar_width + 40));
        let _ = io::stdout().flush();
    }
}

impl ProgressReporter for TerminalProgress {
    fn report(&self, percent: u8) {
        let mut state = self.state.lock();
        // Identical samples are not redrawn.
        if state.finished || state.last_percent == Some(percent) {
            return;
        }
        state.last_percent = Some(percent);

        match self.style {
            ProgressStyle::Percentage => self.render_percentage(percent, &state.message),
            ProgressStyle::ProgressBar => self.render_progress_bar(percent, &state.message),
            ProgressStyle::Silent => {}
        }
    }

    fn set_message(&self, message: &str) {
        self.state.lock().message = message.to_string();
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        if self.style == ProgressStyle::Silent {
            return;
        }
        self.clear_line();
        println!(
            "[+] {} - Completed in {:.1}s",
            state.message,
            self.start_time.elapsed().as_secs_f64()
        );
    }

    fn finish_with_error(&self, error: &str) {
        let mut state = self.state.lock();
        state.finished = true;
        if self.style == ProgressStyle::Silent {
            return;
        }
        self.clear_line();
        println!(
            "[!] {} - Failed after {:.1}s: {}",
            state.message,
            self.start_time.elapsed().as_secs_f64(),
            error
        );
    }
}

/// Null progress reporter for silent operations
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn report(&self, _percent: u8) {}
    fn set_message(&self, _message: &str) {}
    fn finish(&self) {}
    fn finish_with_error(&self, _error: &str) {}
}

/// Reporter forwarding every percentage to a closure.
pub struct CallbackProgress<F> {
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(u8) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for CallbackProgress<F>
where
    F: Fn(u8) + Send + Sync,
{
    fn report(&self, percent: u8) {
        (self.callback)(percent);
    }
    fn set_message(&self, _message: &str) {}
    fn finish(&self) {}
    fn finish_with_error(&self, _error: &str) {}
}

/// Progress factory for creating appropriate progress indicators
pub struct ProgressFactory;

impl ProgressFactory {
    /// Create a progress reporter based on environment and preferences
    #[must_use]
    pub fn create_reporter(style: ProgressStyle) -> Arc<dyn ProgressReporter> {
        if style != ProgressStyle::Silent && atty::is(atty::Stream::Stdout) {
            Arc::new(TerminalProgress::new(style))
        } else {
            Arc::new(NullProgress)
        }
    }

    /// Bar for large batches, plain percentage otherwise.
    #[must_use]
    pub fn suggest_style(file_count: usize) -> ProgressStyle {
        if file_count > 50 {
            ProgressStyle::ProgressBar
        } else {
            ProgressStyle::Percentage
        }
    }
}

/// Periodic sampler of a processed-file counter.
///
/// Reports once immediately and then every `interval` until stopped. Dropping
/// the ticker stops the sampling thread and joins it.
pub struct ProgressTicker {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn start(
        processed: Arc<AtomicUsize>,
        total: usize,
        interval: Duration,
        reporter: Arc<dyn ProgressReporter>,
    ) -> SimulationResult<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("simulation-progress".to_string())
            .spawn(move || loop {
                reporter.report(percentage(processed.load(Ordering::Relaxed), total));
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| {
                SimulationError::ThreadError(format!("Failed to start progress thread: {e}"))
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop sampling and wait for the sampling thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Progress thread panicked");
            }
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_is_capped() {
        assert_eq!(percentage(0, 10), 0);
        assert_eq!(percentage(5, 10), 50);
        assert_eq!(percentage(10, 10), 100);
        assert_eq!(percentage(12, 10), 100);
        assert_eq!(percentage(0, 0), 100);
    }

    #[test]
    fn test_progress_factory_style_suggestion() {
        assert_eq!(ProgressFactory::suggest_style(500), ProgressStyle::ProgressBar);
        assert_eq!(ProgressFactory::suggest_style(3), ProgressStyle::Percentage);
    }

    #[test]
    fn test_terminal_progress_creation() {
        let progress = TerminalProgress::new(ProgressStyle::ProgressBar);
        assert_eq!(progress.bar_width, 40);

        let progress_custom = TerminalProgress::with_bar_width(ProgressStyle::ProgressBar, 60);
        assert_eq!(progress_custom.bar_width, 60);
    }

    #[test]
    fn test_ticker_reports_immediately_and_stops() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(CallbackProgress::new(move |pct| sink.lock().push(pct)));
        let processed = Arc::new(AtomicUsize::new(3));

        let ticker =
            ProgressTicker::start(processed, 4, Duration::from_secs(60), reporter).unwrap();
        // The first sample is taken before the first wait.
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        ticker.stop();

        assert_eq!(seen.lock().first().copied(), Some(75));
    }
}
