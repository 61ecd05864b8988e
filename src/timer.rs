//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt::{self, Arguments},
    mem,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Weight of the newest measurement in the running average.
const SMOOTHING: f32 = 0.3;

/// A timer that measures how long an operation takes and keeps a smoothed average.
///
/// Timings are averaged with an exponential moving average, which is reset every time the timer
/// is displayed using `{}` ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Smoothed duration in seconds, `None` until the first measurement since the last reset.
    avg: Option<f32>,
    /// The number of time measurements that contributed to the current `avg`.
    count: usize,
}

impl State {
    fn record(&mut self, secs: f32) {
        self.avg = Some(match self.avg {
            Some(avg) => SMOOTHING * secs + (1.0 - SMOOTHING) * avg,
            None => secs,
        });
        self.count += 1;
    }
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(duration.as_secs_f32());
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = mem::take(&mut *self.state.lock().unwrap_or_else(PoisonError::into_inner));
        let avg_ms = state.avg.unwrap_or(0.0) * 1000.0;

        write!(f, "{}: {}x{avg_ms:.01}ms", self.name, state.count)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("name", &self.name).finish()
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.tick_impl(format_args!(""));
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    ///
    /// `extra` is only iterated when a log message is actually emitted, so passing [`Timer`]s
    /// here only resets them once per second.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        struct DisplayExtra<I>(Cell<Option<I>>);

        impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(iter) = self.0.take() else {
                    return Ok(());
                };
                let mut iter = iter.peekable();
                if iter.peek().is_none() {
                    return Ok(());
                }
                f.write_str(" (")?;
                for (i, item) in iter.enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }

        self.tick_impl(format_args!(
            "{}",
            DisplayExtra(Cell::new(Some(extra.into_iter())))
        ));
    }

    fn tick_impl(&mut self, args: Arguments<'_>) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!("{}: {} FPS{}", self.name, self.frames, args);

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn smoothing() {
        let mut state = State::default();
        state.record(1.0);
        assert_eq!(state.avg, Some(1.0));
        state.record(2.0);
        assert_relative_eq!(state.avg.unwrap(), 1.3);
        assert_eq!(state.count, 2);
    }

    #[test]
    fn display_resets() {
        let timer = Timer::new("blur");
        timer.time(|| {});
        timer.time(|| {});

        let shown = timer.to_string();
        assert!(shown.starts_with("blur: 2x"), "{shown}");
        assert_eq!(timer.to_string(), "blur: 0x0.0ms");
    }

    #[test]
    fn time_returns_value() {
        let timer = Timer::new("t");
        assert_eq!(timer.time(|| 42), 42);
    }
}
