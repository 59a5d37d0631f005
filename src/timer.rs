//! Cancellable countdown running on the tokio runtime.

use crate::error::TimerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// At most one countdown runs per `Timer`; starting again cancels the
/// previous run. Each run owns its activity flag so a cancelled run never
/// fires its end callback.
#[derive(Debug, Default)]
pub struct Timer {
    active: Option<Arc<AtomicBool>>,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count down from `limit`, calling `on_tick(remaining)` at the start of
    /// every `interval` and `on_end()` once the count reaches zero.
    pub fn start<T, E>(&mut self, limit: u32, interval: Duration, mut on_tick: T, on_end: E) -> Result<(), TimerError>
    where
        T: FnMut(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.stop();
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let task = runtime.spawn(async move {
            let mut remaining = limit;
            while remaining > 0 {
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                on_tick(remaining);
                tokio::time::sleep(interval).await;
                remaining -= 1;
            }
            if flag.swap(false, Ordering::SeqCst) {
                on_end();
            }
        });
        self.active = Some(active);
        self.task = Some(task);
        Ok(())
    }

    /// Single-shot: `on_end` after `delay` unless stopped first.
    pub fn start_once<E>(&mut self, delay: Duration, on_end: E) -> Result<(), TimerError>
    where
        E: FnOnce() + Send + 'static,
    {
        self.start(1, delay, |_| {}, on_end)
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.store(false, Ordering::SeqCst);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.load(Ordering::SeqCst))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl FnMut(u32) + Send + 'static) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = ticks.clone();
        (ticks, move |remaining| sink.lock().unwrap().push(remaining))
    }

    fn end_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let ends = Arc::new(AtomicUsize::new(0));
        let sink = ends.clone();
        (ends, move || {
            sink.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_then_ends() {
        let (ticks, on_tick) = recorder();
        let (ends, on_end) = end_counter();
        let mut timer = Timer::new();
        timer.start(3, Duration::from_secs(1), on_tick, on_end).unwrap();
        assert!(timer.is_active());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*ticks.lock().unwrap(), vec![3, 2, 1]);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_run_never_ends() {
        let (ticks, on_tick) = recorder();
        let (ends, on_end) = end_counter();
        let mut timer = Timer::new();
        timer.start(5, Duration::from_secs(1), on_tick, on_end).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        timer.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*ticks.lock().unwrap(), vec![5, 4]);
        assert_eq!(ends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_run() {
        let (first_ends, first_end) = end_counter();
        let (second_ends, second_end) = end_counter();
        let mut timer = Timer::new();
        timer.start_once(Duration::from_secs(2), first_end).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        timer.start_once(Duration::from_secs(2), second_end).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(first_ends.load(Ordering::SeqCst), 0);
        assert_eq!(second_ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_stops_the_run() {
        let (ends, on_end) = end_counter();
        {
            let mut timer = Timer::new();
            timer.start_once(Duration::from_secs(1), on_end).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(ends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn needs_a_runtime() {
        let mut timer = Timer::new();
        assert_eq!(
            timer.start_once(Duration::from_secs(1), || {}),
            Err(TimerError::NoRuntime)
        );
    }
}
