// ====================================================================================
// src/scheduler.rs - 房间阶段定时器
// ====================================================================================
use crate::round::Deadline;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio::task::JoinHandle;

struct ArmedTimer {
    deadline: Deadline,
    task: JoinHandle<()>,
}

/// Holds at most one pending deadline task per room.
///
/// The callback is responsible for checking, under the room lock, that the
/// deadline it carries is still the one stored in the round state.
#[derive(Default)]
pub struct RoundScheduler {
    timers: DashMap<String, ArmedTimer>,
}

impl RoundScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any timer for `room` with one that runs `on_fire` after `delay`.
    pub fn arm(&self, room: &str, deadline: Deadline, delay: Duration, on_fire: BoxFuture<'static, ()>) {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });

        if let Some(previous) = self.timers.insert(room.to_string(), ArmedTimer { deadline, task }) {
            tracing::debug!(room, "replacing timer armed for {}", previous.deadline.phase);
            previous.task.abort();
        }
        tracing::debug!(room, phase = %deadline.phase, delay_ms = delay.as_millis() as u64, "timer armed");
    }

    pub fn cancel(&self, room: &str) -> bool {
        match self.timers.remove(room) {
            Some((_, timer)) => {
                tracing::debug!(room, phase = %timer.deadline.phase, "timer cancelled");
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    // 定时器触发后释放自己的句柄（不 abort，回调仍在运行）
    pub fn release(&self, room: &str, deadline: Deadline) -> bool {
        self.timers
            .remove_if(room, |_, timer| timer.deadline == deadline)
            .is_some()
    }

    #[cfg(test)]
    pub fn armed(&self, room: &str) -> Option<Deadline> {
        self.timers.get(room).map(|timer| timer.deadline)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for RoundScheduler {
    fn drop(&mut self) {
        for timer in self.timers.iter() {
            timer.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;
    use chrono::Utc;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn deadline(phase: Phase) -> Deadline {
        Deadline { phase, at: Utc::now() }
    }

    fn counter_future(counter: &Arc<AtomicU32>) -> BoxFuture<'static, ()> {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = RoundScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        scheduler.arm("R", deadline(Phase::Voting), Duration::from_secs(20), counter_future(&fired));

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_timer() {
        let scheduler = RoundScheduler::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        scheduler.arm("R", deadline(Phase::Submitting), Duration::from_secs(5), counter_future(&first));
        let next = deadline(Phase::Voting);
        scheduler.arm("R", next, Duration::from_secs(10), counter_future(&second));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.armed("R"), Some(next));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let scheduler = RoundScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        scheduler.arm("R", deadline(Phase::Results), Duration::from_secs(1), counter_future(&fired));

        assert!(scheduler.cancel("R"));
        assert!(!scheduler.cancel("R"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn release_only_matches_its_own_deadline() {
        let scheduler = RoundScheduler::new();
        let current = deadline(Phase::Voting);
        scheduler.arm("R", current, Duration::from_secs(60), async {}.boxed());

        assert!(!scheduler.release("R", deadline(Phase::Submitting)));
        assert!(scheduler.release("R", current));
        assert!(scheduler.armed("R").is_none());
    }
}
