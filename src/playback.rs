use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::command::Command;

/// Cursor over a timeline of snapshots.
///
/// `index` stays inside `[0, len - 1]` whenever `len > 0` and is `0` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playback {
    index: usize,
    len: usize,
    playing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackChange {
    Started,
    Paused,
    /// Nothing to play.
    Ignored,
}

impl Playback {
    pub fn new() -> Self {
        Playback::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn last_index(&self) -> usize {
        self.len.saturating_sub(1)
    }

    /// Loads a new timeline: rewinds and stops.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.index = 0;
        self.playing = false;
    }

    pub fn toggle(&mut self) -> PlaybackChange {
        if self.playing {
            self.playing = false;
            return PlaybackChange::Paused;
        }
        if self.is_empty() {
            return PlaybackChange::Ignored;
        }
        self.playing = true;
        PlaybackChange::Started
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// One timer step. Returns `false` once playback has stopped, which
    /// happens on the tick that finds the cursor on the last index.
    pub fn advance(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        if self.index < self.last_index() {
            self.index += 1;
            true
        } else {
            self.playing = false;
            false
        }
    }

    /// Manual positioning; always pauses.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.last_index());
        self.playing = false;
    }

    pub fn step(&mut self, delta: isize) {
        let target = self.index.saturating_add_signed(delta);
        self.seek(target);
    }
}

/// The single playback ticker. Starting it again replaces the running task.
///
/// Each start gets a fresh generation so ticks already queued by an earlier
/// run can be told apart from the current one.
#[derive(Debug, Default)]
pub struct PlaybackTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl PlaybackTimer {
    pub fn new() -> Self {
        PlaybackTimer::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a tick of `generation` comes from the running timer.
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_running() && generation == self.generation
    }

    pub fn start(&mut self, period: Duration, tx: broadcast::Sender<Command>) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the cursor should hold
            // for one full period before moving.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(Command::PlaybackTick(generation)).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PlaybackTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timeline_cannot_play() {
        let mut playback = Playback::new();
        assert_eq!(playback.toggle(), PlaybackChange::Ignored);
        assert!(!playback.is_playing());
        playback.seek(5);
        assert_eq!(playback.index(), 0);
    }

    #[test]
    fn plays_to_the_end_then_stops() {
        let mut playback = Playback::new();
        playback.reset(3);
        assert_eq!(playback.toggle(), PlaybackChange::Started);
        assert!(playback.advance());
        assert!(playback.advance());
        assert_eq!(playback.index(), 2);
        assert!(playback.is_playing());
        assert!(!playback.advance());
        assert!(!playback.is_playing());
        assert_eq!(playback.index(), 2);
        assert!(!playback.advance());
        assert_eq!(playback.index(), 2);
    }

    #[test]
    fn toggle_pauses_a_running_playback() {
        let mut playback = Playback::new();
        playback.reset(4);
        playback.toggle();
        playback.advance();
        assert_eq!(playback.toggle(), PlaybackChange::Paused);
        assert!(!playback.advance());
        assert_eq!(playback.index(), 1);
    }

    #[test]
    fn seek_clamps_and_pauses() {
        let mut playback = Playback::new();
        playback.reset(3);
        playback.toggle();
        playback.seek(2);
        assert_eq!(playback.index(), 2);
        assert!(!playback.is_playing());
        playback.seek(99);
        assert_eq!(playback.index(), 2);
        playback.step(-5);
        assert_eq!(playback.index(), 0);
        playback.step(1);
        assert_eq!(playback.index(), 1);
    }

    #[test]
    fn reset_rewinds_and_stops() {
        let mut playback = Playback::new();
        playback.reset(10);
        playback.seek(7);
        playback.toggle();
        playback.reset(2);
        assert_eq!(playback.index(), 0);
        assert_eq!(playback.len(), 2);
        assert!(!playback.is_playing());
        playback.reset(0);
        assert!(playback.is_empty());
        assert_eq!(playback.last_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_each_period_until_stopped() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut timer = PlaybackTimer::new();
        timer.start(Duration::from_millis(500), tx.clone());
        assert!(timer.is_running());

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        let mut ticks = 0;
        while let Ok(Command::PlaybackTick(generation)) = rx.try_recv() {
            assert!(timer.accepts(generation));
            ticks += 1;
        }
        assert_eq!(ticks, 2);

        timer.stop();
        assert!(!timer.is_running());
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restarted_timer_rejects_earlier_ticks() {
        let (tx, _rx) = broadcast::channel(16);
        let mut timer = PlaybackTimer::new();
        timer.start(Duration::from_millis(500), tx.clone());
        let first = timer.generation();
        assert!(timer.accepts(first));

        timer.stop();
        assert!(!timer.accepts(first));
        timer.start(Duration::from_millis(500), tx);
        assert!(!timer.accepts(first));
        assert!(timer.accepts(timer.generation()));
    }
}
