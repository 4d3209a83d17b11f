use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::BiddingApi;
use crate::command::Command;
use crate::config::ConfiguredTimeZone;
use crate::row::Row;

const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Daily time-of-day range in which realtime polling runs. Both ends are
/// inclusive, compared at whole-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl RealtimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        RealtimeWindow { start, end }
    }

    /// The 09:15:00-09:25:00 call auction.
    pub fn auction() -> Self {
        RealtimeWindow {
            start: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(9, 25, 0).unwrap_or_default(),
        }
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        let now = now.with_nanosecond(0).unwrap_or(now);
        self.start <= now && now <= self.end
    }

    pub fn label(&self) -> String {
        format!(
            "{}-{}",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Deactivate,
}

/// Inactive/active switch driven only by the clock.
#[derive(Debug, Clone)]
pub struct RealtimeGate {
    window: RealtimeWindow,
    active: bool,
}

impl RealtimeGate {
    pub fn new(window: RealtimeWindow) -> Self {
        RealtimeGate {
            window,
            active: false,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Reports a transition only when the state actually changes.
    pub fn evaluate(&mut self, now: NaiveTime) -> Option<Transition> {
        match (self.active, self.window.contains(now)) {
            (false, true) => {
                self.active = true;
                Some(Transition::Activate)
            }
            (true, false) => {
                self.active = false;
                Some(Transition::Deactivate)
            }
            _ => None,
        }
    }
}

/// Rows shown on the realtime board: unnamed and ST entries are dropped.
pub fn board_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .filter(|row| row.name.is_some() && !row.is_special_treatment())
        .collect()
}

/// Owns the realtime poll task and switches it on and off with the window.
pub struct RealtimeMonitor {
    api: BiddingApi,
    gate: RealtimeGate,
    timezone: ConfiguredTimeZone,
    poll_interval: Duration,
    /// Bumped on every transition; rows from an older poller are ignored.
    generation: u64,
    poller: Option<JoinHandle<()>>,
    tx: broadcast::Sender<Command>,
    rx: broadcast::Receiver<Command>,
}

impl RealtimeMonitor {
    pub fn new(
        api: BiddingApi,
        window: RealtimeWindow,
        timezone: ConfiguredTimeZone,
        poll_interval: Duration,
        tx: broadcast::Sender<Command>,
        rx: broadcast::Receiver<Command>,
    ) -> RealtimeMonitor {
        RealtimeMonitor {
            api,
            gate: RealtimeGate::new(window),
            timezone,
            poll_interval,
            generation: 0,
            poller: None,
            tx,
            rx,
        }
    }

    #[cfg(test)]
    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    pub async fn run(&mut self) -> Result<(), anyhow::Error> {
        tracing::info!(
            window = %self.gate.window.label(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "realtime monitor started"
        );
        publish_rows(&self.api, &self.tx, self.generation).await;
        let mut check = tokio::time::interval(CHECK_INTERVAL);
        check.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            let now = tokio::select! {
                _ = check.tick() => Some(self.timezone.time_of_day()),
                message = self.rx.recv() => match message {
                    Ok(Command::Exit) | Err(RecvError::Closed) => None,
                    _ => continue,
                },
            };
            let Some(now) = now else {
                break;
            };
            self.apply(now);
        }
        self.stop_poller();
        Ok(())
    }

    /// Evaluates the window at `now` and starts or stops polling on a
    /// transition.
    pub fn apply(&mut self, now: NaiveTime) -> Option<Transition> {
        let transition = self.gate.evaluate(now)?;
        self.stop_poller();
        self.generation += 1;
        let generation = self.generation;
        match transition {
            Transition::Activate => {
                tracing::info!(at = %now.format("%H:%M:%S"), generation, "entering realtime window");
                let _ = self.tx.send(Command::RealtimeActive(generation, true));
                self.poller = Some(spawn_poller(
                    self.api.clone(),
                    self.tx.clone(),
                    self.poll_interval,
                    generation,
                ));
            }
            Transition::Deactivate => {
                tracing::info!(at = %now.format("%H:%M:%S"), generation, "leaving realtime window");
                let _ = self.tx.send(Command::RealtimeActive(generation, false));
                let _ = self.tx.send(Command::RealtimeRows(generation, Vec::new()));
            }
        }
        Some(transition)
    }

    fn stop_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

impl Drop for RealtimeMonitor {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

fn spawn_poller(
    api: BiddingApi,
    tx: broadcast::Sender<Command>,
    period: Duration,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !publish_rows(&api, &tx, generation).await {
                break;
            }
        }
    })
}

/// Fetches once and publishes the board. Failures publish an empty board.
/// Returns `false` when nobody listens anymore.
async fn publish_rows(
    api: &BiddingApi,
    tx: &broadcast::Sender<Command>,
    generation: u64,
) -> bool {
    let rows = match api.fetch_realtime().await {
        Ok(rows) => board_rows(rows),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "realtime fetch failed");
            Vec::new()
        }
    };
    tx.send(Command::RealtimeRows(generation, rows)).is_ok()
}
