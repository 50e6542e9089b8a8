//! Local daily scheduler.

use async_trait::async_trait;
use pipeline::{DailySchedule, EventSource, Timestamp, TriggerEvent};
use tracing::info;

/// Emits a [`TriggerEvent::Schedule`] at every fire time of a schedule.
#[derive(Debug, Clone)]
pub struct ScheduleEventSource {
    schedule: DailySchedule,
    last_fired: Option<Timestamp>,
}

impl ScheduleEventSource {
    pub fn new(schedule: DailySchedule) -> Self {
        Self { schedule, last_fired: None }
    }

    /// The next fire time after `now`, never repeating the previous one.
    pub fn next_fire_time(&self, now: Timestamp) -> Timestamp {
        let from = match self.last_fired {
            Some(last) if last > now => last,
            _ => now,
        };
        self.schedule.next_after(from)
    }
}

#[async_trait]
impl EventSource for ScheduleEventSource {
    async fn next_event(&mut self) -> Option<TriggerEvent> {
        let now = Timestamp::now();
        let fire_at = self.next_fire_time(now);
        info!(next_run = %fire_at, schedule = %self.schedule, "Waiting for next scheduled run");
        tokio::time::sleep(now.until(fire_at)).await;

        self.last_fired = Some(fire_at);
        Some(TriggerEvent::Schedule { cron: Some(self.schedule.expression().to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(h: u32, m: u32) -> Timestamp {
        Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap())
    }

    #[test]
    fn fire_time_never_repeats_after_an_early_wake() {
        let mut source = ScheduleEventSource::new(DailySchedule::parse("0 6 * * *").unwrap());
        assert_eq!(source.next_fire_time(at(5, 0)), at(6, 0));

        source.last_fired = Some(at(6, 0));
        let next = source.next_fire_time(at(5, 59));
        assert_eq!(next.as_datetime(), at(6, 0).as_datetime() + chrono::Duration::days(1));
    }

    #[tokio::test(start_paused = true)]
    async fn yields_the_configured_cron() {
        let mut source = ScheduleEventSource::new(DailySchedule::parse("30 2 * * *").unwrap());
        let event = source.next_event().await;
        assert_eq!(event, Some(TriggerEvent::Schedule { cron: Some("30 2 * * *".into()) }));
    }
}
