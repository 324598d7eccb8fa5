//! Stop-time computation
//!
//! A run must end before the next scheduled invocation starts, and never last
//! longer than the configured maximum. Evaluated once at run start.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeDelta, TimeZone, Timelike, Utc};

/// Next instant whose hour is in `schedule_hours` and strictly after the hour
/// `start` falls in. Wraps to the first scheduled hour of the next day.
///
/// Hours outside `0..24` are ignored; `None` if nothing usable remains.
pub fn next_scheduled_run<Tz: TimeZone>(start: &DateTime<Tz>, schedule_hours: &[u32]) -> Option<DateTime<Tz>> {
    let mut hours: Vec<u32> = schedule_hours.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable();
    hours.dedup();

    let current_hour = start.hour();
    let today = start.date_naive();
    let (day, hour) = match hours.iter().find(|h| **h > current_hour) {
        Some(hour) => (today, *hour),
        None => (today.succ_opt()?, *hours.first()?),
    };

    let local = day.and_hms_opt(hour, 0, 0)?;
    start.timezone().from_local_datetime(&local).earliest()
}

/// `min(next scheduled run - soft_margin, start + max_run_duration)`.
///
/// The result may already lie in the past when `start` sits inside the soft
/// margin; the caller then stops at its first check. An empty schedule yields
/// the hard deadline.
pub fn compute_stop_time<Tz: TimeZone>(
    start: &DateTime<Tz>,
    schedule_hours: &[u32],
    max_run_duration: TimeDelta,
    soft_margin: TimeDelta,
) -> DateTime<Tz> {
    let hard_deadline = start.clone() + max_run_duration;
    match next_scheduled_run(start, schedule_hours) {
        Some(next) => (next - soft_margin).min(hard_deadline),
        None => hard_deadline,
    }
}

/// The recurring schedule a crawl job runs under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSchedule {
    pub hours: Vec<u32>,
    pub max_run_duration: TimeDelta,
    pub soft_margin: TimeDelta,
    /// Offset the schedule hours and observation dates are expressed in
    pub offset: FixedOffset,
}

impl Default for RunSchedule {
    fn default() -> Self {
        Self {
            hours: vec![0, 6, 12, 18],
            max_run_duration: TimeDelta::hours(5),
            soft_margin: TimeDelta::minutes(30),
            offset: Utc.fix(),
        }
    }
}

impl RunSchedule {
    pub fn stop_time(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let local_start = start.with_timezone(&self.offset);
        compute_stop_time(&local_start, &self.hours, self.max_run_duration, self.soft_margin)
            .with_timezone(&Utc)
    }

    /// Calendar date observations recorded at `now` are filed under
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SCHEDULE: [u32; 4] = [0, 6, 12, 18];

    fn at(hh: u32, mm: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hh, mm, 0).unwrap()
    }

    #[rstest]
    #[case::soft_deadline_before_next_slot(at(14, 0), at(17, 30))]
    #[case::early_morning(at(1, 0), at(5, 30))]
    #[case::evening(at(19, 0), at(23, 30))]
    #[case::hard_deadline_wins(at(12, 30), at(17, 30))]
    #[case::equal_hour_is_not_next(at(18, 0), at(23, 0))]
    fn stop_time_matches_schedule(#[case] start: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
        let stop = compute_stop_time(&start, &SCHEDULE, TimeDelta::hours(5), TimeDelta::minutes(30));
        assert_eq!(stop, expected);
    }

    #[test]
    fn start_inside_soft_margin_yields_past_deadline() {
        let start = at(23, 59);
        let stop = compute_stop_time(&start, &SCHEDULE, TimeDelta::hours(5), TimeDelta::minutes(30));
        assert_eq!(stop, at(23, 30));
        assert!(stop < start);
    }

    #[test]
    fn wraps_to_first_slot_of_next_day() {
        let next = next_scheduled_run(&at(20, 15), &[18, 6]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 15, 6, 0, 0).unwrap());
    }

    #[test]
    fn empty_schedule_uses_hard_deadline() {
        let stop = compute_stop_time(&at(9, 0), &[], TimeDelta::hours(5), TimeDelta::minutes(30));
        assert_eq!(stop, at(14, 0));
        assert!(next_scheduled_run(&at(9, 0), &[24, 30]).is_none());
    }

    #[test]
    fn schedule_hours_follow_configured_offset() {
        // 06:00 UTC is 15:00 in UTC+9, so the next slot is 18:00 local (09:00 UTC)
        let schedule = RunSchedule {
            offset: FixedOffset::east_opt(9 * 3600).unwrap(),
            ..RunSchedule::default()
        };
        assert_eq!(schedule.stop_time(at(6, 0)), at(8, 30));
        assert_eq!(
            schedule.today(Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).unwrap()),
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
        );
    }
}
