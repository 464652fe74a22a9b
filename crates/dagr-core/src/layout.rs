//! Weekly calendar grid layout.
//!
//! The grid is seven day columns of 24 hour rows. For one day column this
//! module selects the events visible on that date, groups the ones whose
//! intervals overlap, and assigns every event a rectangle: vertical geometry
//! in pixels (from the hour height) and horizontal geometry as percentages of
//! the column width, one equal-width lane per member of its overlap group.
//!
//! Instants are projected into the caller's time zone before anything is
//! measured, so a day column always covers local midnight to local midnight.
//! All functions are pure: same events, date and zone in, same geometry out.

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::CalendarEvent;

/// Height of each hour cell in pixels
pub const HOUR_HEIGHT: f64 = 100.0;
/// Width of the time column
pub const TIME_COLUMN_WIDTH: f64 = 48.0;
/// Height of the day header
pub const HEADER_HEIGHT: f64 = 33.0;
/// Minimum width for each day column
pub const MIN_DAY_WIDTH: f64 = 150.0;

const HOURS_IN_DAY: f64 = 24.0;
const DAYS_IN_WEEK: usize = 7;
const SECONDS_IN_DAY: f64 = 86_400.0;
/// The initial scroll position shows this many hours before "now".
const SCROLL_LEAD_HOURS: f64 = 2.0;

/// Fixed dimensions of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub hour_height: f64,
    pub time_column_width: f64,
    pub header_height: f64,
    pub min_day_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            hour_height: HOUR_HEIGHT,
            time_column_width: TIME_COLUMN_WIDTH,
            header_height: HEADER_HEIGHT,
            min_day_width: MIN_DAY_WIDTH,
        }
    }
}

impl LayoutConfig {
    pub fn day_height(&self) -> f64 {
        HOURS_IN_DAY * self.hour_height
    }

    pub fn grid_height(&self) -> f64 {
        self.day_height() + self.header_height
    }

    pub fn min_grid_width(&self) -> f64 {
        self.time_column_width + DAYS_IN_WEEK as f64 * self.min_day_width
    }
}

/// Where one event is drawn inside one day column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPlacement {
    pub event_id: String,
    /// Pixels from the top of the day column.
    pub top: f64,
    /// Pixels; never negative.
    pub height: f64,
    /// Percent of the column width.
    pub left: f64,
    /// Percent of the column width.
    pub width: f64,
    /// Zero-based lane within the overlap group.
    pub lane: usize,
    /// Size of the overlap group.
    pub lanes: usize,
    pub starts_today: bool,
    pub ends_today: bool,
    pub multi_day: bool,
    /// Multi-day event carried over from an earlier day.
    pub is_continuation: bool,
    /// The event ends at or before its start and was drawn with zero height.
    pub degenerate: bool,
}

impl EventPlacement {
    /// Inline style for an absolutely positioned block.
    pub fn css(&self) -> String {
        format!(
            "position: absolute; left: {}%; width: {}%; top: {}px; height: {}px",
            self.left, self.width, self.top, self.height
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayLayout {
    pub date: NaiveDate,
    pub placements: Vec<EventPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekLayout {
    pub week_start: NaiveDate,
    pub days: Vec<DayLayout>,
    pub grid_height: f64,
    pub min_grid_width: f64,
}

/// Initial viewport offsets for the scrollable grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub top: f64,
    pub left: f64,
}

/// Local wall-clock window of one day: `[start, end)`.
#[derive(Debug, Clone, Copy)]
struct DayWindow {
    date: NaiveDate,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DayWindow {
    fn new(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    /// Whole minutes since local midnight, truncating seconds.
    fn minutes_into(&self, at: NaiveDateTime) -> i64 {
        (at - self.start).num_minutes()
    }
}

fn local<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDateTime {
    instant.with_timezone(tz).naive_local()
}

/// Convert a local wall-clock time to an instant.
///
/// Ambiguous times (clocks falling back) resolve to the earlier instant.
/// Times skipped by a forward transition move to the first valid time after
/// the gap.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(resolved) = tz.from_local_datetime(&naive).earliest() {
        return resolved.with_timezone(&Utc);
    }

    // Transition gaps are at most a couple of hours wide.
    let mut candidate = naive;
    for _ in 0..(3 * 60) {
        candidate += Duration::minutes(1);
        if let Some(resolved) = tz.from_local_datetime(&candidate).earliest() {
            return resolved.with_timezone(&Utc);
        }
    }
    tz.from_utc_datetime(&naive).with_timezone(&Utc)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Monday of the week containing `date`, or `None` when that week sits so
/// close to the ends of the calendar that its bounds cannot be computed.
///
/// Week helpers use unchecked date arithmetic. Dates that come from outside
/// should be passed through this first.
pub fn supported_week_start(date: NaiveDate) -> Option<NaiveDate> {
    let back = Duration::days(i64::from(date.weekday().num_days_from_monday()));
    let monday = date.checked_sub_signed(back)?;
    // A day of slack either side absorbs the zone offset when the local
    // bounds are resolved to instants.
    monday.checked_sub_signed(Duration::days(1))?;
    monday.checked_add_signed(Duration::days(DAYS_IN_WEEK as i64 + 1))?;
    Some(monday)
}

/// The seven dates of the week containing `date`, Monday first.
pub fn week_days(date: NaiveDate) -> [NaiveDate; DAYS_IN_WEEK] {
    let monday = week_start(date);
    let mut days = [monday; DAYS_IN_WEEK];
    for (offset, day) in days.iter_mut().enumerate() {
        *day = monday + Duration::days(offset as i64);
    }
    days
}

/// Instants bounding the week containing `date` in `tz`: local Monday 00:00
/// up to (excluding) the following Monday 00:00.
pub fn week_range<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let monday = week_start(date);
    let next_monday = monday + Duration::days(DAYS_IN_WEEK as i64);
    (
        resolve_local(tz, monday.and_time(NaiveTime::MIN)),
        resolve_local(tz, next_monday.and_time(NaiveTime::MIN)),
    )
}

/// Whether `event` is drawn in the column for `date`.
///
/// An event is visible if it starts on that date or its interval intersects
/// the day. Both bounds are strict, so an event ending exactly at midnight is
/// not carried into the next day.
pub fn is_visible_on<Tz: TimeZone>(event: &CalendarEvent, date: NaiveDate, tz: &Tz) -> bool {
    let window = DayWindow::new(date);
    let start = local(&event.start, tz);
    let end = local(&event.end, tz);

    start.date() == date || (start < window.end && end > window.start)
}

/// Events visible on `date`, in input order.
pub fn events_on_day<'a, Tz: TimeZone>(
    events: &'a [CalendarEvent],
    date: NaiveDate,
    tz: &Tz,
) -> Vec<&'a CalendarEvent> {
    events
        .iter()
        .filter(|event| is_visible_on(event, date, tz))
        .collect()
}

/// Partition events into overlap groups.
///
/// Groups are connected components of the overlap relation: if A overlaps B
/// and B overlaps C, all three share a group even when A and C are disjoint.
/// Groups are discovered in input order and each group is sorted by start
/// time; the sort is stable, so equal starts keep their input order.
/// Degenerate events never join a group.
pub fn overlap_groups<'a>(events: &[&'a CalendarEvent]) -> Vec<Vec<&'a CalendarEvent>> {
    let mut assigned = vec![false; events.len()];
    let mut groups = Vec::new();

    for seed in 0..events.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];

        if !events[seed].is_degenerate() {
            let mut cursor = 0;
            while cursor < members.len() {
                let current = events[members[cursor]];
                for candidate in 0..events.len() {
                    if assigned[candidate] || events[candidate].is_degenerate() {
                        continue;
                    }
                    if current.overlaps(events[candidate]) {
                        assigned[candidate] = true;
                        members.push(candidate);
                    }
                }
                cursor += 1;
            }
        }

        // Restore input order before the stable sort so ties follow the input.
        members.sort_unstable();
        let mut group: Vec<&CalendarEvent> = members.into_iter().map(|i| events[i]).collect();
        group.sort_by_key(|event| event.start);
        groups.push(group);
    }

    groups
}

/// Lay out a single day column.
///
/// Placements come back grouped: every overlap group in discovery order, and
/// within a group by lane.
pub fn layout_day<Tz: TimeZone>(
    events: &[CalendarEvent],
    date: NaiveDate,
    tz: &Tz,
    config: &LayoutConfig,
) -> Vec<EventPlacement> {
    let window = DayWindow::new(date);
    let visible = events_on_day(events, date, tz);
    let groups = overlap_groups(&visible);

    let mut placements = Vec::with_capacity(visible.len());
    for group in &groups {
        let lanes = group.len();
        for (lane, event) in group.iter().enumerate() {
            placements.push(place(event, lane, lanes, &window, tz, config));
        }
    }

    placements
}

fn place<Tz: TimeZone>(
    event: &CalendarEvent,
    lane: usize,
    lanes: usize,
    window: &DayWindow,
    tz: &Tz,
    config: &LayoutConfig,
) -> EventPlacement {
    let start = local(&event.start, tz);
    let end = local(&event.end, tz);

    let degenerate = event.is_degenerate();
    if degenerate {
        tracing::warn!(
            event_id = %event.id,
            start = %event.start,
            end = %event.end,
            "Event does not end after it starts, drawing it with zero height"
        );
    }

    let clipped_start = start.max(window.start);
    let clipped_end = end.min(window.end);

    let start_minutes = window.minutes_into(clipped_start);
    let duration_minutes = (window.minutes_into(clipped_end) - start_minutes).max(0);

    let width = 100.0 / lanes as f64;
    let starts_today = start.date() == window.date;
    let ends_today = end <= window.end;
    let multi_day = !(starts_today && ends_today);

    EventPlacement {
        event_id: event.id.clone(),
        top: start_minutes as f64 / 60.0 * config.hour_height,
        height: duration_minutes as f64 / 60.0 * config.hour_height,
        left: lane as f64 * width,
        width,
        lane,
        lanes,
        starts_today,
        ends_today,
        multi_day,
        is_continuation: multi_day && !starts_today,
        degenerate,
    }
}

/// Lay out all seven columns of the week containing `date`.
pub fn layout_week<Tz: TimeZone>(
    events: &[CalendarEvent],
    date: NaiveDate,
    tz: &Tz,
    config: &LayoutConfig,
) -> WeekLayout {
    let days = week_days(date)
        .into_iter()
        .map(|day| DayLayout {
            date: day,
            placements: layout_day(events, day, tz, config),
        })
        .collect();

    WeekLayout {
        week_start: week_start(date),
        days,
        grid_height: config.grid_height(),
        min_grid_width: config.min_grid_width(),
    }
}

/// Position of the current-time line as a fraction of the day, in `[0, 1)`.
pub fn now_indicator_offset<Tz: TimeZone>(now: &DateTime<Utc>, tz: &Tz) -> f64 {
    let local_now = local(now, tz);
    f64::from(local_now.time().num_seconds_from_midnight()) / SECONDS_IN_DAY
}

/// Where the grid should be scrolled to when first shown: a little before the
/// current hour, with today's column in view.
pub fn initial_scroll<Tz: TimeZone>(
    now: &DateTime<Utc>,
    tz: &Tz,
    config: &LayoutConfig,
) -> ScrollOffset {
    let local_now = local(now, tz);
    let hours = f64::from(local_now.hour()) + f64::from(local_now.minute()) / 60.0;
    let top = hours * config.hour_height - SCROLL_LEAD_HOURS * config.hour_height;
    let monday_offset = f64::from(local_now.weekday().num_days_from_monday());

    ScrollOffset {
        top: top.max(0.0),
        left: monday_offset * config.min_day_width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use tracing_test::traced_test;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 15).unwrap()
    }

    fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
    }

    fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: id.to_string(),
            start,
            end,
            color: "blue".to_string(),
            readonly: false,
        }
    }

    fn placement<'a>(placements: &'a [EventPlacement], id: &str) -> &'a EventPlacement {
        placements
            .iter()
            .find(|p| p.event_id == id)
            .unwrap_or_else(|| panic!("no placement for {}", id))
    }

    #[test]
    fn test_two_overlapping_and_one_free_event() {
        let day = monday();
        let events = vec![
            event("first", at(day, 9, 0), at(day, 10, 0)),
            event("second", at(day, 9, 30), at(day, 10, 30)),
            event("third", at(day, 11, 0), at(day, 12, 0)),
        ];

        let placements = layout_day(&events, day, &Utc, &LayoutConfig::default());
        assert_eq!(placements.len(), 3);

        let first = placement(&placements, "first");
        assert_eq!((first.top, first.height), (900.0, 100.0));
        assert_eq!((first.left, first.width), (0.0, 50.0));

        let second = placement(&placements, "second");
        assert_eq!((second.top, second.height), (950.0, 100.0));
        assert_eq!((second.left, second.width), (50.0, 50.0));

        let third = placement(&placements, "third");
        assert_eq!((third.top, third.height), (1100.0, 100.0));
        assert_eq!((third.left, third.width), (0.0, 100.0));
    }

    #[test]
    fn test_chain_of_overlaps_shares_one_group() {
        let day = monday();
        let a = event("a", at(day, 9, 0), at(day, 10, 0));
        let b = event("b", at(day, 9, 45), at(day, 11, 0));
        let c = event("c", at(day, 10, 30), at(day, 12, 0));
        let refs = vec![&a, &b, &c];

        let groups = overlap_groups(&refs);
        assert_eq!(groups.len(), 1);
        let ids: Vec<&str> = groups[0].iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_group_sorted_by_start_regardless_of_discovery() {
        let day = monday();
        let late = event("late", at(day, 10, 0), at(day, 12, 0));
        let early = event("early", at(day, 9, 0), at(day, 11, 0));
        let refs = vec![&late, &early];

        let groups = overlap_groups(&refs);
        let ids: Vec<&str> = groups[0].iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_equal_starts_keep_input_order() {
        let day = monday();
        let events = vec![
            event("x", at(day, 14, 0), at(day, 15, 0)),
            event("y", at(day, 14, 0), at(day, 16, 0)),
        ];

        let placements = layout_day(&events, day, &Utc, &LayoutConfig::default());
        assert_eq!(placement(&placements, "x").lane, 0);
        assert_eq!(placement(&placements, "y").lane, 1);

        let reversed: Vec<CalendarEvent> = events.into_iter().rev().collect();
        let placements = layout_day(&reversed, day, &Utc, &LayoutConfig::default());
        assert_eq!(placement(&placements, "y").lane, 0);
        assert_eq!(placement(&placements, "x").lane, 1);
    }

    #[test]
    fn test_event_ending_at_midnight_not_shown_next_day() {
        let day = monday();
        let tuesday = day.succ_opt().unwrap();
        let events = vec![event("late", at(day, 22, 0), at(tuesday, 0, 0))];

        assert!(is_visible_on(&events[0], day, &Utc));
        assert!(!is_visible_on(&events[0], tuesday, &Utc));

        let placements = layout_day(&events, day, &Utc, &LayoutConfig::default());
        assert_eq!(placements[0].height, 200.0);
        assert!(placements[0].ends_today);
        assert!(!placements[0].multi_day);
    }

    #[test]
    fn test_multi_day_event_fills_interior_day() {
        let day = monday();
        let sunday = day - Duration::days(1);
        let wednesday = day + Duration::days(2);
        let events = vec![event("trip", at(sunday, 18, 0), at(wednesday, 9, 0))];

        let tuesday = day + Duration::days(1);
        let placements = layout_day(&events, tuesday, &Utc, &LayoutConfig::default());
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].top, 0.0);
        assert_eq!(placements[0].height, 24.0 * HOUR_HEIGHT);
        assert!(placements[0].is_continuation);
        assert!(!placements[0].ends_today);

        let placements = layout_day(&events, wednesday, &Utc, &LayoutConfig::default());
        assert_eq!(placements[0].top, 0.0);
        assert_eq!(placements[0].height, 900.0);
        assert!(placements[0].ends_today);
    }

    #[test]
    fn test_degenerate_event_clamped_to_zero_height() {
        let day = monday();
        let events = vec![
            event("broken", at(day, 11, 0), at(day, 10, 0)),
            event("fine", at(day, 10, 0), at(day, 12, 0)),
        ];

        let placements = layout_day(&events, day, &Utc, &LayoutConfig::default());
        let broken = placement(&placements, "broken");
        assert!(broken.degenerate);
        assert_eq!(broken.height, 0.0);
        assert_eq!(broken.top, 1100.0);

        let fine = placement(&placements, "fine");
        assert_eq!(fine.width, 100.0);
        assert!(!fine.degenerate);
    }

    #[test]
    #[traced_test]
    fn test_degenerate_event_is_logged() {
        let day = monday();
        let events = vec![event("broken", at(day, 11, 0), at(day, 11, 0))];

        layout_day(&events, day, &Utc, &LayoutConfig::default());
        assert!(logs_contain("does not end after it starts"));
    }

    #[test]
    fn test_time_zone_projection_moves_event_between_days() {
        let day = monday();
        // 02:00 UTC Tuesday is 19:00 Monday at UTC-7.
        let tuesday = day.succ_opt().unwrap();
        let events = vec![event("evening", at(tuesday, 2, 0), at(tuesday, 3, 0))];
        let pacific = FixedOffset::west_opt(7 * 3600).unwrap();

        let placements = layout_day(&events, day, &pacific, &LayoutConfig::default());
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].top, 1900.0);
        assert!(layout_day(&events, tuesday, &pacific, &LayoutConfig::default()).is_empty());
    }

    #[test]
    fn test_seconds_are_truncated() {
        let day = monday();
        let start = Utc.from_utc_datetime(&day.and_hms_opt(9, 15, 59).unwrap());
        let events = vec![event("sec", start, at(day, 9, 45))];

        let placements = layout_day(&events, day, &Utc, &LayoutConfig::default());
        assert_eq!(placements[0].top, 925.0);
        assert_eq!(placements[0].height, 50.0);
    }

    #[test]
    fn test_custom_hour_height() {
        let day = monday();
        let events = vec![event("a", at(day, 1, 30), at(day, 2, 0))];
        let config = LayoutConfig {
            hour_height: 48.0,
            ..Default::default()
        };

        let placements = layout_day(&events, day, &Utc, &config);
        assert_eq!(placements[0].top, 72.0);
        assert_eq!(placements[0].height, 24.0);
    }

    #[test]
    fn test_week_helpers() {
        let thursday = NaiveDate::from_ymd_opt(2025, 9, 18).unwrap();
        assert_eq!(week_start(thursday), monday());
        assert_eq!(week_start(monday()), monday());

        let sunday = NaiveDate::from_ymd_opt(2025, 9, 21).unwrap();
        assert_eq!(week_start(sunday), monday());

        let days = week_days(thursday);
        assert_eq!(days[0], monday());
        assert_eq!(days[6], sunday);

        let (from, to) = week_range(thursday, &Utc);
        assert_eq!(from, at(monday(), 0, 0));
        assert_eq!(to, at(monday() + Duration::days(7), 0, 0));
    }

    #[test]
    fn test_weeks_at_the_calendar_edges_are_unsupported() {
        assert_eq!(supported_week_start(NaiveDate::MAX), None);
        assert_eq!(supported_week_start(NaiveDate::MIN), None);

        let thursday = NaiveDate::from_ymd_opt(2025, 9, 18).unwrap();
        assert_eq!(supported_week_start(thursday), Some(monday()));
    }

    #[test]
    fn test_latest_supported_week_lays_out_without_overflow() {
        let late = NaiveDate::MAX - Duration::days(30);
        let monday = supported_week_start(late).unwrap();
        let zone = chrono_tz::Pacific::Pago_Pago;

        let (from, to) = week_range(late, &zone);
        assert!(from < to);

        let week = layout_week(&[], late, &zone, &LayoutConfig::default());
        assert_eq!(week.week_start, monday);
        assert_eq!(week.days.len(), 7);
    }

    #[test]
    fn test_layout_week_dimensions() {
        let day = monday();
        let events = vec![event("a", at(day, 9, 0), at(day, 10, 0))];
        let week = layout_week(&events, day + Duration::days(3), &Utc, &LayoutConfig::default());

        assert_eq!(week.week_start, day);
        assert_eq!(week.days.len(), 7);
        assert_eq!(week.days[0].placements.len(), 1);
        assert!(week.days[1..].iter().all(|d| d.placements.is_empty()));
        assert_eq!(week.grid_height, 2433.0);
        assert_eq!(week.min_grid_width, 1098.0);
    }

    #[test]
    fn test_now_indicator_and_initial_scroll() {
        let wednesday = monday() + Duration::days(2);
        let now = at(wednesday, 6, 0);
        let config = LayoutConfig::default();

        assert_eq!(now_indicator_offset(&now, &Utc), 0.25);

        let scroll = initial_scroll(&now, &Utc, &config);
        assert_eq!(scroll.top, 400.0);
        assert_eq!(scroll.left, 300.0);

        let early = at(wednesday, 1, 0);
        assert_eq!(initial_scroll(&early, &Utc, &config).top, 0.0);
    }

    #[test]
    fn test_css_output() {
        let day = monday();
        let events = vec![event("a", at(day, 9, 0), at(day, 10, 0))];
        let placements = layout_day(&events, day, &Utc, &LayoutConfig::default());
        assert_eq!(
            placements[0].css(),
            "position: absolute; left: 0%; width: 100%; top: 900px; height: 100px"
        );
    }
}
