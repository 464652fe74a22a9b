use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use dagr_core::layout::{layout_day, layout_week, week_range, LayoutConfig};
use dagr_core::CalendarEvent;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 17).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day().and_hms_opt(hour, minute, 0).unwrap())
}

fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent::new(id, id, start, end, "emerald", true).unwrap()
}

/// A busy Wednesday: a standup, a cluster of three mutually overlapping
/// meetings, two back-to-back blocks that only touch, and a lunch.
fn busy_day() -> Vec<CalendarEvent> {
    vec![
        event("standup", at(8, 0), at(8, 15)),
        event("review", at(10, 0), at(11, 30)),
        event("design", at(10, 15), at(11, 0)),
        event("client", at(10, 30), at(11, 15)),
        event("lunch", at(12, 0), at(13, 0)),
        event("focus-1", at(14, 0), at(15, 0)),
        event("focus-2", at(15, 0), at(16, 0)),
    ]
}

#[test]
fn isolated_events_take_the_full_column() {
    let events = busy_day();
    let placements = layout_day(&events, day(), &Utc, &LayoutConfig::default());

    for id in ["standup", "lunch", "focus-1", "focus-2"] {
        let p = placements.iter().find(|p| p.event_id == id).unwrap();
        assert_eq!(p.width, 100.0, "{} should be full width", id);
        assert_eq!(p.left, 0.0, "{} should start at the left edge", id);
        assert_eq!(p.lanes, 1);
    }
}

#[test]
fn mutually_overlapping_events_get_distinct_equal_lanes() {
    let events = busy_day();
    let placements = layout_day(&events, day(), &Utc, &LayoutConfig::default());

    let mut cluster: Vec<_> = placements
        .iter()
        .filter(|p| ["review", "design", "client"].contains(&p.event_id.as_str()))
        .collect();
    cluster.sort_by(|a, b| a.left.partial_cmp(&b.left).unwrap());

    let lefts: Vec<f64> = cluster.iter().map(|p| p.left).collect();
    assert_eq!(lefts, vec![0.0, 100.0 / 3.0, 200.0 / 3.0]);
    assert!(cluster.iter().all(|p| p.width == 100.0 / 3.0));

    let order: Vec<&str> = cluster.iter().map(|p| p.event_id.as_str()).collect();
    assert_eq!(order, vec!["review", "design", "client"]);
}

#[test]
fn layout_is_idempotent() {
    let events = busy_day();
    let config = LayoutConfig::default();

    let first = layout_week(&events, day(), &Los_Angeles, &config);
    let second = layout_week(&events, day(), &Los_Angeles, &config);
    assert_eq!(first, second);
}

#[test]
fn every_visible_event_is_placed_exactly_once() {
    let events = busy_day();
    let placements = layout_day(&events, day(), &Utc, &LayoutConfig::default());

    assert_eq!(placements.len(), events.len());
    for e in &events {
        assert_eq!(placements.iter().filter(|p| p.event_id == e.id).count(), 1);
    }
}

#[test]
fn wall_clock_geometry_across_fall_back() {
    // 00:30 PDT to 03:30 PST on the night clocks go back: four real hours,
    // three hours of wall clock.
    let start = Utc.with_ymd_and_hms(2025, 11, 2, 7, 30, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 11, 2, 11, 30, 0).unwrap();
    let events = vec![event("night", start, end)];
    let date = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap();

    let placements = layout_day(&events, date, &Los_Angeles, &LayoutConfig::default());
    assert_eq!(placements[0].top, 50.0);
    assert_eq!(placements[0].height, 300.0);
}

#[test]
fn week_range_uses_local_midnights() {
    let (from, to) = week_range(day(), &Los_Angeles);
    assert_eq!(from, Utc.with_ymd_and_hms(2025, 9, 15, 7, 0, 0).unwrap());
    assert_eq!(to - from, Duration::days(7));
}
