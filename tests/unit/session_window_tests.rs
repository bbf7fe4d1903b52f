use chrono::NaiveTime;
use session_supervisor::models::session_window::{in_session, parse_time_of_day, SessionWindow};
use session_supervisor::AppError;

fn t(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

fn day() -> SessionWindow {
    SessionWindow::new("day", t(8, 45, 0), t(19, 30, 0))
}

fn night() -> SessionWindow {
    SessionWindow::new("night", t(20, 45, 0), t(2, 45, 0))
}

#[test]
fn plain_window_includes_both_bounds() {
    let w = day();
    assert!(w.contains(t(8, 45, 0)));
    assert!(w.contains(t(19, 30, 0)));
    assert!(w.contains(t(12, 0, 0)));
    assert!(!w.contains(t(8, 44, 59)));
    assert!(!w.contains(t(19, 30, 1)));
}

#[test]
fn wrapping_window_covers_both_sides_of_midnight() {
    let w = SessionWindow::new("late", t(22, 0, 0), t(2, 0, 0));
    assert!(w.wraps_midnight());
    assert!(w.contains(t(23, 0, 0)));
    assert!(w.contains(t(1, 0, 0)));
    assert!(w.contains(t(0, 0, 0)));
    assert!(w.contains(t(22, 0, 0)));
    assert!(w.contains(t(2, 0, 0)));
    assert!(!w.contains(t(3, 0, 0)));
    assert!(!w.contains(t(21, 59, 59)));
}

#[test]
fn plain_window_does_not_wrap() {
    assert!(!day().wraps_midnight());
}

#[test]
fn instant_window_contains_only_its_instant() {
    let w = SessionWindow::new("tick", t(9, 0, 0), t(9, 0, 0));
    assert!(w.contains(t(9, 0, 0)));
    assert!(!w.contains(t(9, 0, 1)));
    assert!(!w.contains(t(8, 59, 59)));
}

#[test]
fn futures_sessions_schedule() {
    let windows = [day(), night()];
    assert!(in_session(t(10, 0, 0), &windows));
    assert!(in_session(t(23, 30, 0), &windows));
    assert!(in_session(t(1, 15, 0), &windows));
    assert!(in_session(t(2, 45, 0), &windows));
    assert!(!in_session(t(20, 0, 0), &windows));
    assert!(!in_session(t(3, 0, 0), &windows));
    assert!(!in_session(t(8, 0, 0), &windows));
    assert!(!in_session(t(19, 30, 1), &windows));
}

#[test]
fn empty_window_list_is_never_in_session() {
    assert!(!in_session(t(12, 0, 0), &[]));
    assert!(!in_session(t(0, 0, 0), &[]));
}

#[test]
fn display_shows_name_and_bounds() {
    assert_eq!(night().to_string(), "night 20:45:00-02:45:00");
}

#[test]
fn parse_accepts_minutes_and_seconds_forms() {
    assert_eq!(parse_time_of_day("08:45").unwrap(), t(8, 45, 0));
    assert_eq!(parse_time_of_day("19:30:15").unwrap(), t(19, 30, 15));
    assert_eq!(parse_time_of_day(" 02:45 ").unwrap(), t(2, 45, 0));
}

#[test]
fn parse_rejects_garbage() {
    for raw in ["", "8.45", "25:00", "noon", "12:60"] {
        let err = parse_time_of_day(raw).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "{raw}: {err}");
    }
}
