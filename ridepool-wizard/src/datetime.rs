//! Nested date/time picker.
//!
//! ```text
//! CalendarMonth --day--> DaySelected --hour--> MinutePicker --min--> Confirm
//!                            |  \--"HH:MM"-----------------------------^
//!                            \--flex-----------------------------------^
//! ```
//! `cancel` anywhere aborts the enclosing wizard.

use crate::command::Command;
use crate::prompt::{Prompt, PromptOption};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::{Departure, FlexSlot};
use serde::{Deserialize, Serialize};

pub const MINUTE_STEP: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DateTimeState {
    CalendarMonth { year: i32, month: u32 },
    DaySelected { date: NaiveDate },
    MinutePicker { date: NaiveDate, hour: u32 },
    Confirm { departure: Departure },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Command(Command),
    Text(String),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOutcome {
    Continue,
    Done(Departure),
    Abort,
}

/// Previous calendar month with year rollover.
pub fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Next calendar month with year rollover.
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = next_month(year, month);
    match (NaiveDate::from_ymd_opt(ny, nm, 1), NaiveDate::from_ymd_opt(year, month, 1)) {
        (Some(next), Some(first)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

/// Parses `H:MM` or `HH:MM` with 0..=23 hours and 0..=59 minutes.
pub fn parse_clock(text: &str) -> Option<(u32, u32)> {
    let (h, m) = text.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    if !h.chars().all(|c| c.is_ascii_digit()) || !m.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeMachine {
    state: DateTimeState,
}

impl DateTimeMachine {
    /// Opens on the calendar of the month containing `today`.
    pub fn start(today: NaiveDate) -> Self {
        Self {
            state: DateTimeState::CalendarMonth {
                year: today.year(),
                month: today.month(),
            },
        }
    }

    pub fn state(&self) -> DateTimeState {
        self.state
    }

    /// Feeds one input. Validation problems come back as
    /// `CoreError::Validation` and leave the state untouched.
    pub fn handle(&mut self, input: DateInput, now: NaiveDateTime) -> CoreResult<DateOutcome> {
        let today = now.date();
        let command = match input {
            DateInput::Cancel | DateInput::Command(Command::Cancel) => return Ok(DateOutcome::Abort),
            DateInput::Command(c) => c,
            DateInput::Text(text) => return self.handle_text(&text, now),
        };

        match (self.state, command) {
            (DateTimeState::CalendarMonth { year, month }, Command::CalendarPrev) => {
                let (y, m) = prev_month(year, month);
                self.state = DateTimeState::CalendarMonth { year: y, month: m };
            }
            (DateTimeState::CalendarMonth { year, month }, Command::CalendarNext) => {
                let (y, m) = next_month(year, month);
                self.state = DateTimeState::CalendarMonth { year: y, month: m };
            }
            (DateTimeState::CalendarMonth { .. }, Command::Day(date)) => {
                if date < today {
                    return Err(CoreError::Validation("that day is in the past".to_string()));
                }
                self.state = DateTimeState::DaySelected { date };
            }
            (DateTimeState::DaySelected { date }, Command::Hour(hour)) => {
                if date == today && hour < now.hour() {
                    return Err(CoreError::Validation("that hour has already passed".to_string()));
                }
                self.state = DateTimeState::MinutePicker { date, hour };
            }
            (DateTimeState::DaySelected { date }, Command::Flex(slot)) => {
                let departure = Departure::flexible(date, slot)
                    .ok_or_else(|| CoreError::Internal(format!("no representative time for {}", slot)))?;
                self.state = DateTimeState::Confirm { departure };
            }
            (DateTimeState::DaySelected { date }, Command::Back) => {
                self.state = DateTimeState::CalendarMonth {
                    year: date.year(),
                    month: date.month(),
                };
            }
            (DateTimeState::MinutePicker { date, hour }, Command::Minute(minute)) => {
                self.set_exact(date, hour, minute, now)?;
            }
            (DateTimeState::MinutePicker { date, .. }, Command::Back) => {
                self.state = DateTimeState::DaySelected { date };
            }
            (DateTimeState::Confirm { departure }, Command::DateTimeConfirm) => {
                return Ok(DateOutcome::Done(departure));
            }
            (DateTimeState::Confirm { .. }, Command::DateTimeChange) => {
                *self = Self::start(today);
            }
            (state, command) => {
                return Err(CoreError::Validation(format!(
                    "'{}' is not available in {}",
                    command,
                    state_name(&state)
                )));
            }
        }
        Ok(DateOutcome::Continue)
    }

    fn handle_text(&mut self, text: &str, now: NaiveDateTime) -> CoreResult<DateOutcome> {
        let date = match self.state {
            DateTimeState::DaySelected { date } | DateTimeState::MinutePicker { date, .. } => date,
            _ => return Err(CoreError::Validation("pick a day first".to_string())),
        };
        let (hour, minute) =
            parse_clock(text).ok_or_else(|| CoreError::Validation("enter the time as HH:MM".to_string()))?;
        self.set_exact(date, hour, minute, now)?;
        Ok(DateOutcome::Continue)
    }

    fn set_exact(&mut self, date: NaiveDate, hour: u32, minute: u32, now: NaiveDateTime) -> CoreResult<()> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| CoreError::Validation("invalid time".to_string()))?;
        let at = date.and_time(time);
        if at < now {
            return Err(CoreError::Validation("that time has already passed".to_string()));
        }
        self.state = DateTimeState::Confirm {
            departure: Departure::exact(at),
        };
        Ok(())
    }

    /// Options for the current state. Past days and hours are disabled.
    pub fn prompt(&self, now: NaiveDateTime) -> Prompt {
        let today = now.date();
        match self.state {
            DateTimeState::CalendarMonth { year, month } => {
                let mut options = vec![
                    PromptOption::new(Command::CalendarPrev, "<"),
                    PromptOption::new(Command::CalendarNext, ">"),
                ];
                for day in 1..=days_in_month(year, month) {
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                        options.push(PromptOption::new(Command::Day(date), day.to_string()).enabled(date >= today));
                    }
                }
                Prompt::new("datetime.calendar")
                    .with_context("year", year)
                    .with_context("month", month)
                    .with_options(options)
            }
            DateTimeState::DaySelected { date } => {
                let mut options: Vec<PromptOption> = (0..24)
                    .map(|h| {
                        PromptOption::new(Command::Hour(h), format!("{:02}", h))
                            .enabled(date > today || h >= now.hour())
                    })
                    .collect();
                options.extend(
                    FlexSlot::all()
                        .into_iter()
                        .map(|slot| PromptOption::new(Command::Flex(slot), slot.as_str())),
                );
                options.push(PromptOption::new(Command::Back, "back"));
                Prompt::new("datetime.hour")
                    .with_context("date", date.format("%Y-%m-%d").to_string())
                    .with_options(options)
                    .accepts_text()
            }
            DateTimeState::MinutePicker { date, hour } => {
                let mut options: Vec<PromptOption> = (0..60)
                    .step_by(MINUTE_STEP as usize)
                    .map(|m| {
                        let open = date.and_hms_opt(hour, m, 0).map(|at| at >= now).unwrap_or(false);
                        PromptOption::new(Command::Minute(m), format!("{:02}:{:02}", hour, m)).enabled(open)
                    })
                    .collect();
                options.push(PromptOption::new(Command::Back, "back"));
                Prompt::new("datetime.minute")
                    .with_context("date", date.format("%Y-%m-%d").to_string())
                    .with_options(options)
                    .accepts_text()
            }
            DateTimeState::Confirm { departure } => Prompt::new("datetime.confirm")
                .with_context("departure", departure.describe())
                .with_context("flex", departure.flex.is_some())
                .with_options(vec![
                    PromptOption::new(Command::DateTimeConfirm, "confirm"),
                    PromptOption::new(Command::DateTimeChange, "change"),
                ]),
        }
    }
}

fn state_name(state: &DateTimeState) -> &'static str {
    match state {
        DateTimeState::CalendarMonth { .. } => "the calendar",
        DateTimeState::DaySelected { .. } => "the hour picker",
        DateTimeState::MinutePicker { .. } => "the minute picker",
        DateTimeState::Confirm { .. } => "the confirmation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 12, 15).unwrap().and_hms_opt(10, 20, 0).unwrap()
    }

    fn cmd(c: Command) -> DateInput {
        DateInput::Command(c)
    }

    #[test]
    fn test_month_rollover() {
        assert_eq!(next_month(2026, 12), (2027, 1));
        assert_eq!(prev_month(2027, 1), (2026, 12));
        assert_eq!(days_in_month(2028, 2), 29);
        assert_eq!(days_in_month(2026, 2), 28);
    }

    proptest! {
        #[test]
        fn prev_then_next_is_identity(year in 1900i32..2200, month in 1u32..=12) {
            let (py, pm) = prev_month(year, month);
            prop_assert_eq!(next_month(py, pm), (year, month));
            let (ny, nm) = next_month(year, month);
            prop_assert_eq!(prev_month(ny, nm), (year, month));
        }
    }

    #[test]
    fn test_exact_time_path() {
        let mut m = DateTimeMachine::start(now().date());
        m.handle(cmd(Command::CalendarNext), now()).unwrap();
        assert_eq!(m.state(), DateTimeState::CalendarMonth { year: 2027, month: 1 });

        let day = NaiveDate::from_ymd_opt(2027, 1, 4).unwrap();
        m.handle(cmd(Command::Day(day)), now()).unwrap();
        m.handle(cmd(Command::Hour(7)), now()).unwrap();
        m.handle(cmd(Command::Minute(45)), now()).unwrap();
        let out = m.handle(cmd(Command::DateTimeConfirm), now()).unwrap();
        assert_eq!(out, DateOutcome::Done(Departure::exact(day.and_hms_opt(7, 45, 0).unwrap())));
    }

    #[test]
    fn test_flex_keeps_marker() {
        let mut m = DateTimeMachine::start(now().date());
        let day = NaiveDate::from_ymd_opt(2026, 12, 20).unwrap();
        m.handle(cmd(Command::Day(day)), now()).unwrap();
        m.handle(cmd(Command::Flex(FlexSlot::Afternoon)), now()).unwrap();
        match m.handle(cmd(Command::DateTimeConfirm), now()).unwrap() {
            DateOutcome::Done(dep) => {
                assert_eq!(dep.flex, Some(FlexSlot::Afternoon));
                assert_eq!(dep.at.hour(), 14);
                let json = serde_json::to_string(&dep).unwrap();
                let back: Departure = serde_json::from_str(&json).unwrap();
                assert_eq!(back.flex, Some(FlexSlot::Afternoon));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_past_day_and_time_rejected() {
        let mut m = DateTimeMachine::start(now().date());
        let yesterday = NaiveDate::from_ymd_opt(2026, 12, 14).unwrap();
        assert!(m.handle(cmd(Command::Day(yesterday)), now()).is_err());
        assert_eq!(m.state(), DateTimeState::CalendarMonth { year: 2026, month: 12 });

        m.handle(cmd(Command::Day(now().date())), now()).unwrap();
        assert!(m.handle(cmd(Command::Hour(9)), now()).is_err());
        assert!(m.handle(DateInput::Text("10:15".into()), now()).is_err());
        m.handle(DateInput::Text("10:25".into()), now()).unwrap();
        assert!(matches!(m.state(), DateTimeState::Confirm { .. }));
    }

    #[test]
    fn test_free_text_validation() {
        assert_eq!(parse_clock("7:05"), Some((7, 5)));
        assert_eq!(parse_clock("23:59"), Some((23, 59)));
        assert_eq!(parse_clock("24:00"), None);
        assert_eq!(parse_clock("12:60"), None);
        assert_eq!(parse_clock("12:5"), None);
        assert_eq!(parse_clock("noon"), None);

        let mut m = DateTimeMachine::start(now().date());
        m.handle(cmd(Command::Day(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap())), now())
            .unwrap();
        assert!(m.handle(DateInput::Text("25:00".into()), now()).is_err());
        assert!(matches!(m.state(), DateTimeState::DaySelected { .. }));
    }

    #[test]
    fn test_change_restarts_at_current_month_and_cancel_aborts() {
        let mut m = DateTimeMachine::start(now().date());
        m.handle(cmd(Command::CalendarNext), now()).unwrap();
        m.handle(cmd(Command::CalendarNext), now()).unwrap();
        m.handle(cmd(Command::Day(NaiveDate::from_ymd_opt(2027, 2, 2).unwrap())), now())
            .unwrap();
        m.handle(cmd(Command::Flex(FlexSlot::Morning)), now()).unwrap();
        m.handle(cmd(Command::DateTimeChange), now()).unwrap();
        assert_eq!(m.state(), DateTimeState::CalendarMonth { year: 2026, month: 12 });

        assert_eq!(m.handle(DateInput::Cancel, now()).unwrap(), DateOutcome::Abort);
    }

    #[test]
    fn test_back_from_hour_picker_shows_selected_month() {
        let mut m = DateTimeMachine::start(now().date());
        let day = NaiveDate::from_ymd_opt(2027, 3, 9).unwrap();
        m.handle(cmd(Command::Day(day)), now()).unwrap();
        m.handle(cmd(Command::Back), now()).unwrap();
        assert_eq!(m.state(), DateTimeState::CalendarMonth { year: 2027, month: 3 });
    }

    #[test]
    fn test_calendar_prompt_disables_past_days() {
        let m = DateTimeMachine::start(now().date());
        let prompt = m.prompt(now());
        let day14 = prompt.options.iter().find(|o| o.token == "day:2026-12-14").unwrap();
        let day15 = prompt.options.iter().find(|o| o.token == "day:2026-12-15").unwrap();
        assert!(!day14.enabled);
        assert!(day15.enabled);
    }
}
