//! Typed user commands, decoded once from `action:param` tokens.

use chrono::{NaiveDate, Weekday};
use ridepool_shared::{FlexSlot, LuggageSize, TalkPreference, TripKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripOption {
    Recurring,
    WomenOnly,
    InstantBooking,
}

impl TripOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripOption::Recurring => "recurring",
            TripOption::WomenOnly => "women_only",
            TripOption::InstantBooking => "instant_booking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    Origin,
    Destination,
    DateTime,
    Seats,
    Price,
    Preferences,
}

impl EditField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditField::Origin => "origin",
            EditField::Destination => "destination",
            EditField::DateTime => "datetime",
            EditField::Seats => "seats",
            EditField::Price => "price",
            EditField::Preferences => "preferences",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferenceChoice {
    Smoking(bool),
    Pets(bool),
    WomenOnly(bool),
    Luggage(LuggageSize),
    Talk(TalkPreference),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Role(TripKind),
    ToggleOption(TripOption),
    Next,
    Back,
    PickLocality(usize),
    CalendarPrev,
    CalendarNext,
    Day(NaiveDate),
    Hour(u32),
    Minute(u32),
    Flex(FlexSlot),
    DateTimeConfirm,
    DateTimeChange,
    ToggleWeekday(Weekday),
    Seats(i32),
    AcceptPrice,
    Preference(PreferenceChoice),
    Confirm,
    Edit(EditField),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Invalid parameter '{value}' for '{action}'")]
    InvalidParameter { action: String, value: String },
}

impl From<CommandParseError> for ridepool_core::CoreError {
    fn from(e: CommandParseError) -> Self {
        ridepool_core::CoreError::Validation(e.to_string())
    }
}

fn invalid(action: &str, value: &str) -> CommandParseError {
    CommandParseError::InvalidParameter {
        action: action.to_string(),
        value: value.to_string(),
    }
}

fn required<'a>(action: &str, part: Option<&'a str>) -> Result<&'a str, CommandParseError> {
    part.ok_or_else(|| invalid(action, ""))
}

fn yes_no(action: &str, value: &str) -> Result<bool, CommandParseError> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(invalid(action, value)),
    }
}

fn weekday_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CommandParseError::Empty);
        }
        let mut parts = token.split(':');
        let action = parts.next().unwrap_or_default();
        let first = parts.next();
        let second = parts.next();

        let command = match action {
            "role" => match required(action, first)? {
                "driver" => Command::Role(TripKind::DriverOffer),
                "passenger" => Command::Role(TripKind::PassengerRequest),
                other => return Err(invalid(action, other)),
            },
            "opt" => Command::ToggleOption(match required(action, first)? {
                "recurring" => TripOption::Recurring,
                "women_only" => TripOption::WomenOnly,
                "instant_booking" => TripOption::InstantBooking,
                other => return Err(invalid(action, other)),
            }),
            "next" => Command::Next,
            "back" => Command::Back,
            "loc" => {
                let raw = required(action, first)?;
                Command::PickLocality(raw.parse().map_err(|_| invalid(action, raw))?)
            }
            "cal" => match required(action, first)? {
                "prev" => Command::CalendarPrev,
                "next" => Command::CalendarNext,
                other => return Err(invalid(action, other)),
            },
            "day" => {
                let raw = required(action, first)?;
                Command::Day(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid(action, raw))?)
            }
            "hour" => {
                let raw = required(action, first)?;
                let hour: u32 = raw.parse().map_err(|_| invalid(action, raw))?;
                if hour > 23 {
                    return Err(invalid(action, raw));
                }
                Command::Hour(hour)
            }
            "min" => {
                let raw = required(action, first)?;
                let minute: u32 = raw.parse().map_err(|_| invalid(action, raw))?;
                if minute > 59 {
                    return Err(invalid(action, raw));
                }
                Command::Minute(minute)
            }
            "flex" => {
                let raw = required(action, first)?;
                Command::Flex(raw.parse().map_err(|_| invalid(action, raw))?)
            }
            "dt" => match required(action, first)? {
                "confirm" => Command::DateTimeConfirm,
                "change" => Command::DateTimeChange,
                other => return Err(invalid(action, other)),
            },
            "wday" => {
                let raw = required(action, first)?;
                Command::ToggleWeekday(raw.parse::<Weekday>().map_err(|_| invalid(action, raw))?)
            }
            "seats" => {
                let raw = required(action, first)?;
                Command::Seats(raw.parse().map_err(|_| invalid(action, raw))?)
            }
            "price" => match required(action, first)? {
                "accept" => Command::AcceptPrice,
                other => return Err(invalid(action, other)),
            },
            "pref" => {
                let key = required(action, first)?;
                let value = required(action, second)?;
                Command::Preference(match key {
                    "smoking" => PreferenceChoice::Smoking(yes_no(action, value)?),
                    "pets" => PreferenceChoice::Pets(yes_no(action, value)?),
                    "women_only" => PreferenceChoice::WomenOnly(yes_no(action, value)?),
                    "luggage" => PreferenceChoice::Luggage(LuggageSize::parse(value).ok_or_else(|| invalid(action, value))?),
                    "talk" => PreferenceChoice::Talk(TalkPreference::parse(value).ok_or_else(|| invalid(action, value))?),
                    other => return Err(invalid(action, other)),
                })
            }
            "confirm" => Command::Confirm,
            "edit" => Command::Edit(match required(action, first)? {
                "origin" => EditField::Origin,
                "destination" => EditField::Destination,
                "datetime" => EditField::DateTime,
                "seats" => EditField::Seats,
                "price" => EditField::Price,
                "preferences" => EditField::Preferences,
                other => return Err(invalid(action, other)),
            }),
            "cancel" => Command::Cancel,
            other => return Err(CommandParseError::UnknownAction(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Role(TripKind::DriverOffer) => write!(f, "role:driver"),
            Command::Role(TripKind::PassengerRequest) => write!(f, "role:passenger"),
            Command::ToggleOption(o) => write!(f, "opt:{}", o.as_str()),
            Command::Next => write!(f, "next"),
            Command::Back => write!(f, "back"),
            Command::PickLocality(i) => write!(f, "loc:{}", i),
            Command::CalendarPrev => write!(f, "cal:prev"),
            Command::CalendarNext => write!(f, "cal:next"),
            Command::Day(d) => write!(f, "day:{}", d.format("%Y-%m-%d")),
            Command::Hour(h) => write!(f, "hour:{}", h),
            Command::Minute(m) => write!(f, "min:{}", m),
            Command::Flex(slot) => write!(f, "flex:{}", slot.as_str()),
            Command::DateTimeConfirm => write!(f, "dt:confirm"),
            Command::DateTimeChange => write!(f, "dt:change"),
            Command::ToggleWeekday(d) => write!(f, "wday:{}", weekday_token(*d)),
            Command::Seats(n) => write!(f, "seats:{}", n),
            Command::AcceptPrice => write!(f, "price:accept"),
            Command::Preference(p) => match p {
                PreferenceChoice::Smoking(v) => write!(f, "pref:smoking:{}", if *v { "yes" } else { "no" }),
                PreferenceChoice::Pets(v) => write!(f, "pref:pets:{}", if *v { "yes" } else { "no" }),
                PreferenceChoice::WomenOnly(v) => write!(f, "pref:women_only:{}", if *v { "yes" } else { "no" }),
                PreferenceChoice::Luggage(l) => write!(f, "pref:luggage:{}", l.as_str()),
                PreferenceChoice::Talk(t) => write!(f, "pref:talk:{}", t.as_str()),
            },
            Command::Confirm => write!(f, "confirm"),
            Command::Edit(field) => write!(f, "edit:{}", field.as_str()),
            Command::Cancel => write!(f, "cancel"),
        }
    }
}

/// One input from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UserEvent {
    Selection(Command),
    FreeText(String),
    Cancel,
}

impl UserEvent {
    /// Decodes a raw button token.
    pub fn selection(token: &str) -> Result<Self, CommandParseError> {
        match token.parse::<Command>()? {
            Command::Cancel => Ok(UserEvent::Cancel),
            command => Ok(UserEvent::Selection(command)),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        UserEvent::FreeText(text.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_known_tokens() {
        assert_eq!("role:driver".parse::<Command>().unwrap(), Command::Role(TripKind::DriverOffer));
        assert_eq!("loc:2".parse::<Command>().unwrap(), Command::PickLocality(2));
        assert_eq!(
            "day:2026-03-01".parse::<Command>().unwrap(),
            Command::Day(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        );
        assert_eq!("flex:tbd".parse::<Command>().unwrap(), Command::Flex(FlexSlot::ToBeDetermined));
        assert_eq!(
            "pref:luggage:large".parse::<Command>().unwrap(),
            Command::Preference(PreferenceChoice::Luggage(LuggageSize::Large))
        );
        assert_eq!("wday:fri".parse::<Command>().unwrap(), Command::ToggleWeekday(Weekday::Fri));
        assert_eq!("edit:price".parse::<Command>().unwrap(), Command::Edit(EditField::Price));
    }

    #[test]
    fn test_rejects_bad_tokens() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert!(matches!("fly:now".parse::<Command>(), Err(CommandParseError::UnknownAction(_))));
        assert!(matches!("hour:24".parse::<Command>(), Err(CommandParseError::InvalidParameter { .. })));
        assert!(matches!("min:60".parse::<Command>(), Err(CommandParseError::InvalidParameter { .. })));
        assert!(matches!("day:2026-02-30".parse::<Command>(), Err(CommandParseError::InvalidParameter { .. })));
        assert!(matches!("pref:smoking".parse::<Command>(), Err(CommandParseError::InvalidParameter { .. })));
    }

    #[test]
    fn test_display_matches_parser() {
        let commands = [
            Command::Role(TripKind::PassengerRequest),
            Command::ToggleOption(TripOption::WomenOnly),
            Command::Day(NaiveDate::from_ymd_opt(2027, 12, 31).unwrap()),
            Command::Minute(35),
            Command::ToggleWeekday(Weekday::Sun),
            Command::Preference(PreferenceChoice::Talk(TalkPreference::Chatty)),
            Command::Edit(EditField::DateTime),
        ];
        for c in commands {
            assert_eq!(c.to_string().parse::<Command>().unwrap(), c);
        }
    }

    #[test]
    fn test_cancel_token_becomes_cancel_event() {
        assert_eq!(UserEvent::selection("cancel").unwrap(), UserEvent::Cancel);
    }
}
