use crate::command::{Command, EditField, PreferenceChoice, TripOption, UserEvent};
use crate::datetime::{DateInput, DateOutcome, DateTimeMachine, DateTimeState};
use crate::prompt::{Notice, Prompt, PromptOption, Reply, WizardOutcome};
use crate::session::{SessionStore, WizardSession};
use crate::steps::{next_step, previous_step, BookingDraft, Flow, StepId};
use chrono::{Datelike, Duration, NaiveDateTime, Utc, Weekday};
use ridepool_catalog::RouteResolver;
use ridepool_core::clock::Clock;
use ridepool_core::repository::UserRepository;
use ridepool_core::CoreError;
use ridepool_order::{BookingService, TripManager};
use ridepool_shared::money::{format_cents, parse_amount};
use ridepool_shared::{
    Departure, DistanceProvenance, LuggageSize, TalkPreference, Trip, TripKind, TripPreferences, User, Waypoint,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const MAX_NOTES_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    pub session_ttl_seconds: u64,
    pub reaper_interval_seconds: u64,
    /// Publish trips as soon as the wizard confirms them.
    pub auto_publish: bool,
    pub max_seats: i32,
    pub recurrence_weeks: u32,
    pub currency: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 1800,
            reaper_interval_seconds: 60,
            auto_publish: true,
            max_seats: 8,
            recurrence_weeks: 3,
            currency: "CHF".to_string(),
        }
    }
}

impl WizardConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_seconds as i64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Stale event: session is at seq {expected}, event carried {got}")]
    DuplicateEvent { expected: u64, got: u64 },
    #[error("User {0} is disabled")]
    Disabled(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<WizardError> for CoreError {
    fn from(e: WizardError) -> Self {
        match e {
            WizardError::DuplicateEvent { expected, got } => CoreError::InvalidTransition {
                from: format!("seq {}", expected),
                to: format!("seq {}", got),
            },
            WizardError::Disabled(user) => CoreError::Validation(format!("user {} is disabled", user)),
            WizardError::Core(e) => e,
        }
    }
}

/// Result of applying one event to a working copy of the session.
enum Progress {
    Stay,
    /// Keep the changes but show an inline error.
    Retry(String),
    Finished(WizardOutcome),
}

/// `Invalid` keeps the session where it was, `Fatal` ends it.
enum StepError {
    Invalid(String),
    Fatal(CoreError),
}

impl From<CoreError> for StepError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => StepError::Invalid(msg),
            e @ CoreError::InsufficientSeats { .. } => StepError::Invalid(e.to_string()),
            other => StepError::Fatal(other),
        }
    }
}

type StepResult = Result<Progress, StepError>;

fn invalid(msg: impl Into<String>) -> StepError {
    StepError::Invalid(msg.into())
}

fn same_place(a: &Waypoint, b: &Waypoint) -> bool {
    a.name == b.name && a.zip == b.zip
}

/// Instants on `start`'s weekday plus every weekday in `weekdays`, over
/// `weeks` weeks from the start date. Instants before `now` are skipped.
pub fn recurrence_departures(start: Departure, weekdays: &[Weekday], weeks: u32, now: NaiveDateTime) -> Vec<Departure> {
    let first = start.at.date();
    let time = start.at.time();
    (0..7 * weeks as i64)
        .filter_map(|offset| {
            let date = first + Duration::days(offset);
            let selected = date.weekday() == first.weekday() || weekdays.contains(&date.weekday());
            let departure = Departure {
                at: date.and_time(time),
                flex: start.flex,
            };
            (selected && !departure.is_past(now)).then_some(departure)
        })
        .collect()
}

/// Guided trip and booking creation, one event at a time.
pub struct Wizard {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserRepository>,
    resolver: Arc<RouteResolver>,
    trips: Arc<TripManager>,
    bookings: Arc<BookingService>,
    clock: Arc<dyn Clock>,
    config: WizardConfig,
}

impl Wizard {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserRepository>,
        resolver: Arc<RouteResolver>,
        trips: Arc<TripManager>,
        bookings: Arc<BookingService>,
        clock: Arc<dyn Clock>,
        config: WizardConfig,
    ) -> Self {
        Self {
            sessions,
            users,
            resolver,
            trips,
            bookings,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    async fn active_user(&self, user_key: &str) -> Result<User, WizardError> {
        let user = self.users.get_or_create(user_key).await?;
        if user.disabled {
            tracing::warn!("Disabled user {} tried to start a wizard", user_key);
            return Err(WizardError::Disabled(user_key.to_string()));
        }
        Ok(user)
    }

    /// Opens a trip wizard, replacing any session the user already had.
    pub async fn start_trip(&self, user_key: &str) -> Result<Reply, WizardError> {
        let user = self.active_user(user_key).await?;
        let session = WizardSession::new(user_key, user.id, Flow::Trip, self.clock.now());
        self.sessions.create(&session).await?;
        tracing::info!("Started trip wizard {} for {}", session.id, user_key);
        Ok(self.reply(&session, None))
    }

    /// Opens a booking wizard against a published driver offer.
    pub async fn start_booking(&self, user_key: &str, trip_id: Uuid) -> Result<Reply, WizardError> {
        let user = self.active_user(user_key).await?;
        let trip = self.trips.get(trip_id).await?;
        if !trip.is_bookable() {
            return Err(CoreError::Validation("this trip is not open for booking".to_string()).into());
        }
        if trip.owner_id == user.id {
            return Err(CoreError::Validation("drivers cannot book their own trip".to_string()).into());
        }
        if trip.seats_available < 1 {
            return Err(CoreError::InsufficientSeats {
                requested: 1,
                available: 0,
            }
            .into());
        }

        let mut session = WizardSession::new(user_key, user.id, Flow::Booking, self.clock.now());
        session.booking = Some(BookingDraft {
            trip_id: trip.id,
            summary: trip.summary(),
            seats_available: trip.seats_available,
            price_per_seat_cents: trip.price_per_seat_cents,
            currency: trip.currency.clone(),
            seats: None,
        });
        self.sessions.create(&session).await?;
        tracing::info!("Started booking wizard {} for {} on trip {}", session.id, user_key, trip.id);
        Ok(self.reply(&session, None))
    }

    /// Current prompt for the user's session, if one is alive.
    pub async fn current(&self, user_key: &str) -> Result<Option<Reply>, WizardError> {
        Ok(self
            .sessions
            .load(user_key)
            .await?
            .map(|s| self.reply(&s, None)))
    }

    pub async fn abandon(&self, user_key: &str) -> Result<(), WizardError> {
        self.sessions.delete(user_key).await?;
        tracing::info!("Wizard session for {} abandoned", user_key);
        Ok(())
    }

    /// Applies one user event. `seq` must equal the session's current
    /// sequence number; anything else is rejected without effect.
    pub async fn advance(&self, user_key: &str, seq: u64, event: UserEvent) -> Result<Reply, WizardError> {
        let Some(session) = self.sessions.load(user_key).await? else {
            tracing::info!("No live wizard session for {}, starting over", user_key);
            let mut reply = self.start_trip(user_key).await?;
            reply.notice = Some(Notice::SessionExpired);
            return Ok(reply);
        };
        if seq != session.seq {
            return Err(WizardError::DuplicateEvent {
                expected: session.seq,
                got: seq,
            });
        }

        // Claim the sequence number before any side effect runs.
        let mut claimed = session.clone();
        claimed.seq += 1;
        claimed.last_event_at = self.clock.now();
        if !self.sessions.save_if_seq(&claimed, session.seq).await? {
            return Err(WizardError::DuplicateEvent {
                expected: claimed.seq,
                got: seq,
            });
        }

        let mut working = claimed.clone();
        let from = working.step;
        match self.apply(&mut working, event).await {
            Ok(Progress::Stay) => {
                self.store(&working, claimed.seq).await?;
                if from != working.step {
                    tracing::debug!(
                        "Wizard {} moved {} -> {}",
                        working.id,
                        from.as_str(),
                        working.step.as_str()
                    );
                }
                Ok(self.reply(&working, None))
            }
            Ok(Progress::Retry(msg)) => {
                self.store(&working, claimed.seq).await?;
                Ok(self.reply(&working, Some(msg)))
            }
            Ok(Progress::Finished(outcome)) => {
                self.sessions.delete(user_key).await?;
                tracing::info!("Wizard {} finished: {:?}", working.id, outcome);
                Ok(self.finished(&working, outcome))
            }
            Err(StepError::Invalid(msg)) => {
                tracing::debug!("Wizard {} rejected input at {}: {}", claimed.id, from.as_str(), msg);
                Ok(self.reply(&claimed, Some(msg)))
            }
            Err(StepError::Fatal(e)) => {
                tracing::error!("Wizard {} aborted at {}: {}", claimed.id, from.as_str(), e);
                if let Err(del) = self.sessions.delete(user_key).await {
                    tracing::warn!("Could not drop aborted session {}: {}", claimed.id, del);
                }
                Err(e.into())
            }
        }
    }

    async fn store(&self, session: &WizardSession, expected: u64) -> Result<(), WizardError> {
        if self.sessions.save_if_seq(session, expected).await? {
            Ok(())
        } else {
            Err(WizardError::DuplicateEvent {
                expected,
                got: session.seq,
            })
        }
    }

    async fn apply(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        if matches!(event, UserEvent::Cancel | UserEvent::Selection(Command::Cancel)) {
            return Ok(Progress::Finished(WizardOutcome::Cancelled));
        }
        match s.step {
            StepId::Role => self.on_role(s, event),
            StepId::Options => self.on_options(s, event),
            StepId::Origin | StepId::Destination => self.on_waypoint(s, event).await,
            StepId::DateTime => self.on_datetime(s, event),
            StepId::Recurrence => self.on_recurrence(s, event),
            StepId::Seats | StepId::SeatsNeeded => self.on_seats(s, event),
            StepId::Price => self.on_price(s, event),
            StepId::Preferences => self.on_preferences(s, event),
            StepId::BookingSeats => self.on_booking_seats(s, event),
            StepId::Confirm => match s.flow {
                Flow::Trip => self.on_trip_confirm(s, event).await,
                Flow::Booking => self.on_booking_confirm(s, event).await,
            },
            StepId::Done | StepId::Cancelled => Err(StepError::Fatal(CoreError::SessionExpired)),
        }
    }

    fn unexpected(&self, s: &WizardSession, event: &UserEvent) -> StepError {
        let what = match event {
            UserEvent::Selection(c) => format!("'{}'", c),
            UserEvent::FreeText(_) => "text input".to_string(),
            UserEvent::Cancel => "cancel".to_string(),
        };
        invalid(format!("{} is not expected at the {} step", what, s.step.as_str()))
    }

    fn enter(&self, s: &mut WizardSession, step: StepId) {
        s.draft.candidates.clear();
        s.datetime = (step == StepId::DateTime).then(|| DateTimeMachine::start(self.clock.today()));
        s.step = step;
    }

    fn forward(&self, s: &mut WizardSession) -> StepResult {
        let next = if s.return_to_confirm {
            s.return_to_confirm = false;
            StepId::Confirm
        } else {
            next_step(s.flow, s.step, &s.draft)
        };
        self.enter(s, next);
        Ok(Progress::Stay)
    }

    fn backward(&self, s: &mut WizardSession) -> StepResult {
        if s.return_to_confirm {
            s.return_to_confirm = false;
            self.enter(s, StepId::Confirm);
            return Ok(Progress::Stay);
        }
        match previous_step(s.flow, s.step, &s.draft) {
            Some(prev) => {
                self.enter(s, prev);
                Ok(Progress::Stay)
            }
            None => Err(invalid("this is already the first step")),
        }
    }

    fn on_role(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::Role(kind)) => {
                s.draft.kind = Some(kind);
                self.forward(s)
            }
            other => Err(self.unexpected(s, &other)),
        }
    }

    fn on_options(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::ToggleOption(option)) => {
                let prefs = &mut s.draft.preferences;
                match option {
                    TripOption::Recurring => {
                        s.draft.recurring = !s.draft.recurring;
                        if !s.draft.recurring {
                            s.draft.weekdays.clear();
                        }
                    }
                    TripOption::WomenOnly => prefs.women_only = !prefs.women_only,
                    TripOption::InstantBooking => prefs.instant_booking = !prefs.instant_booking,
                }
                Ok(Progress::Stay)
            }
            UserEvent::Selection(Command::Next) => self.forward(s),
            UserEvent::Selection(Command::Back) => self.backward(s),
            other => Err(self.unexpected(s, &other)),
        }
    }

    async fn on_waypoint(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        let chosen = match event {
            UserEvent::FreeText(query) => {
                let query = query.trim();
                if query.is_empty() {
                    return Err(invalid("type a town name or postal code"));
                }
                let mut matches = self.resolver.lookup_locality(query);
                match matches.len() {
                    0 => return Err(invalid(format!("no locality matches '{}'", query))),
                    1 => matches.remove(0),
                    _ => {
                        s.draft.candidates = matches;
                        return Ok(Progress::Stay);
                    }
                }
            }
            UserEvent::Selection(Command::PickLocality(index)) => s
                .draft
                .candidates
                .get(index)
                .cloned()
                .ok_or_else(|| invalid("pick one of the listed localities"))?,
            UserEvent::Selection(Command::Back) => return self.backward(s),
            other => return Err(self.unexpected(s, &other)),
        };

        let is_origin = s.step == StepId::Origin;
        let opposite = if is_origin {
            s.draft.destination.as_ref()
        } else {
            s.draft.origin.as_ref()
        };
        if opposite.map(|w| same_place(w, &chosen)).unwrap_or(false) {
            return Err(invalid("origin and destination must differ"));
        }
        if is_origin {
            s.draft.origin = Some(chosen);
        } else {
            s.draft.destination = Some(chosen);
        }
        self.refresh_quote(s).await?;
        self.forward(s)
    }

    /// Re-prices once both ends are known. An owner override survives.
    async fn refresh_quote(&self, s: &mut WizardSession) -> Result<(), StepError> {
        let (Some(from), Some(to)) = (s.draft.origin.clone(), s.draft.destination.clone()) else {
            return Ok(());
        };
        let quote = self.resolver.quote(&from, &to).await?;
        let draft = &mut s.draft;
        draft.distance_km = Some(quote.distance.km);
        draft.distance_provenance = Some(quote.distance.provenance);
        draft.suggested_price_cents = Some(quote.price_per_seat_cents);
        if !draft.price_overridden {
            draft.price_per_seat_cents = Some(quote.price_per_seat_cents);
        }
        Ok(())
    }

    fn on_datetime(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        let now = self.clock.local_now();
        let machine = s.datetime.unwrap_or_else(|| DateTimeMachine::start(now.date()));
        let input = match event {
            UserEvent::Selection(Command::Back) if matches!(machine.state(), DateTimeState::CalendarMonth { .. }) => {
                return self.backward(s);
            }
            UserEvent::Selection(c) => DateInput::Command(c),
            UserEvent::FreeText(t) => DateInput::Text(t),
            UserEvent::Cancel => DateInput::Cancel,
        };

        let mut machine = machine;
        let outcome = machine.handle(input, now)?;
        s.datetime = Some(machine);
        match outcome {
            DateOutcome::Continue => Ok(Progress::Stay),
            DateOutcome::Done(departure) => {
                s.draft.departure = Some(departure);
                self.forward(s)
            }
            DateOutcome::Abort => Ok(Progress::Finished(WizardOutcome::Cancelled)),
        }
    }

    fn on_recurrence(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::ToggleWeekday(day)) => {
                s.draft.toggle_weekday(day);
                Ok(Progress::Stay)
            }
            UserEvent::Selection(Command::Next) => self.forward(s),
            UserEvent::Selection(Command::Back) => self.backward(s),
            other => Err(self.unexpected(s, &other)),
        }
    }

    fn seat_count(&self, s: &WizardSession, event: &UserEvent, limit: i32) -> Result<i32, StepError> {
        let seats = match event {
            UserEvent::Selection(Command::Seats(n)) => *n,
            UserEvent::FreeText(text) => text
                .trim()
                .parse::<i32>()
                .map_err(|_| invalid("enter the number of seats"))?,
            other => return Err(self.unexpected(s, other)),
        };
        if seats < 1 || seats > limit {
            return Err(invalid(format!("choose between 1 and {} seats", limit)));
        }
        Ok(seats)
    }

    fn on_seats(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        if event == UserEvent::Selection(Command::Back) {
            return self.backward(s);
        }
        let seats = self.seat_count(s, &event, self.config.max_seats)?;
        s.draft.seats = Some(seats);
        self.forward(s)
    }

    fn on_price(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::AcceptPrice) => {
                let suggested = s
                    .draft
                    .suggested_price_cents
                    .ok_or_else(|| invalid("there is no suggested price yet"))?;
                s.draft.price_per_seat_cents = Some(suggested);
                s.draft.price_overridden = false;
            }
            UserEvent::FreeText(text) => {
                let cents = parse_amount(&text).ok_or_else(|| invalid("enter a price such as 12.50"))?;
                let cents = self
                    .resolver
                    .pricing()
                    .validate_override(cents)
                    .map_err(|e| invalid(e.to_string()))?;
                s.draft.price_per_seat_cents = Some(cents);
                s.draft.price_overridden = true;
            }
            UserEvent::Selection(Command::Back) => return self.backward(s),
            other => return Err(self.unexpected(s, &other)),
        }
        self.forward(s)
    }

    fn on_preferences(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::Preference(choice)) => {
                let prefs = &mut s.draft.preferences;
                match choice {
                    PreferenceChoice::Smoking(v) => prefs.smoking = v,
                    PreferenceChoice::Pets(v) => prefs.pets = v,
                    PreferenceChoice::WomenOnly(v) => prefs.women_only = v,
                    PreferenceChoice::Luggage(size) => prefs.luggage = size,
                    PreferenceChoice::Talk(talk) => prefs.talk = talk,
                }
                Ok(Progress::Stay)
            }
            UserEvent::FreeText(text) => {
                let notes = text.trim();
                if notes.chars().count() > MAX_NOTES_CHARS {
                    return Err(invalid(format!("notes are limited to {} characters", MAX_NOTES_CHARS)));
                }
                s.draft.preferences.notes = (!notes.is_empty()).then(|| notes.to_string());
                Ok(Progress::Stay)
            }
            UserEvent::Selection(Command::Next) => self.forward(s),
            UserEvent::Selection(Command::Back) => self.backward(s),
            other => Err(self.unexpected(s, &other)),
        }
    }

    fn edit_target(&self, s: &WizardSession, field: EditField) -> Result<StepId, StepError> {
        let driver = s.draft.is_driver();
        Ok(match field {
            EditField::Origin => StepId::Origin,
            EditField::Destination => StepId::Destination,
            EditField::DateTime => StepId::DateTime,
            EditField::Seats if driver => StepId::Seats,
            EditField::Seats => StepId::SeatsNeeded,
            EditField::Price if driver => StepId::Price,
            EditField::Price => return Err(invalid("requests have no price to edit")),
            EditField::Preferences => StepId::Preferences,
        })
    }

    async fn on_trip_confirm(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::Confirm) => Ok(Progress::Finished(self.persist_trips(s).await?)),
            UserEvent::Selection(Command::Edit(field)) => {
                let target = self.edit_target(s, field)?;
                self.enter(s, target);
                s.return_to_confirm = true;
                Ok(Progress::Stay)
            }
            UserEvent::Selection(Command::Back) => self.backward(s),
            other => Err(self.unexpected(s, &other)),
        }
    }

    async fn persist_trips(&self, s: &WizardSession) -> Result<WizardOutcome, StepError> {
        let d = &s.draft;
        let kind = d.kind.ok_or_else(|| invalid("choose a role first"))?;
        let origin = d.origin.clone().ok_or_else(|| invalid("the origin is missing"))?;
        let destination = d.destination.clone().ok_or_else(|| invalid("the destination is missing"))?;
        let departure = d.departure.ok_or_else(|| invalid("the departure time is missing"))?;
        let seats = d.seats.ok_or_else(|| invalid("the number of seats is missing"))?;
        let price = match kind {
            TripKind::DriverOffer => d.price_per_seat_cents.ok_or_else(|| invalid("the price is missing"))?,
            TripKind::PassengerRequest => d.price_per_seat_cents.or(d.suggested_price_cents).unwrap_or(0),
        };

        let now = self.clock.local_now();
        let departures = if d.recurring {
            recurrence_departures(departure, &d.weekdays, self.config.recurrence_weeks, now)
        } else if !departure.is_past(now) {
            vec![departure]
        } else {
            Vec::new()
        };
        if departures.is_empty() {
            return Err(invalid("the departure time has already passed"));
        }
        let group = d.recurring.then(Uuid::new_v4);

        let drafts: Vec<Trip> = departures
            .into_iter()
            .map(|dep| {
                let mut trip = Trip::new(
                    kind,
                    s.user_id,
                    origin.clone(),
                    destination.clone(),
                    dep,
                    seats,
                    price,
                    self.config.currency.clone(),
                );
                trip.price_overridden = d.price_overridden;
                trip.distance_km = d.distance_km;
                trip.distance_provenance = d.distance_provenance;
                trip.preferences = d.preferences.clone();
                trip.recurrence_group_id = group;
                trip
            })
            .collect();

        let stored = self.trips.create(drafts, self.config.auto_publish).await?;
        self.mark_role(s.user_id, kind).await?;
        tracing::info!("Wizard {} created {} trip(s) for {}", s.id, stored.len(), s.user_key);
        Ok(WizardOutcome::TripsCreated(stored.iter().map(|t| t.id).collect()))
    }

    async fn mark_role(&self, user_id: Uuid, kind: TripKind) -> Result<(), StepError> {
        let Some(mut user) = self.users.get_user(user_id).await? else {
            return Ok(());
        };
        let changed = match kind {
            TripKind::DriverOffer => !std::mem::replace(&mut user.is_driver, true),
            TripKind::PassengerRequest => !std::mem::replace(&mut user.is_passenger, true),
        };
        if changed {
            user.updated_at = Utc::now();
            self.users.update_user(&user).await?;
        }
        Ok(())
    }

    fn on_booking_seats(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        if event == UserEvent::Selection(Command::Back) {
            return self.backward(s);
        }
        let limit = s
            .booking
            .as_ref()
            .map(|b| b.seats_available)
            .ok_or_else(|| StepError::Fatal(CoreError::Internal("booking session without a trip".to_string())))?;
        let seats = self.seat_count(s, &event, limit)?;
        if let Some(booking) = s.booking.as_mut() {
            booking.seats = Some(seats);
        }
        self.forward(s)
    }

    async fn on_booking_confirm(&self, s: &mut WizardSession, event: UserEvent) -> StepResult {
        match event {
            UserEvent::Selection(Command::Confirm) => {
                let draft = s
                    .booking
                    .as_ref()
                    .ok_or_else(|| StepError::Fatal(CoreError::Internal("booking session without a trip".to_string())))?;
                let seats = draft.seats.ok_or_else(|| invalid("choose how many seats first"))?;
                match self.bookings.reserve(draft.trip_id, s.user_id, seats).await {
                    Ok(booking) => {
                        self.mark_role(s.user_id, TripKind::PassengerRequest).await?;
                        Ok(Progress::Finished(WizardOutcome::BookingCreated(booking.id)))
                    }
                    Err(CoreError::InsufficientSeats { requested, available }) => {
                        if let Some(b) = s.booking.as_mut() {
                            b.seats_available = available;
                            b.seats = None;
                        }
                        self.enter(s, StepId::BookingSeats);
                        Ok(Progress::Retry(format!(
                            "only {} seat(s) left, you asked for {}",
                            available, requested
                        )))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            UserEvent::Selection(Command::Edit(EditField::Seats)) => {
                self.enter(s, StepId::BookingSeats);
                s.return_to_confirm = true;
                Ok(Progress::Stay)
            }
            UserEvent::Selection(Command::Back) => self.backward(s),
            other => Err(self.unexpected(s, &other)),
        }
    }

    fn reply(&self, s: &WizardSession, error: Option<String>) -> Reply {
        Reply {
            session_id: s.id,
            step: s.step,
            seq: s.seq,
            prompt: self.prompt(s).with_error(error),
            notice: None,
            outcome: None,
        }
    }

    fn finished(&self, s: &WizardSession, outcome: WizardOutcome) -> Reply {
        let step = match outcome {
            WizardOutcome::Cancelled => StepId::Cancelled,
            _ => StepId::Done,
        };
        Reply {
            session_id: s.id,
            step,
            seq: s.seq,
            prompt: Prompt::new(step.as_str()).with_context("outcome", &outcome),
            notice: None,
            outcome: Some(outcome),
        }
    }

    fn prompt(&self, s: &WizardSession) -> Prompt {
        let d = &s.draft;
        let back = || PromptOption::new(Command::Back, "back");
        let next = || PromptOption::new(Command::Next, "next");
        let seat_buttons = |limit: i32| -> Vec<PromptOption> {
            (1..=limit)
                .map(|n| PromptOption::new(Command::Seats(n), n.to_string()))
                .collect()
        };

        let prompt = match s.step {
            StepId::Role => Prompt::new("role").with_options(vec![
                PromptOption::new(Command::Role(TripKind::DriverOffer), "driver"),
                PromptOption::new(Command::Role(TripKind::PassengerRequest), "passenger"),
            ]),
            StepId::Options => Prompt::new("options")
                .with_context("recurring", d.recurring)
                .with_context("women_only", d.preferences.women_only)
                .with_context("instant_booking", d.preferences.instant_booking)
                .with_options(
                    [TripOption::Recurring, TripOption::WomenOnly, TripOption::InstantBooking]
                        .into_iter()
                        .map(|o| PromptOption::new(Command::ToggleOption(o), o.as_str()))
                        .collect(),
                )
                .with_options(vec![next(), back()]),
            StepId::Origin | StepId::Destination => Prompt::new(s.step.as_str())
                .with_context("origin", d.origin.as_ref().map(|w| w.label()))
                .with_options(
                    d.candidates
                        .iter()
                        .enumerate()
                        .map(|(i, w)| PromptOption::new(Command::PickLocality(i), w.label()))
                        .collect(),
                )
                .with_option(back())
                .accepts_text(),
            StepId::DateTime => {
                let now = self.clock.local_now();
                s.datetime
                    .unwrap_or_else(|| DateTimeMachine::start(now.date()))
                    .prompt(now)
            }
            StepId::Recurrence => Prompt::new("recurrence")
                .with_context("first_departure", d.departure.map(|dep| dep.describe()))
                .with_context(
                    "selected",
                    d.weekdays.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                )
                .with_context("weeks", self.config.recurrence_weeks)
                .with_options(
                    [
                        Weekday::Mon,
                        Weekday::Tue,
                        Weekday::Wed,
                        Weekday::Thu,
                        Weekday::Fri,
                        Weekday::Sat,
                        Weekday::Sun,
                    ]
                    .into_iter()
                    .map(|w| PromptOption::new(Command::ToggleWeekday(w), w.to_string()))
                    .collect(),
                )
                .with_options(vec![next(), back()]),
            StepId::Seats | StepId::SeatsNeeded => Prompt::new(s.step.as_str())
                .with_options(seat_buttons(self.config.max_seats))
                .with_option(back())
                .accepts_text(),
            StepId::Price => Prompt::new("price")
                .with_context("suggested_cents", d.suggested_price_cents)
                .with_context("suggested", d.suggested_price_cents.map(format_cents))
                .with_context("distance_km", d.distance_km.map(|km| (km * 10.0).round() / 10.0))
                .with_context("estimated", d.distance_provenance == Some(DistanceProvenance::GreatCircle))
                .with_context("max_cents", self.resolver.pricing().config().max_price_per_seat_cents)
                .with_option(
                    PromptOption::new(Command::AcceptPrice, "accept").enabled(d.suggested_price_cents.is_some()),
                )
                .with_option(back())
                .accepts_text(),
            StepId::Preferences => Prompt::new("preferences")
                .with_context("preferences", &d.preferences)
                .with_options(preference_options(&d.preferences))
                .with_options(vec![next(), back()])
                .accepts_text(),
            StepId::BookingSeats => {
                let (summary, limit, price) = s
                    .booking
                    .as_ref()
                    .map(|b| (b.summary.clone(), b.seats_available, b.price_per_seat_cents))
                    .unwrap_or_default();
                Prompt::new("booking_seats")
                    .with_context("trip", summary)
                    .with_context("price_per_seat", format_cents(price))
                    .with_options(seat_buttons(limit))
                    .accepts_text()
            }
            StepId::Confirm => match s.flow {
                Flow::Trip => {
                    let fields = [
                        EditField::Origin,
                        EditField::Destination,
                        EditField::DateTime,
                        EditField::Seats,
                        EditField::Price,
                        EditField::Preferences,
                    ];
                    Prompt::new("confirm")
                        .with_context("draft", d)
                        .with_context("departure", d.departure.map(|dep| dep.describe()))
                        .with_context("price", d.price_per_seat_cents.map(format_cents))
                        .with_option(PromptOption::new(Command::Confirm, "confirm"))
                        .with_options(
                            fields
                                .into_iter()
                                .filter(|f| *f != EditField::Price || d.is_driver())
                                .map(|f| PromptOption::new(Command::Edit(f), f.as_str()))
                                .collect(),
                        )
                        .with_option(back())
                }
                Flow::Booking => {
                    let booking = s.booking.as_ref();
                    Prompt::new("booking_confirm")
                        .with_context("trip", booking.map(|b| b.summary.clone()))
                        .with_context("seats", booking.and_then(|b| b.seats))
                        .with_context("amount", booking.and_then(|b| b.amount_cents()).map(format_cents))
                        .with_context("currency", booking.map(|b| b.currency.clone()))
                        .with_options(vec![
                            PromptOption::new(Command::Confirm, "confirm"),
                            PromptOption::new(Command::Edit(EditField::Seats), "seats"),
                            back(),
                        ])
                }
            },
            StepId::Done | StepId::Cancelled => Prompt::new(s.step.as_str()),
        };

        if s.step.is_terminal() {
            prompt
        } else {
            prompt.with_option(PromptOption::new(Command::Cancel, "cancel"))
        }
    }
}

fn preference_options(current: &TripPreferences) -> Vec<PromptOption> {
    let flag = |label: &str, value: bool| format!("{}: {}", label, if value { "yes" } else { "no" });
    let mut options = vec![
        PromptOption::new(
            Command::Preference(PreferenceChoice::Smoking(!current.smoking)),
            flag("smoking", !current.smoking),
        ),
        PromptOption::new(
            Command::Preference(PreferenceChoice::Pets(!current.pets)),
            flag("pets", !current.pets),
        ),
    ];
    options.extend(
        [LuggageSize::None, LuggageSize::Small, LuggageSize::Medium, LuggageSize::Large]
            .into_iter()
            .map(|l| {
                PromptOption::new(Command::Preference(PreferenceChoice::Luggage(l)), l.as_str())
                    .enabled(l != current.luggage)
            }),
    );
    options.extend(
        [TalkPreference::Quiet, TalkPreference::Some, TalkPreference::Chatty]
            .into_iter()
            .map(|t| {
                PromptOption::new(Command::Preference(PreferenceChoice::Talk(t)), t.as_str())
                    .enabled(t != current.talk)
            }),
    );
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ridepool_shared::FlexSlot;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_recurrence_adds_selected_weekdays() {
        // 2026-12-16 is a Wednesday.
        let start = Departure::exact(at(2026, 12, 16, 7, 30));
        let out = recurrence_departures(start, &[Weekday::Fri], 3, at(2026, 12, 15, 10, 0));
        let dates: Vec<String> = out.iter().map(|d| d.at.format("%m-%d").to_string()).collect();
        assert_eq!(dates, vec!["12-16", "12-18", "12-23", "12-25", "12-30", "01-01"]);
        assert!(out.iter().all(|d| d.at.format("%H:%M").to_string() == "07:30"));
    }

    #[test]
    fn test_recurrence_skips_past_instants_and_keeps_flex() {
        let start = Departure::flexible(NaiveDate::from_ymd_opt(2026, 12, 14).unwrap(), FlexSlot::Evening).unwrap();
        let out = recurrence_departures(start, &[], 2, at(2026, 12, 15, 10, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].at, at(2026, 12, 21, 20, 0));
        assert_eq!(out[0].flex, Some(FlexSlot::Evening));
    }

    #[test]
    fn test_validation_errors_stay_inline() {
        assert!(matches!(
            StepError::from(CoreError::Validation("bad".into())),
            StepError::Invalid(_)
        ));
        assert!(matches!(
            StepError::from(CoreError::InsufficientSeats {
                requested: 2,
                available: 1
            }),
            StepError::Invalid(_)
        ));
        assert!(matches!(
            StepError::from(CoreError::Storage("down".into())),
            StepError::Fatal(_)
        ));
    }

    #[test]
    fn test_wizard_error_maps_to_core() {
        let err: CoreError = WizardError::DuplicateEvent { expected: 3, got: 2 }.into();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
