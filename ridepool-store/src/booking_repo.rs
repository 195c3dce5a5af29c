use crate::{decode, storage_err};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::repository::BookingRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::{Booking, BookingStatus, PaymentStatus};
use sqlx::PgPool;
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, trip_id, passenger_id, seats_booked, amount_due_cents, currency, \
     booking_status, payment_status, seats_held, attempt, provider_order_id, approval_url, capture_id, \
     captured_cents, refunded_cents, refund_seq, platform_fee_cents, payee_cents, created_at, updated_at, confirmed_at, version";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select(clause: &str) -> String {
        format!("SELECT {} FROM bookings WHERE {} ORDER BY created_at", BOOKING_COLUMNS, clause)
    }

    /// Overwrites the row and bumps its version, only at `expected_version`
    /// when one is given. Returns the affected row count.
    async fn write(&self, booking: &Booking, expected_version: Option<i64>) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                seats_booked = $2, amount_due_cents = $3, currency = $4, booking_status = $5,
                payment_status = $6, seats_held = $7, attempt = $8, provider_order_id = $9,
                approval_url = $10, capture_id = $11, captured_cents = $12, refunded_cents = $13,
                refund_seq = $14, platform_fee_cents = $15, payee_cents = $16, updated_at = $17,
                confirmed_at = $18, version = version + 1
            WHERE id = $1 AND ($19::BIGINT IS NULL OR version = $19)
            "#,
        )
        .bind(booking.id)
        .bind(booking.seats_booked)
        .bind(booking.amount_due_cents)
        .bind(&booking.currency)
        .bind(booking.booking_status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.seats_held)
        .bind(to_column(booking.attempt)?)
        .bind(&booking.provider_order_id)
        .bind(&booking.approval_url)
        .bind(&booking.capture_id)
        .bind(booking.captured_cents)
        .bind(booking.refunded_cents)
        .bind(to_column(booking.refund_seq)?)
        .bind(booking.platform_fee_cents)
        .bind(booking.payee_cents)
        .bind(booking.updated_at)
        .bind(booking.confirmed_at)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(result.rows_affected())
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    passenger_id: Uuid,
    seats_booked: i32,
    amount_due_cents: i64,
    currency: String,
    booking_status: String,
    payment_status: String,
    seats_held: bool,
    attempt: i32,
    provider_order_id: Option<String>,
    approval_url: Option<String>,
    capture_id: Option<String>,
    captured_cents: i64,
    refunded_cents: i64,
    refund_seq: i32,
    platform_fee_cents: i64,
    payee_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            passenger_id: row.passenger_id,
            seats_booked: row.seats_booked,
            amount_due_cents: row.amount_due_cents,
            currency: row.currency,
            booking_status: decode("booking_status", &row.booking_status, BookingStatus::parse)?,
            payment_status: decode("payment_status", &row.payment_status, PaymentStatus::parse)?,
            seats_held: row.seats_held,
            attempt: counter("attempt", row.attempt)?,
            provider_order_id: row.provider_order_id,
            approval_url: row.approval_url,
            capture_id: row.capture_id,
            captured_cents: row.captured_cents,
            refunded_cents: row.refunded_cents,
            refund_seq: counter("refund_seq", row.refund_seq)?,
            platform_fee_cents: row.platform_fee_cents,
            payee_cents: row.payee_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
            confirmed_at: row.confirmed_at,
            version: row.version,
        })
    }
}

fn counter(column: &'static str, raw: i32) -> CoreResult<u32> {
    u32::try_from(raw).map_err(|_| CoreError::Storage(format!("negative {} value {}", column, raw)))
}

fn to_column(value: u32) -> CoreResult<i32> {
    i32::try_from(value).map_err(storage_err)
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)",
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(booking.passenger_id)
        .bind(booking.seats_booked)
        .bind(booking.amount_due_cents)
        .bind(&booking.currency)
        .bind(booking.booking_status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.seats_held)
        .bind(to_column(booking.attempt)?)
        .bind(&booking.provider_order_id)
        .bind(&booking.approval_url)
        .bind(&booking.capture_id)
        .bind(booking.captured_cents)
        .bind(booking.refunded_cents)
        .bind(to_column(booking.refund_seq)?)
        .bind(booking.platform_fee_cents)
        .bind(booking.payee_cents)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.confirmed_at)
        .bind(booking.version)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_booking(&self, booking: &Booking) -> CoreResult<()> {
        let result = self.write(booking, None).await?;
        if result == 0 {
            return Err(CoreError::not_found("booking", booking.id));
        }
        Ok(())
    }

    async fn update_booking_if(&self, booking: &Booking, expected_version: i64) -> CoreResult<bool> {
        if self.write(booking, Some(expected_version)).await? == 1 {
            return Ok(true);
        }
        // tell a version mismatch apart from a missing row
        match self.get_booking(booking.id).await? {
            Some(_) => Ok(false),
            None => Err(CoreError::not_found("booking", booking.id)),
        }
    }

    async fn list_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&Self::select("trip_id = $1"))
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        into_bookings(rows)
    }

    async fn list_by_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&Self::select("passenger_id = $1"))
            .bind(passenger_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        into_bookings(rows)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&Self::select("booking_status = 'PENDING' AND created_at < $1"))
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        into_bookings(rows)
    }
}
