use crate::{decode, storage_err};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use ridepool_core::repository::TripRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::{
    Departure, DistanceProvenance, RepricingRecord, Trip, TripKind, TripPreferences, TripStatus, Waypoint,
};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const TRIP_COLUMNS: &str = "id, kind, owner_id, origin, destination, departure_at, departure_flex, \
     seats_total, seats_available, price_per_seat_cents, base_price_per_seat_cents, price_overridden, \
     currency, distance_km, distance_provenance, status, recurrence_group_id, preferences, created_at, updated_at";

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    kind: String,
    owner_id: Uuid,
    origin: Json<Waypoint>,
    destination: Json<Waypoint>,
    departure_at: NaiveDateTime,
    departure_flex: Option<String>,
    seats_total: i32,
    seats_available: i32,
    price_per_seat_cents: i64,
    base_price_per_seat_cents: i64,
    price_overridden: bool,
    currency: String,
    distance_km: Option<f64>,
    distance_provenance: Option<String>,
    status: String,
    recurrence_group_id: Option<Uuid>,
    preferences: Json<TripPreferences>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = CoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let flex = row
            .departure_flex
            .as_deref()
            .map(|raw| decode("departure_flex", raw, |s| s.parse().ok()))
            .transpose()?;
        let distance_provenance = row
            .distance_provenance
            .as_deref()
            .map(|raw| decode("distance_provenance", raw, DistanceProvenance::parse))
            .transpose()?;

        Ok(Trip {
            id: row.id,
            kind: decode("kind", &row.kind, TripKind::parse)?,
            owner_id: row.owner_id,
            origin: row.origin.0,
            destination: row.destination.0,
            departure: Departure {
                at: row.departure_at,
                flex,
            },
            seats_total: row.seats_total,
            seats_available: row.seats_available,
            price_per_seat_cents: row.price_per_seat_cents,
            base_price_per_seat_cents: row.base_price_per_seat_cents,
            price_overridden: row.price_overridden,
            currency: row.currency,
            distance_km: row.distance_km,
            distance_provenance,
            status: decode("status", &row.status, TripStatus::parse)?,
            recurrence_group_id: row.recurrence_group_id,
            preferences: row.preferences.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RepricingRow {
    id: Uuid,
    trip_id: Uuid,
    old_price_cents: i64,
    new_price_cents: i64,
    booked_seats: i32,
    reason: String,
    created_at: DateTime<Utc>,
}

impl From<RepricingRow> for RepricingRecord {
    fn from(row: RepricingRow) -> Self {
        RepricingRecord {
            id: row.id,
            trip_id: row.trip_id,
            old_price_cents: row.old_price_cents,
            new_price_cents: row.new_price_cents,
            booked_seats: row.booked_seats,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

fn into_trips(rows: Vec<TripRow>) -> CoreResult<Vec<Trip>> {
    rows.into_iter().map(Trip::try_from).collect()
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO trips ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            TRIP_COLUMNS
        ))
        .bind(trip.id)
        .bind(trip.kind.as_str())
        .bind(trip.owner_id)
        .bind(Json(&trip.origin))
        .bind(Json(&trip.destination))
        .bind(trip.departure.at)
        .bind(trip.departure.flex.map(|f| f.as_str()))
        .bind(trip.seats_total)
        .bind(trip.seats_available)
        .bind(trip.price_per_seat_cents)
        .bind(trip.base_price_per_seat_cents)
        .bind(trip.price_overridden)
        .bind(&trip.currency)
        .bind(trip.distance_km)
        .bind(trip.distance_provenance.map(|p| p.as_str()))
        .bind(trip.status.as_str())
        .bind(trip.recurrence_group_id)
        .bind(Json(&trip.preferences))
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(Trip::try_from).transpose()
    }

    async fn update_trip(&self, trip: &Trip) -> CoreResult<()> {
        // seats_available is owned by compare_and_set_seats.
        let result = sqlx::query(
            r#"
            UPDATE trips SET
                origin = $2, destination = $3, departure_at = $4, departure_flex = $5,
                seats_total = $6, price_per_seat_cents = $7, base_price_per_seat_cents = $8,
                price_overridden = $9, currency = $10, distance_km = $11, distance_provenance = $12,
                status = $13, recurrence_group_id = $14, preferences = $15, updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(trip.id)
        .bind(Json(&trip.origin))
        .bind(Json(&trip.destination))
        .bind(trip.departure.at)
        .bind(trip.departure.flex.map(|f| f.as_str()))
        .bind(trip.seats_total)
        .bind(trip.price_per_seat_cents)
        .bind(trip.base_price_per_seat_cents)
        .bind(trip.price_overridden)
        .bind(&trip.currency)
        .bind(trip.distance_km)
        .bind(trip.distance_provenance.map(|p| p.as_str()))
        .bind(trip.status.as_str())
        .bind(trip.recurrence_group_id)
        .bind(Json(&trip.preferences))
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("trip", trip.id));
        }
        Ok(())
    }

    async fn compare_and_set_seats(&self, id: Uuid, expected: i32, new: i32) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE trips SET seats_available = $3, updated_at = NOW() WHERE id = $1 AND seats_available = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish a lost race from a missing trip.
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(CoreError::not_found("trip", id)),
        }
    }

    async fn delete_trip(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("trip", id));
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Trip>> {
        let rows: Vec<TripRow> = sqlx::query_as(&format!(
            "SELECT {} FROM trips WHERE owner_id = $1 ORDER BY departure_at",
            TRIP_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        into_trips(rows)
    }

    async fn list_by_group(&self, group_id: Uuid) -> CoreResult<Vec<Trip>> {
        let rows: Vec<TripRow> = sqlx::query_as(&format!(
            "SELECT {} FROM trips WHERE recurrence_group_id = $1 ORDER BY departure_at",
            TRIP_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        into_trips(rows)
    }

    async fn mark_seats_released(&self, booking_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("INSERT INTO seat_releases (booking_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_seats_released(&self, booking_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM seat_releases WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn record_repricing(&self, record: &RepricingRecord) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO repricing_records (id, trip_id, old_price_cents, new_price_cents, booked_seats, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.trip_id)
        .bind(record.old_price_cents)
        .bind(record.new_price_cents)
        .bind(record.booked_seats)
        .bind(&record.reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn list_repricings(&self, trip_id: Uuid) -> CoreResult<Vec<RepricingRecord>> {
        let rows: Vec<RepricingRow> = sqlx::query_as(
            "SELECT id, trip_id, old_price_cents, new_price_cents, booked_seats, reason, created_at \
             FROM repricing_records WHERE trip_id = $1 ORDER BY created_at",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(RepricingRecord::from).collect())
    }
}
