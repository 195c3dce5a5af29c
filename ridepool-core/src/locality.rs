use ridepool_shared::Waypoint;

/// Static place directory (name, zip, canton, coordinates).
pub trait LocalityDirectory: Send + Sync {
    /// Candidates for a free-text query, ordered by name.
    fn lookup(&self, query: &str) -> Vec<Waypoint>;
}
