/// All primary keys are PostgreSQL UUID columns (v7 for newly minted ids).
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Mint a new time-ordered id.
pub fn new_id() -> DbId {
    uuid::Uuid::now_v7()
}
