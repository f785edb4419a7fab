use crate::cache::StoreError;

/// Flatten a sqlx failure into the store error reported to the cache.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::new("database pool timed out"),
        sqlx::Error::PoolClosed => StoreError::new("database pool is closed"),
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            StoreError::new("database statement timed out")
        }
        sqlx::Error::Database(db) => StoreError::new(format!("database error: {}", db.message())),
        other => StoreError::new(other.to_string()),
    }
}
