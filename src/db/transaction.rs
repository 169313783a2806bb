/*!
 * Transaction helper
 *
 * Runs a unit of work inside a single database transaction: commit on `Ok`,
 * rollback on `Err`. The caller's error type comes back unchanged so domain
 * errors raised mid-transaction (e.g. insufficient stock) stay matchable.
 */

use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use tracing::{debug, warn};
use uuid::Uuid;

/// Execute a function within a database transaction
///
/// # Example
///
/// ```rust,ignore
/// let order = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let order = order::ActiveModel { .. }.insert(txn).await?;
///         for item in items {
///             item.insert(txn).await?;
///         }
///         Ok::<_, ServiceError>(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    let transaction_id = Uuid::new_v4();
    let start = std::time::Instant::now();
    debug!(transaction_id = %transaction_id, "Starting database transaction");

    let result = db.transaction::<_, T, E>(f).await;

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!(transaction_id = %transaction_id, "Transaction committed in {:?}", elapsed)
        }
        Err(e) => {
            warn!(transaction_id = %transaction_id, error = %e, "Transaction rolled back after {:?}", elapsed)
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
