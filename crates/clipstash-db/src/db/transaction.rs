//! Database transaction utilities

use clipstash_core::AppError;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// A transaction that must be explicitly committed.
///
/// Dropping the guard without [`TransactionGuard::commit`] rolls the transaction back
/// when the connection returns to the pool.
///
/// ```ignore
/// let mut tx = TransactionGuard::begin(&pool).await?;
/// sqlx::query("INSERT INTO ...").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub struct TransactionGuard<'a> {
    transaction: Transaction<'a, Postgres>,
}

impl<'a> TransactionGuard<'a> {
    pub async fn begin(pool: &'a PgPool) -> Result<Self, AppError> {
        let transaction = pool.begin().await?;
        Ok(Self { transaction })
    }

    /// Connection to run statements on inside the transaction.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.transaction
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.transaction.commit().await?;
        Ok(())
    }
}
