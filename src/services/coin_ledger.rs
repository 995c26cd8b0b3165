use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

use crate::{
    entities::{coin_transaction, CoinTransaction, CoinTransactionModel},
    errors::ServiceError,
};

/// The buyer's coin balance: the sum of their append-only ledger entries.
///
/// Takes any connection so callers can read a consistent balance inside
/// their own transaction.
pub async fn balance(
    conn: &impl ConnectionTrait,
    buyer_id: Uuid,
) -> Result<Decimal, ServiceError> {
    let entries = CoinTransaction::find()
        .filter(coin_transaction::Column::BuyerId.eq(buyer_id))
        .all(conn)
        .await?;
    Ok(entries.iter().map(|e| e.amount).sum())
}

/// Appends a debit entry (stored as a negative amount).
///
/// The balance is re-read on the caller's connection, so running this inside
/// the checkout transaction makes the check-and-debit atomic with the rest
/// of the checkout. Fails with `InsufficientBalance` when the amount exceeds
/// the balance.
pub async fn debit(
    conn: &impl ConnectionTrait,
    buyer_id: Uuid,
    amount: Decimal,
    description: impl Into<String>,
) -> Result<CoinTransactionModel, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "debit amount must be positive".to_string(),
        ));
    }

    let current = balance(conn, buyer_id).await?;
    if amount > current {
        return Err(ServiceError::InsufficientBalance);
    }

    let entry = coin_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        buyer_id: Set(buyer_id),
        amount: Set(-amount),
        description: Set(description.into()),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    info!(%buyer_id, %amount, "coin debit applied");
    Ok(entry)
}

/// Appends a credit entry.
pub async fn credit(
    conn: &impl ConnectionTrait,
    buyer_id: Uuid,
    amount: Decimal,
    description: impl Into<String>,
) -> Result<CoinTransactionModel, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "credit amount must be positive".to_string(),
        ));
    }

    let entry = coin_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        buyer_id: Set(buyer_id),
        amount: Set(amount),
        description: Set(description.into()),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    info!(%buyer_id, %amount, "coin credit applied");
    Ok(entry)
}
