use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

use crate::{
    entities::{user, User},
    errors::ServiceError,
};

/// Resolves a guest checkout contact to a user row, creating one when the
/// email has never been seen. Runs on the caller's connection so guest
/// resolution participates in the order transaction.
pub async fn find_or_create_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
    full_name: &str,
    phone: Option<&str>,
) -> Result<user::Model, ServiceError> {
    let normalized = email.trim().to_ascii_lowercase();

    if let Some(existing) = User::find()
        .filter(user::Column::Email.eq(normalized.as_str()))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let (first_name, last_name) = split_name(full_name);

    let created = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(normalized.clone()),
        first_name: Set(first_name),
        last_name: Set(last_name),
        phone: Set(phone.map(str::to_string)),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    info!(user_id = %created.id, email = %normalized, "Created user for guest checkout");

    Ok(created)
}

fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_handles_single_and_compound_names() {
        assert_eq!(split_name("Ana"), ("Ana".to_string(), String::new()));
        assert_eq!(
            split_name("Ana María Rojas"),
            ("Ana".to_string(), "María Rojas".to_string())
        );
        assert_eq!(split_name(""), (String::new(), String::new()));
    }
}
