use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(User, "user", {
    email: String,
    api_key: Option<String>,
    admin: bool
});

impl User {
    pub fn new(email: String, api_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            email,
            api_key,
            admin: false,
        }
    }

    pub async fn find_by_api_key(
        api_key: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<User>, AppError> {
        let users: Vec<User> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE api_key = $api_key")
            .bind(("table", Self::table_name()))
            .bind(("api_key", api_key.to_string()))
            .await?
            .take(0)?;

        Ok(users.into_iter().next())
    }
}
