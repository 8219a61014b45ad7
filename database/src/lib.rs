pub mod upsert;

#[cfg(test)]
mod tests;

pub use upsert::UpsertReport;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;
use undertow_core::{
    CoreError, DatabaseError, RedditCredentials, Subreddit, TwitterCredentials, TwitterRegion,
};

/// SQLite-backed store for the ingestion pipeline.
///
/// Credentials and scope entities are read-shared across concurrent jobs;
/// record writes go through the natural-key upsert methods in [`upsert`].
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database at {}", database_url);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                reason: e.to_string(),
            })?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The active Reddit developer account, if one has been configured.
    pub async fn active_reddit_credentials(&self) -> Result<RedditCredentials, CoreError> {
        let row = sqlx::query(
            r#"SELECT client_id, client_secret, user_agent
               FROM reddit_developer_accounts
               WHERE active = 1 ORDER BY id LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        match row {
            Some(row) => Ok(RedditCredentials {
                client_id: row.try_get("client_id").map_err(DatabaseError::Sql)?,
                client_secret: row.try_get("client_secret").map_err(DatabaseError::Sql)?,
                user_agent: row.try_get("user_agent").map_err(DatabaseError::Sql)?,
            }),
            None => Err(CoreError::NotFound {
                resource: "active reddit developer account".to_string(),
            }),
        }
    }

    /// The active Twitter developer account, if one has been configured.
    pub async fn active_twitter_credentials(&self) -> Result<TwitterCredentials, CoreError> {
        let row = sqlx::query(
            r#"SELECT app_name, api_key, api_secret_key, bearer_token,
                      access_token, access_token_secret
               FROM twitter_developer_accounts
               WHERE active = 1 ORDER BY id LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        match row {
            Some(row) => Ok(TwitterCredentials {
                app_name: row.try_get("app_name").map_err(DatabaseError::Sql)?,
                api_key: row.try_get("api_key").map_err(DatabaseError::Sql)?,
                api_secret_key: row.try_get("api_secret_key").map_err(DatabaseError::Sql)?,
                bearer_token: row.try_get("bearer_token").map_err(DatabaseError::Sql)?,
                access_token: row.try_get("access_token").map_err(DatabaseError::Sql)?,
                access_token_secret: row
                    .try_get("access_token_secret")
                    .map_err(DatabaseError::Sql)?,
            }),
            None => Err(CoreError::NotFound {
                resource: "active twitter developer account".to_string(),
            }),
        }
    }

    /// All subreddits registered for polling.
    pub async fn list_subreddits(&self) -> Result<Vec<Subreddit>, CoreError> {
        let rows = sqlx::query("SELECT name, description FROM subreddits ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

        let mut subreddits = Vec::with_capacity(rows.len());
        for row in rows {
            subreddits.push(Subreddit {
                name: row.try_get("name").map_err(DatabaseError::Sql)?,
                description: row.try_get("description").map_err(DatabaseError::Sql)?,
            });
        }
        Ok(subreddits)
    }

    /// All regions known from discovery.
    pub async fn list_regions(&self) -> Result<Vec<TwitterRegion>, CoreError> {
        let rows = sqlx::query(
            r#"SELECT woeid, name, location_type, parent_woeid, country, country_code
               FROM twitter_regions ORDER BY woeid"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;

        let mut regions = Vec::with_capacity(rows.len());
        for row in rows {
            regions.push(TwitterRegion {
                woeid: row.try_get("woeid").map_err(DatabaseError::Sql)?,
                name: row.try_get("name").map_err(DatabaseError::Sql)?,
                location_type: row.try_get("location_type").map_err(DatabaseError::Sql)?,
                parent_woeid: row.try_get("parent_woeid").map_err(DatabaseError::Sql)?,
                country: row.try_get("country").map_err(DatabaseError::Sql)?,
                country_code: row.try_get("country_code").map_err(DatabaseError::Sql)?,
            });
        }
        Ok(regions)
    }

    /// Administrative seed path for subreddit scope entities. The ingestion
    /// pipeline itself never creates scopes.
    pub async fn add_subreddit(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO subreddits (name, description)
               VALUES (?1, ?2)
               ON CONFLICT(name) DO UPDATE SET description = excluded.description"#,
        )
        .bind(name)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Sql)?;
        Ok(())
    }
}
