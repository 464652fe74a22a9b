use anyhow::Context;
use chrono::{DateTime, Utc};
use dagr_core::{Goal, UserConfig};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool, PoolError},
        AsyncDieselConnectionManager, ManagerConfig,
    },
    AsyncPgConnection, RunQueryDsl,
};
use uuid::Uuid;

use crate::models::{UserConfigRow, UserRow};

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConn = Object<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool() -> anyhow::Result<DbPool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

/// Check a connection out of the pool. Exhaustion surfaces as the pool
/// error so handlers can answer 503.
pub async fn get_conn(pool: &DbPool) -> Result<DbConn, PoolError> {
    pool.get().await
}

// User database operations
pub mod users {
    use super::*;

    /// Tokens granted by Google at login.
    pub struct GoogleTokens<'a> {
        pub refresh_token: Option<&'a str>,
        pub access_token: &'a str,
        pub expires_at: Option<DateTime<Utc>>,
    }

    pub async fn get_by_id(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<UserRow> {
        use crate::schema::users::dsl::*;

        let user = users
            .filter(id.eq(user_id))
            .select(UserRow::as_select())
            .first(conn)
            .await?;

        Ok(user)
    }

    /// Create the user on first login, otherwise refresh their name and tokens.
    ///
    /// Google only sends a refresh token on the first consent, so a missing
    /// one keeps the stored value.
    pub async fn upsert_login(
        conn: &mut AsyncPgConnection,
        email_val: &str,
        name_val: Option<&str>,
        tokens: &GoogleTokens<'_>,
    ) -> QueryResult<UserRow> {
        use crate::schema::users::dsl::*;

        let email_val = email_val.trim().to_lowercase();
        let now = Utc::now();

        let user = match tokens.refresh_token {
            Some(refresh) => {
                diesel::insert_into(users)
                    .values((
                        email.eq(&email_val),
                        name.eq(name_val),
                        google_refresh_token.eq(Some(refresh)),
                        google_access_token.eq(Some(tokens.access_token)),
                        google_token_expires_at.eq(tokens.expires_at),
                    ))
                    .on_conflict(email)
                    .do_update()
                    .set((
                        name.eq(name_val),
                        google_refresh_token.eq(Some(refresh)),
                        google_access_token.eq(Some(tokens.access_token)),
                        google_token_expires_at.eq(tokens.expires_at),
                        updated_at.eq(now),
                    ))
                    .returning(UserRow::as_returning())
                    .get_result(conn)
                    .await?
            }
            None => {
                diesel::insert_into(users)
                    .values((
                        email.eq(&email_val),
                        name.eq(name_val),
                        google_access_token.eq(Some(tokens.access_token)),
                        google_token_expires_at.eq(tokens.expires_at),
                    ))
                    .on_conflict(email)
                    .do_update()
                    .set((
                        name.eq(name_val),
                        google_access_token.eq(Some(tokens.access_token)),
                        google_token_expires_at.eq(tokens.expires_at),
                        updated_at.eq(now),
                    ))
                    .returning(UserRow::as_returning())
                    .get_result(conn)
                    .await?
            }
        };

        Ok(user)
    }
}

// User config database operations
pub mod user_configs {
    use super::*;
    use crate::models::{NewUserConfig, UserConfigChangeset};

    pub async fn get_by_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
    ) -> QueryResult<Option<UserConfig>> {
        use crate::schema::user_configs::dsl::*;

        let config = user_configs
            .filter(user_id.eq(owner))
            .select(UserConfigRow::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(config.map(Into::into))
    }

    /// Insert the user's config. Returns `None` when one already exists.
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_config: NewUserConfig,
    ) -> QueryResult<Option<UserConfig>> {
        use crate::schema::user_configs::dsl::*;

        let created = diesel::insert_into(user_configs)
            .values(&new_config)
            .on_conflict(user_id)
            .do_nothing()
            .returning(UserConfigRow::as_returning())
            .get_result(conn)
            .await
            .optional()?;

        Ok(created.map(Into::into))
    }

    /// Apply a partial update. Returns `None` when the user has no config.
    pub async fn update(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        mut changes: UserConfigChangeset,
    ) -> QueryResult<Option<UserConfig>> {
        use crate::schema::user_configs::dsl::*;

        changes.updated_at = Some(Utc::now());

        let updated = diesel::update(user_configs.filter(user_id.eq(owner)))
            .set(&changes)
            .returning(UserConfigRow::as_returning())
            .get_result(conn)
            .await
            .optional()?;

        Ok(updated.map(Into::into))
    }

    pub(super) type UnclaimedConfig = diesel::dsl::Filter<
        diesel::dsl::Filter<
            crate::schema::user_configs::table,
            diesel::dsl::Eq<crate::schema::user_configs::user_id, Uuid>,
        >,
        diesel::dsl::IsNull<crate::schema::user_configs::dagr_calendar_id>,
    >;

    /// The owner's config row, only while it has no Dagr calendar yet.
    pub(super) fn unclaimed_config(owner: Uuid) -> UnclaimedConfig {
        use crate::schema::user_configs::dsl::*;

        user_configs
            .filter(user_id.eq(owner))
            .filter(dagr_calendar_id.is_null())
    }

    /// Record the Dagr calendar unless one is already stored. Returns `false`
    /// when another request got there first; the stored id is kept.
    pub async fn set_dagr_calendar_if_unset(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        calendar_id: &str,
    ) -> QueryResult<bool> {
        use crate::schema::user_configs::dsl::*;

        let affected = diesel::update(unclaimed_config(owner))
            .set((dagr_calendar_id.eq(Some(calendar_id)), updated_at.eq(Utc::now())))
            .execute(conn)
            .await?;

        Ok(affected > 0)
    }

    pub async fn exists(conn: &mut AsyncPgConnection, owner: Uuid) -> QueryResult<bool> {
        use crate::schema::user_configs::dsl::*;

        let found = diesel::select(diesel::dsl::exists(user_configs.filter(user_id.eq(owner))))
            .get_result::<bool>(conn)
            .await?;

        Ok(found)
    }
}

// Goal database operations. Every query is scoped to the owning user and
// skips soft-deleted rows.
pub mod goals {
    use super::*;
    use crate::models::{GoalChangeset, NewGoal};

    pub async fn list_active(conn: &mut AsyncPgConnection, owner: Uuid) -> QueryResult<Vec<Goal>> {
        use crate::schema::goals::dsl::*;

        let items = goals
            .filter(user_id.eq(owner))
            .filter(deleted_at.is_null())
            .order_by((priority.desc(), created_at.asc()))
            .load::<Goal>(conn)
            .await?;

        Ok(items)
    }

    pub async fn create(conn: &mut AsyncPgConnection, new_goal: NewGoal<'_>) -> QueryResult<Goal> {
        use crate::schema::goals::dsl::*;

        let goal = diesel::insert_into(goals)
            .values(&new_goal)
            .get_result::<Goal>(conn)
            .await?;

        Ok(goal)
    }

    pub async fn update(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        goal_id: Uuid,
        changes: GoalChangeset<'_>,
    ) -> QueryResult<Option<Goal>> {
        use crate::schema::goals::dsl::*;

        let updated = diesel::update(
            goals
                .filter(id.eq(goal_id))
                .filter(user_id.eq(owner))
                .filter(deleted_at.is_null()),
        )
        .set(&changes)
        .get_result::<Goal>(conn)
        .await
        .optional()?;

        Ok(updated)
    }

    /// Soft delete. Returns `false` when there was nothing to delete.
    pub async fn soft_delete(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        goal_id: Uuid,
    ) -> QueryResult<bool> {
        use crate::schema::goals::dsl::*;

        let now = Utc::now();
        let affected = diesel::update(
            goals
                .filter(id.eq(goal_id))
                .filter(user_id.eq(owner))
                .filter(deleted_at.is_null()),
        )
        .set((deleted_at.eq(Some(now)), updated_at.eq(now)))
        .execute(conn)
        .await?;

        Ok(affected > 0)
    }
}
