//! Repository traits for per-user entities.
//!
//! Every Dagr entity belongs to exactly one user, so every operation takes
//! the owner's id. Rows owned by someone else behave as if they do not exist.

use dagr_core::{CreateGoalRequest, Goal, UpdateGoalRequest};
use diesel::QueryResult;
use diesel_async::AsyncPgConnection;
use uuid::Uuid;

use crate::models::{GoalChangeset, NewGoal};

/// Default goal priority when a create request leaves it out.
pub const DEFAULT_GOAL_PRIORITY: i32 = 1;

/// CRUD over entities owned by a single user.
///
/// `update` and `delete` return `None`/`false` for ids that are
/// missing or belong to another user; handlers turn that into a 404.
#[allow(async_fn_in_trait)]
pub trait Repository {
    type Entity;
    type CreateInput;
    type UpdateInput;

    async fn list(conn: &mut AsyncPgConnection, owner: Uuid) -> QueryResult<Vec<Self::Entity>>;

    async fn create(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        input: Self::CreateInput,
    ) -> QueryResult<Self::Entity>;

    async fn update(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        id: Uuid,
        input: Self::UpdateInput,
    ) -> QueryResult<Option<Self::Entity>>;

    async fn delete(conn: &mut AsyncPgConnection, owner: Uuid, id: Uuid) -> QueryResult<bool>;
}

/// Goals are soft deleted: `delete` stamps `deleted_at` and the row
/// disappears from `list`.
pub struct Goals;

impl Repository for Goals {
    type Entity = Goal;
    type CreateInput = CreateGoalRequest;
    type UpdateInput = UpdateGoalRequest;

    async fn list(conn: &mut AsyncPgConnection, owner: Uuid) -> QueryResult<Vec<Goal>> {
        crate::db::goals::list_active(conn, owner).await
    }

    async fn create(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        input: CreateGoalRequest,
    ) -> QueryResult<Goal> {
        let new_goal = NewGoal {
            user_id: owner,
            title: input.title.trim(),
            description: input.description.as_deref(),
            priority: input.priority.unwrap_or(DEFAULT_GOAL_PRIORITY),
        };
        crate::db::goals::create(conn, new_goal).await
    }

    async fn update(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        id: Uuid,
        input: UpdateGoalRequest,
    ) -> QueryResult<Option<Goal>> {
        let changes = GoalChangeset::from_request(&input, chrono::Utc::now());
        crate::db::goals::update(conn, owner, id, changes).await
    }

    async fn delete(conn: &mut AsyncPgConnection, owner: Uuid, id: Uuid) -> QueryResult<bool> {
        crate::db::goals::soft_delete(conn, owner, id).await
    }
}
