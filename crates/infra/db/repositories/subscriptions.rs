use anyhow::Result;
use async_trait::async_trait;
use diesel::{
    OptionalExtension, RunQueryDsl, insert_into,
    pg::Pg,
    prelude::*,
    query_builder::QueryFragment,
    query_dsl::methods::{self, ExecuteDsl},
    upsert::excluded,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::user_subscriptions},
};
use domain::{
    entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::subscriptions::UpsertOutcome,
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_email(&self, user_email: &str) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = user_subscriptions::table
            .filter(user_subscriptions::user_email.eq(user_email))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn upsert_by_email(&self, entity: UpsertSubscriptionEntity) -> Result<UpsertOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let written = guarded_upsert(&entity).execute(&mut conn)?;

        if written == 0 {
            debug!(
                user_email = %entity.user_email,
                incoming_event_at = %entity.last_event_at,
                "subscriptions_postgres: stored snapshot is newer, write skipped"
            );
            return Ok(UpsertOutcome::Stale);
        }

        Ok(UpsertOutcome::Applied)
    }
}

/// Overwrites only when the incoming event is not older than the stored one; the
/// guard sits in the statement so it also holds against a concurrent first insert.
fn guarded_upsert(
    entity: &UpsertSubscriptionEntity,
) -> impl RunQueryDsl<PgConnection> + ExecuteDsl<PgConnection> + QueryFragment<Pg> + '_ {
    let upsert = insert_into(user_subscriptions::table)
        .values(entity)
        .on_conflict(user_subscriptions::user_email)
        .do_update()
        .set(entity);

    methods::FilterDsl::filter(
        upsert,
        user_subscriptions::last_event_at.le(excluded(user_subscriptions::last_event_at)),
    )
}
