use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use async_trait::async_trait;
use crates::{
    domain::{
        entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity},
        repositories::subscriptions::SubscriptionRepository,
        value_objects::subscriptions::UpsertOutcome,
    },
    payments::stripe_client::{StripeCustomer, StripeEvent, StripeSubscription},
};
use serde_json::{Value, json};

use super::subscriptions::MockStripeGateway;

/// Store double that keeps the same event-ordering rule as the Postgres repository.
#[derive(Default)]
pub(crate) struct InMemorySubscriptionRepository {
    rows: Mutex<HashMap<String, SubscriptionEntity>>,
    writes: AtomicUsize,
}

impl InMemorySubscriptionRepository {
    pub(crate) fn get(&self, email: &str) -> Option<SubscriptionEntity> {
        self.rows.lock().unwrap().get(email).cloned()
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn find_by_email(&self, user_email: &str) -> Result<Option<SubscriptionEntity>> {
        Ok(self.get(user_email))
    }

    async fn upsert_by_email(&self, entity: UpsertSubscriptionEntity) -> Result<UpsertOutcome> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(stored) = rows.get(&entity.user_email) {
            if stored.last_event_at > entity.last_event_at {
                return Ok(UpsertOutcome::Stale);
            }
        }
        rows.insert(entity.user_email.clone(), entity.into());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(UpsertOutcome::Applied)
    }
}

pub(crate) const PERIOD_START: i64 = 1_900_000_000;
pub(crate) const PERIOD_END: i64 = 1_902_592_000;

pub(crate) fn event_payload(event_type: &str, created: i64, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{event_type}_{created}"),
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": { "object": object }
    }))
    .unwrap()
}

pub(crate) fn subscription_object(status: &str, cancel_at_period_end: bool) -> Value {
    json!({
        "id": "sub_1",
        "object": "subscription",
        "customer": "cus_1",
        "status": status,
        "cancel_at_period_end": cancel_at_period_end,
        "current_period_start": PERIOD_START,
        "current_period_end": PERIOD_END,
        "metadata": {},
        "items": { "data": [
            { "price": { "id": "price_month", "recurring": { "interval": "month" } } }
        ]}
    })
}

pub(crate) fn invoice_object() -> Value {
    json!({
        "id": "in_1",
        "object": "invoice",
        "customer": "cus_1",
        "subscription": "sub_1",
        "billing_reason": "subscription_cycle"
    })
}

/// Gateway that accepts every signature and knows one customer and one subscription.
pub(crate) fn stripe_with(customer_email: Option<&str>, subscription: Value) -> MockStripeGateway {
    let mut stripe = MockStripeGateway::new();

    stripe
        .expect_verify_webhook_signature()
        .returning(|payload, _| Ok(serde_json::from_slice::<StripeEvent>(payload)?));

    let email = customer_email.map(str::to_string);
    stripe.expect_retrieve_customer().returning(move |customer_id| {
        Ok(StripeCustomer {
            id: customer_id.to_string(),
            email: email.clone(),
            deleted: false,
        })
    });

    stripe.expect_retrieve_subscription().returning(move |_| {
        Ok(serde_json::from_value::<StripeSubscription>(subscription.clone())?)
    });

    stripe
}
