use anyhow::{Context, Result};
use crates::{
    domain::value_objects::plans::PlanCatalog,
    payments::stripe_client::DEFAULT_WEBHOOK_TOLERANCE_SECS,
};

use super::config_model::{BackendServer, Database, DotEnvyConfig, Stripe};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok())
}

/// Builds the config from any key lookup so it can be exercised without touching the process env.
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let required = |key: &str| -> Result<String> {
        lookup(key)
            .filter(|value| !value.trim().is_empty())
            .with_context(|| format!("{key} is invalid"))
    };
    let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is not a port")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is not a number")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is not a number")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: match optional("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .context("DATABASE_MAX_CONNECTIONS is not a number")?,
            None => 10,
        },
    };

    let stripe = Stripe {
        secret_key: required("STRIPE_SECRET_KEY")?,
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
        webhook_tolerance_secs: match optional("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw
                .parse()
                .context("STRIPE_WEBHOOK_TOLERANCE_SECS is not a number")?,
            None => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        },
        success_url: required("STRIPE_SUCCESS_URL")?,
        cancel_url: required("STRIPE_CANCEL_URL")?,
        plan_catalog: PlanCatalog {
            monthly_price_id: optional("STRIPE_PRICE_MONTHLY"),
            annual_price_id: optional("STRIPE_PRICE_ANNUAL"),
            promotional_price_id: optional("STRIPE_PRICE_PROMOTIONAL"),
        },
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        stripe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::domain::value_objects::enums::plan_ids::PlanId;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SERVER_PORT_BACKEND", "8080"),
            ("SERVER_BODY_LIMIT", "10"),
            ("SERVER_TIMEOUT", "30"),
            ("DATABASE_URL", "postgres://localhost:5432/db"),
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
            ("STRIPE_SUCCESS_URL", "https://example.com/premium/success"),
            ("STRIPE_CANCEL_URL", "https://example.com/premium"),
            ("STRIPE_PRICE_MONTHLY", "price_month"),
        ])
    }

    fn load_with(vars: &HashMap<&'static str, &'static str>) -> Result<DotEnvyConfig> {
        load_from(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn loads_defaults_for_optional_values() {
        let config = load_with(&base_vars()).unwrap();

        assert_eq!(config.backend_server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.stripe.webhook_tolerance_secs, DEFAULT_WEBHOOK_TOLERANCE_SECS);
        assert_eq!(config.stripe.plan_catalog.price_for(PlanId::Monthly), Some("price_month"));
        assert_eq!(config.stripe.plan_catalog.price_for(PlanId::Annual), None);
    }

    #[test]
    fn missing_webhook_secret_is_an_error() {
        let mut vars = base_vars();
        vars.remove("STRIPE_WEBHOOK_SECRET");

        let err = load_with(&vars).unwrap_err();
        assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
    }

    #[test]
    fn malformed_port_is_an_error() {
        let mut vars = base_vars();
        vars.insert("SERVER_PORT_BACKEND", "eighty");

        assert!(load_with(&vars).is_err());
    }
}
