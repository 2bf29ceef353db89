pub mod entitlements;
pub mod stripe_webhook;
pub mod subscriptions;

#[cfg(test)]
pub(crate) mod test_support;
