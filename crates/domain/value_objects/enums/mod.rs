pub mod plan_ids;
pub mod subscription_actions;
pub mod subscription_statuses;
