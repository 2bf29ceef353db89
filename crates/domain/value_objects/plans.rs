use crate::domain::value_objects::enums::plan_ids::PlanId;

/// Stripe price ids configured for each sellable plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanCatalog {
    pub monthly_price_id: Option<String>,
    pub annual_price_id: Option<String>,
    pub promotional_price_id: Option<String>,
}

impl PlanCatalog {
    pub fn price_for(&self, plan: PlanId) -> Option<&str> {
        let price = match plan {
            PlanId::Monthly => self.monthly_price_id.as_deref(),
            PlanId::Annual => self.annual_price_id.as_deref(),
            PlanId::Promotional => self.promotional_price_id.as_deref(),
        };
        price.filter(|value| !value.is_empty())
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<PlanId> {
        [PlanId::Monthly, PlanId::Annual, PlanId::Promotional]
            .into_iter()
            .find(|plan| self.price_for(*plan) == Some(price_id))
    }
}
