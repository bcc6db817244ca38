//! Plan catalog - the server-trusted plan lookup table
//!
//! Prices and titles always come from here, never from client input.

/// Display currency for all plans
pub const CURRENCY: &str = "NGN";

/// A purchasable data plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Stable plan id (used as button id in interactive messages)
    pub id: &'static str,
    /// Human-readable title
    pub title: &'static str,
    /// Price in provider display units
    pub price: u32,
    /// Mobile network the plan is provisioned on
    pub network: &'static str,
}

/// The fixed plan catalog
pub const PLANS: &[Plan] = &[
    Plan {
        id: "500mb_299",
        title: "500MB",
        price: 299,
        network: "MTN",
    },
    Plan {
        id: "1gb_379",
        title: "1GB",
        price: 379,
        network: "MTN",
    },
];

/// Look up a plan by id
#[must_use]
pub fn find(plan_id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.id == plan_id)
}

/// All plans, in display order
#[must_use]
pub fn all() -> &'static [Plan] {
    PLANS
}
