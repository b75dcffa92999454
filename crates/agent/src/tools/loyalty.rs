use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use concierge_core::domain::slot::normalize_phone;
use concierge_db::repositories::LoyaltyRepository;

use super::{ArgKind, ArgSpec, DeclineReason, Tool, ToolCall, ToolError, ToolResponse, ToolSpec};

pub const NAME: &str = "loyalty_profile";

pub struct LoyaltyProfileTool {
    loyalty: Arc<dyn LoyaltyRepository>,
}

impl LoyaltyProfileTool {
    pub fn new(loyalty: Arc<dyn LoyaltyRepository>) -> Self {
        Self { loyalty }
    }
}

#[async_trait]
impl Tool for LoyaltyProfileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Loyalty tier and preferences for a phone number",
            args: vec![ArgSpec::required("customer_phone", ArgKind::String)],
            idempotent: true,
            accepts_idempotency_token: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let raw = call.str_arg("customer_phone")?;
        let phone = normalize_phone(raw).ok_or_else(|| ToolError::InvalidArguments {
            tool: call.tool.clone(),
            reason: format!("`customer_phone` is not a phone number: {raw}"),
        })?;

        // Profiles are stored as national numbers; a +91 prefix still matches.
        let mut profile = self.loyalty.find_by_phone(&phone).await?;
        if profile.is_none() && phone.len() > 10 {
            let national = &phone[phone.len() - 10..];
            profile = self.loyalty.find_by_phone(national).await?;
        }

        match profile {
            Some(profile) => Ok(ToolResponse::Completed {
                data: json!({
                    "phone": profile.phone,
                    "name": profile.name,
                    "tier": profile.tier.as_str(),
                    "favorite_cuisine": profile.favorite_cuisine,
                    "preferred_city": profile.preferred_city,
                }),
            }),
            None => Ok(ToolResponse::Declined {
                reason: DeclineReason::NotFound,
                data: json!({ "phone": phone }),
            }),
        }
    }
}
