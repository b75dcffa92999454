//! Typed tool registry.
//!
//! Every tool publishes a [`ToolSpec`] (argument schema plus retry
//! properties). The registry validates arguments against that schema before a
//! tool runs and maps intents to the tool that fulfils them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use concierge_core::domain::intent::Intent;
use concierge_core::domain::slot::SlotName;
use concierge_db::repositories::{
    CapacityStore, LoyaltyRepository, RepositoryError, RestaurantRepository, VenueRepository,
};

pub mod availability;
pub mod booking;
pub mod discover;
pub mod loyalty;
pub mod notify;
pub mod venue;

pub use availability::CheckAvailabilityTool;
pub use booking::{BookTableTool, CancelReservationTool};
pub use discover::DiscoverRestaurantsTool;
pub use loyalty::LoyaltyProfileTool;
pub use notify::{LogNotifier, Notifier, SendNotificationTool};
pub use venue::{GetMenuTool, ListUpcomingEventsTool, LogFeedbackTool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Integer,
}

impl ArgKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.as_str().is_some_and(|text| !text.trim().is_empty()),
            Self::Integer => value.as_u64().is_some(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind, required: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub args: Vec<ArgSpec>,
    /// Safe to run twice with the same arguments.
    pub idempotent: bool,
    /// Deduplicates repeated calls that carry the same token.
    pub accepts_idempotency_token: bool,
}

impl ToolSpec {
    pub fn retry_safe(&self) -> bool {
        self.idempotent || self.accepts_idempotency_token
    }
}

/// A validated invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub args: Map<String, Value>,
    pub idempotency_token: Option<String>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self { tool: tool.into(), args, idempotency_token: None }
    }

    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    pub fn str_arg(&self, name: &str) -> Result<&str, ToolError> {
        self.args.get(name).and_then(Value::as_str).ok_or_else(|| self.missing(name))
    }

    pub fn opt_str_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    pub fn u32_arg(&self, name: &str) -> Result<u32, ToolError> {
        self.opt_u32_arg(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn opt_u32_arg(&self, name: &str) -> Result<Option<u32>, ToolError> {
        match self.args.get(name).and_then(Value::as_u64) {
            Some(value) => u32::try_from(value).map(Some).map_err(|_| ToolError::InvalidArguments {
                tool: self.tool.clone(),
                reason: format!("`{name}` is out of range"),
            }),
            None => Ok(None),
        }
    }

    fn missing(&self, name: &str) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.tool.clone(),
            reason: format!("`{name}` is missing"),
        }
    }
}

/// Reads the `date` / `time` argument pair in wire form (`YYYY-MM-DD`, `HH:MM`).
pub(crate) fn parse_slot_args(
    call: &ToolCall,
    date: &str,
    time: &str,
) -> Result<(NaiveDate, NaiveTime), ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments { tool: call.tool.clone(), reason };
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| invalid(format!("`date` must be YYYY-MM-DD, got {date}")))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| invalid(format!("`time` must be HH:MM, got {time}")))?;
    Ok((date, time))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    CapacityExceeded,
    NotFound,
    UnknownRestaurant,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapacityExceeded => "capacity_exceeded",
            Self::NotFound => "not_found",
            Self::UnknownRestaurant => "unknown_restaurant",
        }
    }
}

/// What a tool produced. A decline is a normal answer, not a failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolResponse {
    Completed { data: Value },
    Declined { reason: DeclineReason, data: Value },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidArguments,
    UnknownTool,
    Store,
    Internal,
    Timeout,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
    #[error("tool failed: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::InvalidArguments { .. } => ToolErrorKind::InvalidArguments,
            Self::UnknownTool(_) => ToolErrorKind::UnknownTool,
            Self::Store(_) => ToolErrorKind::Store,
            Self::Internal(_) => ToolErrorKind::Internal,
        }
    }

    /// Transient failures worth a retry; argument and lookup errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(RepositoryError::TokenReused(_)) => false,
            _ => matches!(self.kind(), ToolErrorKind::Store | ToolErrorKind::Internal),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, call: &ToolCall) -> Result<ToolResponse, ToolError>;
}

/// How an intent is fulfilled: which tool, which slot feeds which argument,
/// and which slots a decline sends back for re-collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRoute {
    pub tool: &'static str,
    pub arguments: Vec<(SlotName, &'static str)>,
    pub decline_invalidates: Vec<SlotName>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    routes: HashMap<Intent, IntentRoute>,
}

/// Stores the standard tool set runs against.
#[derive(Clone)]
pub struct ToolDependencies {
    pub capacity: Arc<dyn CapacityStore>,
    pub restaurants: Arc<dyn RestaurantRepository>,
    pub loyalty: Arc<dyn LoyaltyRepository>,
    pub venues: Arc<dyn VenueRepository>,
    pub notifier: Arc<dyn Notifier>,
}

impl ToolRegistry {
    /// Registers the concierge tools and routes every actionable intent to one.
    pub fn standard(deps: ToolDependencies) -> Self {
        use SlotName::*;

        let mut registry = Self::default();
        let restaurants = deps.restaurants;
        registry.register(DiscoverRestaurantsTool::new(restaurants.clone(), deps.capacity.clone()));
        registry.register(CheckAvailabilityTool::new(restaurants.clone(), deps.capacity.clone()));
        registry.register(BookTableTool::new(restaurants.clone(), deps.capacity.clone()));
        registry.register(CancelReservationTool::new(restaurants.clone(), deps.capacity));
        registry.register(LoyaltyProfileTool::new(deps.loyalty));
        registry.register(SendNotificationTool::new(deps.notifier));
        registry.register(GetMenuTool::new(restaurants.clone(), deps.venues.clone()));
        registry.register(ListUpcomingEventsTool::new(restaurants.clone(), deps.venues.clone()));
        registry.register(LogFeedbackTool::new(restaurants, deps.venues));

        registry.route(
            Intent::Discover,
            IntentRoute {
                tool: discover::NAME,
                arguments: vec![
                    (City, "city"),
                    (PartySize, "party_size"),
                    (Cuisine, "cuisine"),
                    (Date, "date"),
                    (Time, "time"),
                ],
                decline_invalidates: vec![],
            },
        );
        registry.route(
            Intent::CheckAvailability,
            IntentRoute {
                tool: availability::NAME,
                arguments: vec![
                    (RestaurantId, "restaurant_id"),
                    (Date, "date"),
                    (Time, "time"),
                    (PartySize, "party_size"),
                ],
                decline_invalidates: vec![RestaurantId],
            },
        );
        registry.route(
            Intent::Book,
            IntentRoute {
                tool: booking::BOOK_NAME,
                arguments: vec![
                    (RestaurantId, "restaurant_id"),
                    (Date, "date"),
                    (Time, "time"),
                    (PartySize, "party_size"),
                    (CustomerName, "customer_name"),
                ],
                decline_invalidates: vec![RestaurantId],
            },
        );
        registry.route(
            Intent::Cancel,
            IntentRoute {
                tool: booking::CANCEL_NAME,
                arguments: vec![(ReservationId, "reservation_id")],
                decline_invalidates: vec![ReservationId],
            },
        );
        registry.route(
            Intent::LoyaltyInfo,
            IntentRoute {
                tool: loyalty::NAME,
                arguments: vec![(CustomerPhone, "customer_phone")],
                decline_invalidates: vec![CustomerPhone],
            },
        );
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.spec().name.to_string(), Arc::new(tool));
    }

    pub fn route(&mut self, intent: Intent, route: IntentRoute) {
        self.routes.insert(intent, route);
    }

    pub fn route_for(&self, intent: Intent) -> Option<&IntentRoute> {
        self.routes.get(&intent)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs = self.tools.values().map(|tool| tool.spec()).collect::<Vec<_>>();
        specs.sort_by_key(|spec| spec.name);
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks the tool up and checks `args` against its schema: required
    /// arguments present, every argument declared, every value of the right type.
    pub fn prepare(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<(Arc<dyn Tool>, ToolCall), ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let spec = tool.spec();
        let invalid =
            |reason: String| ToolError::InvalidArguments { tool: name.to_string(), reason };

        for arg in &spec.args {
            match args.get(arg.name) {
                Some(value) if !arg.kind.accepts(value) => {
                    let reason = format!("`{}` must be a {:?}", arg.name, arg.kind);
                    return Err(invalid(reason.to_lowercase()));
                }
                None if arg.required => return Err(invalid(format!("`{}` is required", arg.name))),
                _ => {}
            }
        }
        let declared = |key: &&String| spec.args.iter().any(|arg| arg.name == key.as_str());
        if let Some(unknown) = args.keys().find(|key| !declared(key)) {
            return Err(invalid(format!("`{unknown}` is not an argument of this tool")));
        }

        Ok((tool, ToolCall::new(name, args)))
    }

    /// Validates and runs a tool by name, without timeout or retry.
    pub async fn invoke(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<ToolResponse, ToolError> {
        let (tool, call) = self.prepare(name, args)?;
        tool.execute(&call).await
    }
}
