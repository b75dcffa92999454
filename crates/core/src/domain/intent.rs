use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Discover,
    CheckAvailability,
    Book,
    Cancel,
    LoyaltyInfo,
    Smalltalk,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Self::Discover,
        Self::CheckAvailability,
        Self::Book,
        Self::Cancel,
        Self::LoyaltyInfo,
        Self::Smalltalk,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::CheckAvailability => "check_availability",
            Self::Book => "book",
            Self::Cancel => "cancel",
            Self::LoyaltyInfo => "loyalty_info",
            Self::Smalltalk => "smalltalk",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "discover"
            | "search"
            | "recommend"
            | "search_restaurants"
            | "recommend_restaurants" => Some(Self::Discover),
            "check_availability" | "availability" => Some(Self::CheckAvailability),
            "book" | "book_table" | "booking" => Some(Self::Book),
            "cancel" | "cancel_reservation" => Some(Self::Cancel),
            "loyalty_info" | "loyalty" | "get_loyalty_profile" => Some(Self::LoyaltyInfo),
            "smalltalk" | "small_talk" | "greeting" => Some(Self::Smalltalk),
            "unknown" | "other" | "none" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Intents that end in a tool call once their slots are complete.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Smalltalk | Self::Unknown)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
