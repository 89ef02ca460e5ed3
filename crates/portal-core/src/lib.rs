//! Core domain model for the partner support portal.

pub mod sla;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "portal-core";

/// Raised when a raw string does not name any variant of a portal enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Value/label pair used to populate select inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Display mapping for a status or urgency value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: &'static str,
    pub css_class: &'static str,
    pub weight: u8,
}

impl Badge {
    pub const UNKNOWN: Badge = Badge {
        label: "Unknown",
        css_class: "badge-neutral",
        weight: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    Critical,
    High,
    Normal,
    Low,
    /// Any value a fixture or backend sends that the portal does not know.
    #[serde(other)]
    Unknown,
}

impl Urgency {
    /// Every known urgency; `Unknown` is never offered or parsed.
    pub const ALL: [Urgency; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }

    pub fn label(self) -> &'static str {
        self.badge().label
    }

    /// Longer label used by the new-case form.
    pub fn option_label(self) -> &'static str {
        match self {
            Self::Critical => "Critical – event within 24h",
            Self::High => "High – event within 3 days",
            Self::Normal => "Normal",
            Self::Low => "Low",
            Self::Unknown => Badge::UNKNOWN.label,
        }
    }

    pub fn badge(self) -> Badge {
        match self {
            Self::Critical => Badge {
                label: "Critical",
                css_class: "urgency-critical",
                weight: 3,
            },
            Self::High => Badge {
                label: "High",
                css_class: "urgency-high",
                weight: 2,
            },
            Self::Normal => Badge {
                label: "Normal",
                css_class: "urgency-normal",
                weight: 1,
            },
            Self::Low => Badge {
                label: "Low",
                css_class: "urgency-low",
                weight: 0,
            },
            Self::Unknown => Badge::UNKNOWN,
        }
    }

    pub fn severity(self) -> u8 {
        self.badge().weight
    }

    /// Critical and high requests go to the escalation queue.
    pub fn is_escalated(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    /// Resolution target used when a new case is created.
    pub fn sla_target(self) -> Duration {
        match self {
            Self::Critical => Duration::hours(4),
            Self::High => Duration::hours(24),
            Self::Normal | Self::Unknown => Duration::hours(72),
            Self::Low => Duration::hours(120),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("urgency", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Pending,
    Resolved,
    Closed,
    #[serde(other)]
    Unknown,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 5] = [
        Self::Open,
        Self::InProgress,
        Self::Pending,
        Self::Resolved,
        Self::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        }
    }

    pub fn label(self) -> &'static str {
        self.badge().label
    }

    /// Weight is the lifecycle position; resolved and closed share the last slot.
    pub fn badge(self) -> Badge {
        match self {
            Self::Open => Badge {
                label: "Open",
                css_class: "status-open",
                weight: 0,
            },
            Self::InProgress => Badge {
                label: "In Progress",
                css_class: "status-in-progress",
                weight: 1,
            },
            Self::Pending => Badge {
                label: "Pending",
                css_class: "status-pending",
                weight: 2,
            },
            Self::Resolved => Badge {
                label: "Resolved",
                css_class: "status-resolved",
                weight: 3,
            },
            Self::Closed => Badge {
                label: "Closed",
                css_class: "status-closed",
                weight: 3,
            },
            Self::Unknown => Badge::UNKNOWN,
        }
    }

    /// Resolved and closed cases leave the active tab and stop their SLA clock.
    /// An unknown status counts as active.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// Partner-facing progress message shown on case cards.
    pub fn progress_message(self) -> &'static str {
        match self {
            Self::Resolved | Self::Closed => "Resolved",
            Self::InProgress => "In progress",
            Self::Pending => "Awaiting your response",
            Self::Open => "Submitted",
            Self::Unknown => "Status unavailable",
        }
    }

    pub fn can_transition_to(self, next: CaseStatus) -> bool {
        use CaseStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (InProgress, Pending)
                | (Pending, InProgress)
                | (InProgress, Resolved)
                | (Pending, Resolved)
                | (Resolved, Closed)
        )
    }

    pub fn next_statuses(self) -> Vec<CaseStatus> {
        Self::ALL
            .into_iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("status", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseSource {
    Portal,
    Email,
    Phone,
}

impl CaseSource {
    pub const ALL: [CaseSource; 3] = [Self::Portal, Self::Email, Self::Phone];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portal => "portal",
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Portal => "Portal",
            Self::Email => "Email",
            Self::Phone => "Phone",
        }
    }
}

impl FromStr for CaseSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("source", s))
    }
}

const TICKETING_PRESALE_SUBS: &[SelectOption] = &[
    SelectOption { value: "presale-setup", label: "Presale Setup" },
    SelectOption { value: "ticket-types", label: "Ticket Types Configuration" },
    SelectOption { value: "pricing-tiers", label: "Pricing Tiers" },
    SelectOption { value: "seat-map", label: "Seat Map Issues" },
    SelectOption { value: "other", label: "Other" },
];

const EVENT_DAY_SUBS: &[SelectOption] = &[
    SelectOption { value: "scanner-sync", label: "Scanner not syncing" },
    SelectOption { value: "barcode-error", label: "Barcode scanning error" },
    SelectOption { value: "gate-throughput", label: "Gate throughput issue" },
    SelectOption { value: "device-malfunction", label: "Device malfunction" },
    SelectOption { value: "other", label: "Other" },
];

const SETTLEMENT_PAYMENTS_SUBS: &[SelectOption] = &[
    SelectOption { value: "payment-delay", label: "Payment Delay" },
    SelectOption { value: "settlement-discrepancy", label: "Settlement Discrepancy" },
    SelectOption { value: "report-access", label: "Report Access" },
    SelectOption { value: "other", label: "Other" },
];

const INVENTORY_PRICING_SUBS: &[SelectOption] = &[
    SelectOption { value: "inventory-hold", label: "Inventory Hold Issues" },
    SelectOption { value: "dynamic-pricing", label: "Dynamic Pricing" },
    SelectOption { value: "offer-codes", label: "Offer Codes" },
    SelectOption { value: "other", label: "Other" },
];

const TECHNICAL_INTEGRATION_SUBS: &[SelectOption] = &[
    SelectOption { value: "api-error", label: "API Error" },
    SelectOption { value: "webhook-issues", label: "Webhook Issues" },
    SelectOption { value: "sdk-integration", label: "SDK Integration" },
    SelectOption { value: "authentication", label: "Authentication Problems" },
    SelectOption { value: "other", label: "Other" },
];

const OTHER_SUBS: &[SelectOption] = &[
    SelectOption { value: "general-inquiry", label: "General Inquiry" },
    SelectOption { value: "feedback", label: "Feedback" },
    SelectOption { value: "other", label: "Other" },
];

pub const TRIED_SOLUTION_OPTIONS: &[SelectOption] = &[
    SelectOption { value: "visited-help-center", label: "Visited Help Center / Knowledge Base" },
    SelectOption { value: "reviewed-checklist", label: "Reviewed Event-Day Checklist" },
    SelectOption { value: "device-diagnostics", label: "Performed scanner/device diagnostics" },
    SelectOption { value: "sample-scan", label: "Tried sample ticket scan" },
    SelectOption { value: "other", label: "Other" },
];

pub const ESCALATION_QUEUE: &str = "Event-Day Support";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestCategory {
    TicketingPresale,
    EventDay,
    SettlementPayments,
    InventoryPricing,
    TechnicalIntegration,
    Other,
}

impl RequestCategory {
    pub const ALL: [RequestCategory; 6] = [
        Self::TicketingPresale,
        Self::EventDay,
        Self::SettlementPayments,
        Self::InventoryPricing,
        Self::TechnicalIntegration,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketingPresale => "ticketing-presale",
            Self::EventDay => "event-day",
            Self::SettlementPayments => "settlement-payments",
            Self::InventoryPricing => "inventory-pricing",
            Self::TechnicalIntegration => "technical-integration",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TicketingPresale => "Ticketing & Presale",
            Self::EventDay => "Event-Day / Access Control / Scanning",
            Self::SettlementPayments => "Settlement & Payments",
            Self::InventoryPricing => "Inventory / Pricing / Offers",
            Self::TechnicalIntegration => "Technical / Integration / API",
            Self::Other => "Other",
        }
    }

    pub fn sub_categories(self) -> &'static [SelectOption] {
        match self {
            Self::TicketingPresale => TICKETING_PRESALE_SUBS,
            Self::EventDay => EVENT_DAY_SUBS,
            Self::SettlementPayments => SETTLEMENT_PAYMENTS_SUBS,
            Self::InventoryPricing => INVENTORY_PRICING_SUBS,
            Self::TechnicalIntegration => TECHNICAL_INTEGRATION_SUBS,
            Self::Other => OTHER_SUBS,
        }
    }

    pub fn sub_category_label(self, value: &str) -> Option<&'static str> {
        self.sub_categories()
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label)
    }

    pub fn default_queue(self) -> &'static str {
        match self {
            Self::TicketingPresale => "Ticketing Operations",
            Self::EventDay => ESCALATION_QUEUE,
            Self::SettlementPayments => "Settlement & Finance",
            Self::InventoryPricing => "Inventory & Pricing",
            Self::TechnicalIntegration => "Partner API Support",
            Self::Other => "General Support",
        }
    }

    /// Queue a new case lands in; escalated urgencies override the category queue.
    pub fn route_queue(self, urgency: Urgency) -> &'static str {
        if urgency.is_escalated() {
            ESCALATION_QUEUE
        } else {
            self.default_queue()
        }
    }
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("category", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseComment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_internal: bool,
}

/// A partner support case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub case_number: String,
    pub category: RequestCategory,
    pub sub_category: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    pub venue_partner_id: String,
    pub market: String,
    pub urgency: Urgency,
    pub description: String,
    #[serde(default)]
    pub tried_solutions: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub status: CaseStatus,
    pub assigned_queue: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<CaseSource>,
    #[serde(default)]
    pub comments: Vec<CaseComment>,
    pub contact_name: String,
    pub contact_email: String,
    pub partner_id: String,
    pub role: String,
    pub company: String,
}

impl Case {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// The SLA deadline only applies while the case is still being worked.
    pub fn active_sla_deadline(&self) -> Option<DateTime<Utc>> {
        self.is_active().then_some(self.sla_deadline)
    }

    pub fn category_label(&self) -> &'static str {
        self.category.label()
    }

    pub fn sub_category_label(&self) -> &str {
        self.category
            .sub_category_label(&self.sub_category)
            .unwrap_or(self.sub_category.as_str())
    }

    /// Cases without a recorded channel arrived through the portal.
    pub fn source_label(&self) -> &'static str {
        self.source.unwrap_or(CaseSource::Portal).label()
    }

    pub fn contact_initials(&self) -> String {
        initials(&self.contact_name)
    }
}

/// Up to two upper-cased initials, e.g. "Jamie Smith" -> "JS".
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|part| part.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleKind {
    Article,
    Video,
    Training,
    External,
}

impl ArticleKind {
    pub const ALL: [ArticleKind; 4] = [Self::Article, Self::Video, Self::Training, Self::External];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Video => "video",
            Self::Training => "training",
            Self::External => "external",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Article => "Article",
            Self::Video => "Video",
            Self::Training => "Training",
            Self::External => "External",
        }
    }

    /// Plural tab label on the knowledge base page.
    pub fn tab_label(self) -> &'static str {
        match self {
            Self::Article => "Articles",
            Self::Video => "Videos",
            Self::Training => "Training",
            Self::External => "External",
        }
    }
}

impl FromStr for ArticleKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("article type", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeArticle {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ArticleKind,
    pub url: String,
    pub source: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchResultKind {
    Knowledge,
    Case,
    Training,
    Video,
    External,
}

impl SearchResultKind {
    pub const ALL: [SearchResultKind; 5] = [
        Self::Knowledge,
        Self::Case,
        Self::Training,
        Self::Video,
        Self::External,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Case => "case",
            Self::Training => "training",
            Self::Video => "video",
            Self::External => "external",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Knowledge => "Knowledge Article",
            Self::Case => "Support Case",
            Self::Training => "Training",
            Self::Video => "Video",
            Self::External => "External",
        }
    }
}

impl FromStr for SearchResultKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("result type", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub snippet: String,
    #[serde(rename = "type")]
    pub kind: SearchResultKind,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persona {
    EventOrganizer,
    VenueOps,
    Promoter,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Self::EventOrganizer, Self::VenueOps, Self::Promoter];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventOrganizer => "event-organizer",
            Self::VenueOps => "venue-ops",
            Self::Promoter => "promoter",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::EventOrganizer => "Event Organizers",
            Self::VenueOps => "Venue Operations",
            Self::Promoter => "Promoters / Agents",
        }
    }
}

/// Curated bundle of knowledge articles for one persona's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGroup {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub persona: Persona,
    pub article_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalUser {
    pub name: String,
    pub email: String,
    pub partner_id: String,
    pub role: String,
    pub company: String,
    pub market: String,
}

/// File metadata captured by the new-case form; contents are never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Validated output of the new-case workflow, ready for a case backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSubmission {
    pub category: RequestCategory,
    pub sub_category: String,
    pub event_id: Option<String>,
    pub venue_partner_id: String,
    pub market: String,
    pub urgency: Urgency,
    pub description: String,
    pub tried_solutions: Vec<String>,
    pub attachments: Vec<AttachmentMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badges_are_total_and_unknown_fails_closed() {
        for status in CaseStatus::ALL {
            assert_ne!(status.badge(), Badge::UNKNOWN);
        }
        for urgency in Urgency::ALL {
            assert_ne!(urgency.badge(), Badge::UNKNOWN);
        }
        assert_eq!(CaseStatus::Unknown.badge(), Badge::UNKNOWN);
        assert_eq!(Urgency::Unknown.badge(), Badge::UNKNOWN);
        assert!("unknown".parse::<CaseStatus>().is_err());
        assert!("escalated".parse::<Urgency>().is_err());
    }

    #[test]
    fn urgency_severity_orders_critical_first() {
        let weights = Urgency::ALL.map(Urgency::severity);
        assert_eq!(weights, [3, 2, 1, 0]);
        assert!(Urgency::Critical.is_escalated());
        assert!(Urgency::High.is_escalated());
        assert!(!Urgency::Normal.is_escalated());
    }

    #[test]
    fn lifecycle_allows_pending_round_trip_only_along_edges() {
        assert!(CaseStatus::InProgress.can_transition_to(CaseStatus::Pending));
        assert!(CaseStatus::Pending.can_transition_to(CaseStatus::InProgress));
        assert!(CaseStatus::Resolved.can_transition_to(CaseStatus::Closed));
        assert!(!CaseStatus::Closed.can_transition_to(CaseStatus::Open));
        assert!(!CaseStatus::Open.can_transition_to(CaseStatus::Closed));
        assert_eq!(CaseStatus::Open.next_statuses(), vec![CaseStatus::InProgress]);
    }

    #[test]
    fn parsing_is_case_insensitive_and_rejects_unknown_values() {
        assert_eq!("In-Progress".parse::<CaseStatus>(), Ok(CaseStatus::InProgress));
        assert_eq!(" event-day ".parse::<RequestCategory>(), Ok(RequestCategory::EventDay));
        let err = "fax".parse::<CaseSource>().unwrap_err();
        assert_eq!(err.to_string(), "unrecognized source `fax`");
    }

    #[test]
    fn escalated_urgency_overrides_category_queue() {
        assert_eq!(
            RequestCategory::SettlementPayments.route_queue(Urgency::Normal),
            "Settlement & Finance"
        );
        assert_eq!(
            RequestCategory::SettlementPayments.route_queue(Urgency::Critical),
            ESCALATION_QUEUE
        );
    }

    #[test]
    fn sub_category_labels_fall_back_to_raw_value() {
        assert_eq!(
            RequestCategory::EventDay.sub_category_label("scanner-sync"),
            Some("Scanner not syncing")
        );
        assert_eq!(RequestCategory::EventDay.sub_category_label("payment-delay"), None);
    }

    #[test]
    fn case_deserializes_from_camel_case_fixture() {
        let json = r#"{
            "id": "case-9",
            "caseNumber": "TM-2024-00009",
            "category": "event-day",
            "subCategory": "mystery",
            "venuePartnerId": "VEN-001",
            "market": "us",
            "urgency": "high",
            "description": "Scanners at gate B reject valid tickets",
            "status": "resolved",
            "assignedQueue": "Event-Day Support",
            "createdAt": "2024-01-10T10:00:00Z",
            "updatedAt": "2024-01-10T12:00:00Z",
            "slaDeadline": "2024-01-11T10:00:00Z",
            "contactName": "jamie smith",
            "contactEmail": "jamie@example.com",
            "partnerId": "PTR-1",
            "role": "Venue Manager",
            "company": "Arena Co"
        }"#;
        let case: Case = serde_json::from_str(json).expect("fixture parses");
        assert_eq!(case.source, None);
        assert_eq!(case.source_label(), "Portal");
        assert_eq!(case.sub_category_label(), "mystery");
        assert_eq!(case.active_sla_deadline(), None);
        assert_eq!(case.contact_initials(), "JS");
    }

    #[test]
    fn unrecognized_status_and_urgency_deserialize_as_unknown() {
        let status: CaseStatus = serde_json::from_str(r#""escalated""#).unwrap();
        let urgency: Urgency = serde_json::from_str(r#""sev-1""#).unwrap();
        assert_eq!(status, CaseStatus::Unknown);
        assert_eq!(status.label(), "Unknown");
        assert!(!status.is_terminal());
        assert!(status.next_statuses().is_empty());
        assert_eq!(urgency, Urgency::Unknown);
        assert_eq!(urgency.severity(), 0);
        assert!(!urgency.is_escalated());
    }
}
