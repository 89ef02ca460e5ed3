//! Case list filter/sort engine plus knowledge and federated search helpers.

pub mod knowledge;

use std::str::FromStr;

use portal_core::{
    ArticleKind, Case, CaseSource, CaseStatus, RequestCategory, SearchResultKind, Urgency,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use knowledge::{
    federated_search, filter_articles, search_task_articles, ArticleFilter, ArticleFilterParams,
    SearchCounts, SearchHits, SearchOutcome,
};

pub const CRATE_NAME: &str = "portal-query";

/// Parameter value that disables a predicate.
pub const ALL: &str = "all";

/// Enum values that can appear as a filter parameter.
pub trait FilterValue: FromStr + PartialEq {
    fn as_param(&self) -> &'static str;
}

macro_rules! filter_value {
    ($($ty:ty),* $(,)?) => {
        $(impl FilterValue for $ty {
            fn as_param(&self) -> &'static str {
                self.as_str()
            }
        })*
    };
}

filter_value!(CaseStatus, Urgency, RequestCategory, CaseSource, ArticleKind, SearchResultKind);

/// One filter predicate. Values that do not parse are kept so the form can echo
/// them back, but they never match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selection<T> {
    All,
    Only(T),
    Unrecognized(String),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self::All
    }
}

impl<T: FilterValue> Selection<T> {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::All,
            Some(value) if value.eq_ignore_ascii_case(ALL) => Self::All,
            Some(value) => value
                .parse()
                .map(Self::Only)
                .unwrap_or_else(|_| Self::Unrecognized(value.to_string())),
        }
    }

    pub fn matches(&self, value: Option<&T>) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => value == Some(wanted),
            Self::Unrecognized(_) => false,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn as_param(&self) -> &str {
        match self {
            Self::All => ALL,
            Self::Only(value) => value.as_param(),
            Self::Unrecognized(raw) => raw,
        }
    }
}

/// Active/resolved partition of the case list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseTab {
    #[default]
    All,
    Active,
    Resolved,
}

impl CaseTab {
    pub const ALL: [CaseTab; 3] = [Self::All, Self::Active, Self::Resolved];

    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("active") => Self::Active,
            Some("resolved") => Self::Resolved,
            _ => Self::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => ALL,
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Active => "Active",
            Self::Resolved => "Resolved",
        }
    }

    pub fn admits(self, status: CaseStatus) -> bool {
        match self {
            Self::All => true,
            Self::Active => !status.is_terminal(),
            Self::Resolved => status.is_terminal(),
        }
    }
}

/// Raw query-string form of [`CaseFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CaseFilterParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tab: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CaseFilter {
    pub query: String,
    pub status: Selection<CaseStatus>,
    pub urgency: Selection<Urgency>,
    pub category: Selection<RequestCategory>,
    pub source: Selection<CaseSource>,
    pub tab: CaseTab,
}

impl CaseFilter {
    pub fn from_params(params: &CaseFilterParams) -> Self {
        Self {
            query: params.q.as_deref().unwrap_or_default().trim().to_string(),
            status: Selection::parse(params.status.as_deref()),
            urgency: Selection::parse(params.urgency.as_deref()),
            category: Selection::parse(params.category.as_deref()),
            source: Selection::parse(params.source.as_deref()),
            tab: CaseTab::parse(params.tab.as_deref()),
        }
    }

    pub fn to_params(&self) -> CaseFilterParams {
        let keep = |value: &str| (value != ALL).then(|| value.to_string());
        CaseFilterParams {
            q: (!self.query.is_empty()).then(|| self.query.clone()),
            status: keep(self.status.as_param()),
            urgency: keep(self.urgency.as_param()),
            category: keep(self.category.as_param()),
            source: keep(self.source.as_param()),
            tab: keep(self.tab.as_str()),
        }
    }

    /// Whether anything narrows the list, which is when "Clear filters" is offered.
    pub fn has_active_filters(&self) -> bool {
        !self.query.is_empty()
            || !self.status.is_all()
            || !self.urgency.is_all()
            || !self.category.is_all()
            || !self.source.is_all()
            || self.tab != CaseTab::All
    }

    pub fn matches(&self, case: &Case) -> bool {
        self.matches_query(case)
            && self.status.matches(Some(&case.status))
            && self.urgency.matches(Some(&case.urgency))
            && self.category.matches(Some(&case.category))
            && self.source.matches(case.source.as_ref())
            && self.tab.admits(case.status)
    }

    fn matches_query(&self, case: &Case) -> bool {
        if self.query.is_empty() {
            return true;
        }
        let needle = self.query.to_lowercase();
        [&case.case_number, &case.description, &case.company]
            .into_iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// Indices of matching cases, most recently updated first. Ties keep input order.
pub fn filter_case_indices(cases: &[Case], filter: &CaseFilter) -> Vec<usize> {
    let mut indices: Vec<usize> = cases
        .iter()
        .enumerate()
        .filter(|(_, case)| filter.matches(case))
        .map(|(i, _)| i)
        .collect();
    indices.sort_by(|a, b| cases[*b].updated_at.cmp(&cases[*a].updated_at));
    indices
}

pub fn filter_cases<'a>(cases: &'a [Case], filter: &CaseFilter) -> Vec<&'a Case> {
    filter_case_indices(cases, filter)
        .into_iter()
        .map(|i| &cases[i])
        .collect()
}

/// Caches the last filter result until either the criteria or the store revision change.
#[derive(Debug, Default)]
pub struct FilterMemo {
    key: Option<(CaseFilter, u64)>,
    indices: Vec<usize>,
    computed: u64,
}

impl FilterMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<'a>(
        &mut self,
        filter: &CaseFilter,
        revision: u64,
        cases: &'a [Case],
    ) -> Vec<&'a Case> {
        let fresh = matches!(&self.key, Some((f, r)) if f == filter && *r == revision);
        if !fresh {
            self.indices = filter_case_indices(cases, filter);
            self.key = Some((filter.clone(), revision));
            self.computed += 1;
            debug!(revision, matched = self.indices.len(), "recomputed case filter");
        }
        self.indices.iter().filter_map(|i| cases.get(*i)).collect()
    }

    /// Number of times the filter actually ran.
    pub fn computations(&self) -> u64 {
        self.computed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTab {
    pub value: &'static str,
    pub label: &'static str,
    pub css_class: &'static str,
    pub count: usize,
}

/// Totals over the unfiltered list so the status tabs never shrink with the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub all: usize,
    pub active: usize,
    pub resolved: usize,
    by_status: [usize; 5],
}

impl StatusCounts {
    pub fn tally(cases: &[Case]) -> Self {
        let mut counts = Self {
            all: cases.len(),
            ..Self::default()
        };
        for case in cases {
            if let Some(slot) = CaseStatus::ALL.iter().position(|s| *s == case.status) {
                counts.by_status[slot] += 1;
            }
            if case.is_active() {
                counts.active += 1;
            } else {
                counts.resolved += 1;
            }
        }
        counts
    }

    pub fn count(&self, status: CaseStatus) -> usize {
        CaseStatus::ALL
            .iter()
            .position(|s| *s == status)
            .map(|slot| self.by_status[slot])
            .unwrap_or(0)
    }

    pub fn tabs(&self) -> Vec<StatusTab> {
        let mut tabs = vec![StatusTab {
            value: ALL,
            label: "All",
            css_class: "status-all",
            count: self.all,
        }];
        tabs.extend(CaseStatus::ALL.into_iter().map(|status| StatusTab {
            value: status.as_str(),
            label: status.label(),
            css_class: status.badge().css_class,
            count: self.count(status),
        }));
        tabs
    }

    pub fn tab_count(&self, tab: CaseTab) -> usize {
        match tab {
            CaseTab::All => self.all,
            CaseTab::Active => self.active,
            CaseTab::Resolved => self.resolved,
        }
    }
}

pub const RECENT_CASES: usize = 3;

/// Home dashboard counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats<'a> {
    pub open: usize,
    pub critical: Vec<&'a Case>,
    pub recent: Vec<&'a Case>,
}

impl<'a> DashboardStats<'a> {
    pub fn compute(cases: &'a [Case]) -> Self {
        let open = cases
            .iter()
            .filter(|c| {
                matches!(
                    c.status,
                    CaseStatus::Open | CaseStatus::InProgress | CaseStatus::Pending
                )
            })
            .count();
        let critical = cases
            .iter()
            .filter(|c| c.urgency == Urgency::Critical && c.is_active())
            .collect();
        let mut recent: Vec<&Case> = cases.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_CASES);
        Self {
            open,
            critical,
            recent,
        }
    }
}
