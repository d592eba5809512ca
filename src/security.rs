//! Row-level security: pure injection of scope predicates.
//!
//! The auth collaborator supplies an [`AccessScope`] per request;
//! [`apply`] appends at most one security filter to the query. The
//! builder renders security filters after everything else in the WHERE
//! tree, so user filters can never mask them.

use serde::{Deserialize, Serialize};

use crate::query::{FilterValue, StructuredQuery, ValueFilter};

/// Geographic access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    National,
    Region,
    State,
    Territory,
}

impl AccessLevel {
    /// The dimension restricted at this level. National restricts nothing.
    fn column(&self) -> Option<&'static str> {
        match self {
            AccessLevel::National => None,
            AccessLevel::Region => Some("zone_name"),
            AccessLevel::State => Some("state_name"),
            AccessLevel::Territory => Some("territory_code"),
        }
    }
}

/// Sales-hierarchy tier. Takes precedence over geography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    So,
    Asm,
    Zsm,
    Nsm,
}

impl HierarchyLevel {
    fn column(&self) -> &'static str {
        match self {
            HierarchyLevel::So => "so_code",
            HierarchyLevel::Asm => "asm_code",
            HierarchyLevel::Zsm => "zsm_code",
            HierarchyLevel::Nsm => "nsm_code",
        }
    }
}

/// A caller's access scope. Hierarchy codes take precedence over
/// geography codes; only the highest-precedence non-empty tier
/// contributes a filter, even if the caller populated several.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccessScope {
    #[serde(default)]
    pub level: AccessLevel,
    /// Sales-hierarchy tier, if the caller is scoped by one.
    #[serde(default)]
    pub hierarchy: Option<(HierarchyLevel, Vec<String>)>,
    /// Permitted codes/values at the geographic level.
    #[serde(default)]
    pub codes: Vec<String>,
}

impl AccessScope {
    pub fn national() -> Self {
        Self::default()
    }

    pub fn geographic(level: AccessLevel, codes: Vec<&str>) -> Self {
        Self {
            level,
            hierarchy: None,
            codes: codes.into_iter().map(String::from).collect(),
        }
    }

    pub fn hierarchy(level: HierarchyLevel, codes: Vec<&str>) -> Self {
        Self {
            level: AccessLevel::National,
            hierarchy: Some((level, codes.into_iter().map(String::from).collect())),
            codes: vec![],
        }
    }

    /// The restricting (column, codes) pair, if any. Empty code lists
    /// fall through to the next precedence tier.
    fn restriction(&self) -> Option<(&'static str, &[String])> {
        if let Some((tier, codes)) = &self.hierarchy {
            if !codes.is_empty() {
                return Some((tier.column(), codes));
            }
        }
        match self.level.column() {
            Some(column) if !self.codes.is_empty() => Some((column, &self.codes)),
            _ => None,
        }
    }
}

/// Apply row-level security to a query. Pure and total: a national or
/// fully-empty scope returns the query unchanged; otherwise exactly one
/// security-origin filter is appended after all user filters.
pub fn apply(query: &StructuredQuery, scope: &AccessScope) -> StructuredQuery {
    let Some((column, codes)) = scope.restriction() else {
        return query.clone();
    };

    let values = codes
        .iter()
        .map(|c| FilterValue::Str(c.clone()))
        .collect();
    query.clone().with_filter(ValueFilter::security(column, values))
}
