//! Attributes: the third element of a fact triple.
//!
//! One variant per fact type the remote service tracks. Conditions are the
//! only attributes with a separate identity (their metric) and a
//! remote-assigned id that never takes part in comparisons.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Permission strings accepted by the remote service.
///
/// `admin` and `scan` are valid both organization-wide and per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Admin,
    ProfileAdmin,
    GateAdmin,
    Scan,
    Provisioning,
    CodeViewer,
    IssueAdmin,
    SecurityHotspotAdmin,
    User,
}

impl Permission {
    /// All permissions, global ones first.
    pub const ALL: [Self; 9] = [
        Self::Admin,
        Self::ProfileAdmin,
        Self::GateAdmin,
        Self::Scan,
        Self::Provisioning,
        Self::CodeViewer,
        Self::IssueAdmin,
        Self::SecurityHotspotAdmin,
        Self::User,
    ];

    /// Wire name of the permission.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::ProfileAdmin => "profileadmin",
            Self::GateAdmin => "gateadmin",
            Self::Scan => "scan",
            Self::Provisioning => "provisioning",
            Self::CodeViewer => "codeviewer",
            Self::IssueAdmin => "issueadmin",
            Self::SecurityHotspotAdmin => "securityhotspotadmin",
            Self::User => "user",
        }
    }

    /// Whether the permission can be granted organization-wide.
    #[must_use]
    pub const fn is_global(self) -> bool {
        matches!(
            self,
            Self::Admin | Self::ProfileAdmin | Self::GateAdmin | Self::Scan | Self::Provisioning
        )
    }

    /// Whether the permission can be granted on a single project.
    #[must_use]
    pub const fn is_project(self) -> bool {
        matches!(
            self,
            Self::Admin
                | Self::Scan
                | Self::CodeViewer
                | Self::IssueAdmin
                | Self::SecurityHotspotAdmin
                | Self::User
        )
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::unsupported_permission(s))
    }
}

/// Comparison operator of a quality gate condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionOp {
    Lt,
    Gt,
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lt => write!(f, "LT"),
            Self::Gt => write!(f, "GT"),
        }
    }
}

impl FromStr for ConditionOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LT" => Ok(Self::Lt),
            "GT" => Ok(Self::Gt),
            other => Err(Error::unsupported_operator(other)),
        }
    }
}

/// A quality gate condition.
///
/// Equality and hashing cover `metric`, `op` and `threshold`; the
/// remote-assigned `id` is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub op: ConditionOp,
    #[serde(alias = "error")]
    pub threshold: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Condition {
    /// Create a condition without a remote id.
    pub fn new(metric: impl Into<String>, op: ConditionOp, threshold: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            op,
            threshold: threshold.into(),
            id: None,
        }
    }

    /// Attach the remote-assigned id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.metric == other.metric && self.op == other.op && self.threshold == other.threshold
    }
}

impl Eq for Condition {}

impl Hash for Condition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.metric.hash(state);
        self.op.hash(state);
        self.threshold.hash(state);
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.op, self.threshold)
    }
}

impl FromStr for Condition {
    type Err = Error;

    /// Parse `"<metric> <LT|GT> <threshold>"`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(metric), Some(op), Some(threshold), None) => {
                Ok(Self::new(metric, op.parse()?, threshold))
            }
            _ => Err(Error::invalid_fact(format!(
                "condition '{s}' must look like '<metric> <LT|GT> <threshold>'"
            ))),
        }
    }
}

/// The attribute of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// A permission held by a group or user.
    Permission(Permission),
    /// A condition enforced by a quality gate.
    Condition(Condition),
    /// A project selected by a quality gate.
    Project(String),
    /// A user login belonging to a group.
    Member(String),
}

/// Identity of an attribute: what the diff matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKey {
    Permission(Permission),
    Condition(String),
    Project(String),
    Member(String),
}

impl Attribute {
    /// Identity of the attribute. Conditions are identified by metric.
    #[must_use]
    pub fn key(&self) -> AttributeKey {
        match self {
            Self::Permission(p) => AttributeKey::Permission(*p),
            Self::Condition(c) => AttributeKey::Condition(c.metric.clone()),
            Self::Project(key) => AttributeKey::Project(key.clone()),
            Self::Member(login) => AttributeKey::Member(login.clone()),
        }
    }

    /// Remote-assigned id, only ever present on conditions.
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Condition(c) => c.id.as_deref(),
            _ => None,
        }
    }

    /// Short name of the variant, used in logs and validation messages.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Permission(_) => "permission",
            Self::Condition(_) => "condition",
            Self::Project(_) => "project",
            Self::Member(_) => "member",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission(p) => write!(f, "{p}"),
            Self::Condition(c) => write!(f, "{c}"),
            Self::Project(key) => write!(f, "{key}"),
            Self::Member(login) => write!(f, "{login}"),
        }
    }
}

impl From<Permission> for Attribute {
    fn from(permission: Permission) -> Self {
        Self::Permission(permission)
    }
}

impl From<Condition> for Attribute {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_permission_round_trips_through_wire_name() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>(), Ok(permission));
        }
    }

    #[test]
    fn test_unknown_permission_is_rejected() {
        let err = "superuser".parse::<Permission>();
        assert_eq!(err, Err(Error::unsupported_permission("superuser")));
    }

    #[test]
    fn test_admin_and_scan_are_global_and_project() {
        assert!(Permission::Admin.is_global() && Permission::Admin.is_project());
        assert!(Permission::Scan.is_global() && Permission::Scan.is_project());
        assert!(!Permission::CodeViewer.is_global());
        assert!(!Permission::GateAdmin.is_project());
    }

    #[test]
    fn test_condition_equality_ignores_remote_id() {
        let plain = Condition::new("coverage", ConditionOp::Lt, "80");
        let stored = plain.clone().with_id("42");
        assert_eq!(plain, stored);
        assert_ne!(plain, Condition::new("coverage", ConditionOp::Lt, "70"));
    }

    #[test]
    fn test_condition_parse() {
        let condition: Condition = "new_coverage GT 5".parse().unwrap();
        assert_eq!(condition.metric, "new_coverage");
        assert_eq!(condition.op, ConditionOp::Gt);
        assert_eq!(condition.threshold, "5");
        assert!("coverage EQ 1".parse::<Condition>().is_err());
        assert!("coverage LT".parse::<Condition>().is_err());
    }

    #[test]
    fn test_condition_key_is_metric() {
        let a = Attribute::from(Condition::new("coverage", ConditionOp::Lt, "80"));
        let b = Attribute::from(Condition::new("coverage", ConditionOp::Gt, "10"));
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_condition_deserializes_legacy_error_field() {
        let json = r#"{"metric":"coverage","op":"LT","error":"80","id":"7"}"#;
        let condition: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(condition.threshold, "80");
        assert_eq!(condition.id.as_deref(), Some("7"));
    }
}
