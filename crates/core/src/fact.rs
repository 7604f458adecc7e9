//! Facts, their scopes, and the store keys they belong to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, AttributeKey, Condition, Permission};
use crate::error::{Error, Result};

/// Where a fact applies: the whole organization or one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Organization,
    Project(String),
}

impl Scope {
    /// Build a scope from an optional project key; empty means organization.
    pub fn from_project_key(key: Option<impl Into<String>>) -> Self {
        match key.map(Into::into) {
            Some(key) if !key.is_empty() => Self::Project(key),
            _ => Self::Organization,
        }
    }

    /// The project key, empty for organization scope.
    #[must_use]
    pub fn project_key(&self) -> &str {
        match self {
            Self::Organization => "",
            Self::Project(key) => key,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization => write!(f, "organization"),
            Self::Project(key) => write!(f, "project:{key}"),
        }
    }
}

/// The kind of fact a store tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Permissions of a user group, keyed by group name.
    GroupPermission,
    /// Permissions of a user, keyed by login.
    UserPermission,
    /// Conditions of a quality gate, keyed by gate id.
    GateCondition,
    /// Projects selected by a quality gate, keyed by gate id.
    GateSelection,
    /// Members of a user group, keyed by group name.
    GroupMembership,
}

impl FactKind {
    /// Whether an attribute is of the variant this kind tracks.
    #[must_use]
    pub fn accepts(self, attribute: &Attribute) -> bool {
        matches!(
            (self, attribute),
            (Self::GroupPermission | Self::UserPermission, Attribute::Permission(_))
                | (Self::GateCondition, Attribute::Condition(_))
                | (Self::GateSelection, Attribute::Project(_))
                | (Self::GroupMembership, Attribute::Member(_))
        )
    }

    /// Parse the string form of an attribute of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown permissions, malformed conditions and
    /// empty project keys or logins.
    pub fn parse_attribute(self, value: &str) -> Result<Attribute> {
        let value = value.trim();
        match self {
            Self::GroupPermission | Self::UserPermission => {
                value.parse::<Permission>().map(Attribute::Permission)
            }
            Self::GateCondition => value.parse::<Condition>().map(Attribute::Condition),
            Self::GateSelection if !value.is_empty() => Ok(Attribute::Project(value.to_string())),
            Self::GroupMembership if !value.is_empty() => Ok(Attribute::Member(value.to_string())),
            Self::GateSelection | Self::GroupMembership => {
                Err(Error::invalid_fact(format!("{self} value must not be empty")))
            }
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GroupPermission => "group-permission",
            Self::UserPermission => "user-permission",
            Self::GateCondition => "gate-condition",
            Self::GateSelection => "gate-selection",
            Self::GroupMembership => "group-membership",
        };
        f.write_str(name)
    }
}

/// The key of one remote fact store: kind, scope and subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactScope {
    pub kind: FactKind,
    #[serde(default)]
    pub scope: Scope,
    pub subject: String,
}

impl FactScope {
    /// Create a new fact scope.
    pub fn new(kind: FactKind, scope: Scope, subject: impl Into<String>) -> Self {
        Self {
            kind,
            scope,
            subject: subject.into(),
        }
    }

    /// Permissions of `group`, organization-wide or on one project.
    pub fn group_permissions(scope: Scope, group: impl Into<String>) -> Self {
        Self::new(FactKind::GroupPermission, scope, group)
    }

    /// Permissions of the user `login`.
    pub fn user_permissions(scope: Scope, login: impl Into<String>) -> Self {
        Self::new(FactKind::UserPermission, scope, login)
    }

    /// Conditions of quality gate `gate_id`.
    pub fn gate_conditions(gate_id: impl Into<String>) -> Self {
        Self::new(FactKind::GateCondition, Scope::Organization, gate_id)
    }

    /// Projects selected by quality gate `gate_id`.
    pub fn gate_selection(gate_id: impl Into<String>) -> Self {
        Self::new(FactKind::GateSelection, Scope::Organization, gate_id)
    }

    /// Members of `group`.
    pub fn group_members(group: impl Into<String>) -> Self {
        Self::new(FactKind::GroupMembership, Scope::Organization, group)
    }

    /// Build a fact in this scope.
    pub fn fact(&self, attribute: impl Into<Attribute>) -> Fact {
        Fact::new(self.scope.clone(), self.subject.clone(), attribute)
    }

    /// Check that a fact belongs to this scope.
    ///
    /// # Errors
    ///
    /// Returns an error when scope, subject or attribute variant differ, or
    /// when a permission is not grantable at this scope.
    pub fn admit(&self, fact: &Fact) -> Result<()> {
        if fact.scope != self.scope {
            return Err(Error::invalid_fact(format!(
                "fact '{fact}' has scope {} but store is scoped to {}",
                fact.scope, self.scope
            )));
        }
        if fact.subject != self.subject {
            return Err(Error::invalid_fact(format!(
                "fact '{fact}' has subject '{}' but store subject is '{}'",
                fact.subject, self.subject
            )));
        }
        if !self.kind.accepts(&fact.attribute) {
            return Err(Error::invalid_fact(format!(
                "{} attribute '{}' does not belong in a {} store",
                fact.attribute.variant_name(),
                fact.attribute,
                self.kind
            )));
        }
        if let Attribute::Permission(permission) = fact.attribute {
            let grantable = match self.scope {
                Scope::Organization => permission.is_global(),
                Scope::Project(_) => permission.is_project(),
            };
            if !grantable {
                return Err(Error::invalid_fact(format!(
                    "permission '{permission}' cannot be granted at {} scope",
                    self.scope
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FactScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.kind, self.scope, self.subject)
    }
}

/// An atomic relationship triple tracked by the remote service.
///
/// Equality is content equality: it ignores the remote id of conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    #[serde(default)]
    pub scope: Scope,
    pub subject: String,
    pub attribute: Attribute,
}

/// Identity of a fact: what the diff matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactIdentity {
    pub scope: Scope,
    pub subject: String,
    pub key: AttributeKey,
}

impl Fact {
    /// Create a new fact.
    pub fn new(scope: Scope, subject: impl Into<String>, attribute: impl Into<Attribute>) -> Self {
        Self {
            scope,
            subject: subject.into(),
            attribute: attribute.into(),
        }
    }

    /// Identity of the fact. Two conditions on the same metric share it.
    #[must_use]
    pub fn identity(&self) -> FactIdentity {
        FactIdentity {
            scope: self.scope.clone(),
            subject: self.subject.clone(),
            key: self.attribute.key(),
        }
    }

    /// Copy the remote id of `observed` onto this fact, if it has one.
    #[must_use]
    pub fn with_remote_id_of(mut self, observed: &Self) -> Self {
        if let (Attribute::Condition(mine), Attribute::Condition(theirs)) =
            (&mut self.attribute, &observed.attribute)
        {
            mine.id.clone_from(&theirs.id);
        }
        self
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.subject, self.attribute)
    }
}
