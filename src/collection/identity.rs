//! Collection identity: knowledge-base type plus optional tenant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collection::CollectionError;
use crate::config::CollectionsConfig;

/// Marker joining a base name to a tenant id.
const TENANT_SEPARATOR: &str = "_ws";

/// The three independent knowledge bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBase {
    /// Historical emails, for tone and style
    Style,
    /// Enrollment documents, for factual grounding
    Facts,
    /// Known mistakes and their fixes
    Corrections,
}

impl KnowledgeBase {
    pub const ALL: [KnowledgeBase; 3] = [
        KnowledgeBase::Style,
        KnowledgeBase::Facts,
        KnowledgeBase::Corrections,
    ];

    pub fn label(self) -> &'static str {
        match self {
            KnowledgeBase::Style => "style",
            KnowledgeBase::Facts => "facts",
            KnowledgeBase::Corrections => "corrections",
        }
    }

    /// Configured base collection name for this knowledge base.
    pub fn base_name(self, collections: &CollectionsConfig) -> &str {
        match self {
            KnowledgeBase::Style => &collections.style,
            KnowledgeBase::Facts => &collections.facts,
            KnowledgeBase::Corrections => &collections.corrections,
        }
    }
}

impl fmt::Display for KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validated tenant (workspace) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Accepts ASCII letters, digits, `-` and `_`.
    pub fn new(id: impl Into<String>) -> Result<Self, CollectionError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CollectionError::InvalidIdentity {
                name: id,
                reason: "tenant id is empty",
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CollectionError::InvalidIdentity {
                name: id,
                reason: "tenant id may only contain [A-Za-z0-9_-]",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = CollectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantId::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of one persisted collection, e.g. `corrections_collection_ws42`.
///
/// Global collections use the bare base name; tenant collections append
/// `_ws<tenant>`. Base names may not contain `_ws`, so a global name can
/// never collide with a tenant one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionId {
    name: String,
}

impl CollectionId {
    pub fn new(base_name: &str, tenant: Option<&TenantId>) -> Result<Self, CollectionError> {
        validate_base_name(base_name)?;
        let name = match tenant {
            Some(tenant) => format!("{base_name}{TENANT_SEPARATOR}{tenant}"),
            None => base_name.to_string(),
        };
        Ok(Self { name })
    }

    /// Identity of `kb` for `tenant` under the configured base names.
    pub fn for_kb(
        kb: KnowledgeBase,
        collections: &CollectionsConfig,
        tenant: Option<&TenantId>,
    ) -> Result<Self, CollectionError> {
        Self::new(kb.base_name(collections), tenant)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn validate_base_name(base_name: &str) -> Result<(), CollectionError> {
    let invalid = |reason| {
        Err(CollectionError::InvalidIdentity {
            name: base_name.to_string(),
            reason,
        })
    };

    if base_name.is_empty() {
        return invalid("collection name is empty");
    }
    if !base_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return invalid("collection name may only contain [A-Za-z0-9_-]");
    }
    if base_name.contains(TENANT_SEPARATOR) {
        return invalid("collection name may not contain the tenant marker '_ws'");
    }
    Ok(())
}
