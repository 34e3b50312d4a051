use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourceGroups";
const PROVIDERS: &str = "providers";

/// A structured Azure Resource Manager identifier, e.g.
/// `/subscriptions/{s}/resourceGroups/{rg}/providers/Microsoft.EventHub/namespaces/{ns}/eventhubs/{hub}`.
///
/// Extension resources such as Event Grid subscriptions nest a second
/// `providers` segment below the resource they are attached to; each
/// `providers` segment yields one entry of [`providers`](Self::providers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AzureResourceId {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub providers: Vec<ProviderResource>,
}

/// The part of a resource ID that follows a `providers` segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderResource {
    /// Resource provider namespace, e.g. `Microsoft.EventGrid`.
    pub namespace: String,
    pub resource_type: String,
    pub name: String,
    pub child: Option<ChildResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildResource {
    pub resource_type: String,
    pub name: String,
}

impl AzureResourceId {
    /// The resource the ID ultimately designates, if it is not a bare
    /// subscription or resource group.
    pub fn leaf(&self) -> Option<&ProviderResource> {
        self.providers.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseResourceIdError {
    #[error("resource ID is empty")]
    Empty,
    #[error("resource ID must start with \"/subscriptions/\": {0:?}")]
    MissingSubscription(String),
    #[error("unexpected segment {segment:?} at position {position} in resource ID")]
    UnexpectedSegment { position: usize, segment: String },
    #[error("resource ID ends prematurely: {0:?}")]
    Incomplete(String),
}

impl FromStr for AzureResourceId {
    type Err = ParseResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(ParseResourceIdError::Empty);
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(ParseResourceIdError::Incomplete(s.to_owned()));
        }

        let mut rest = segments.as_slice();

        let subscription_id = match rest {
            [kw, id, tail @ ..] if kw.eq_ignore_ascii_case(SUBSCRIPTIONS) => {
                rest = tail;
                (*id).to_owned()
            }
            _ => return Err(ParseResourceIdError::MissingSubscription(s.to_owned())),
        };

        let mut resource_group = None;
        if let [kw, rg, tail @ ..] = rest {
            if kw.eq_ignore_ascii_case(RESOURCE_GROUPS) {
                resource_group = Some((*rg).to_owned());
                rest = tail;
            }
        }

        let mut providers = Vec::new();
        while !rest.is_empty() {
            let position = segments.len() - rest.len();
            let (provider, tail) = match rest {
                [kw, namespace, ty, name, tail @ ..] if kw.eq_ignore_ascii_case(PROVIDERS) => {
                    let provider = ProviderResource {
                        namespace: (*namespace).to_owned(),
                        resource_type: (*ty).to_owned(),
                        name: (*name).to_owned(),
                        child: None,
                    };
                    (provider, tail)
                }
                [kw, ..] if kw.eq_ignore_ascii_case(PROVIDERS) => {
                    return Err(ParseResourceIdError::Incomplete(s.to_owned()));
                }
                [seg, ..] => {
                    return Err(ParseResourceIdError::UnexpectedSegment {
                        position,
                        segment: (*seg).to_owned(),
                    })
                }
                [] => break,
            };

            let (provider, tail) = match tail {
                [kw, ..] if kw.eq_ignore_ascii_case(PROVIDERS) => (provider, tail),
                [ty, name, tail @ ..] => {
                    let child = ChildResource {
                        resource_type: (*ty).to_owned(),
                        name: (*name).to_owned(),
                    };
                    (
                        ProviderResource {
                            child: Some(child),
                            ..provider
                        },
                        tail,
                    )
                }
                [_] => return Err(ParseResourceIdError::Incomplete(s.to_owned())),
                [] => (provider, tail),
            };

            providers.push(provider);
            rest = tail;
        }

        Ok(Self {
            subscription_id,
            resource_group,
            providers,
        })
    }
}

impl fmt::Display for AzureResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{SUBSCRIPTIONS}/{}", self.subscription_id)?;
        if let Some(rg) = &self.resource_group {
            write!(f, "/{RESOURCE_GROUPS}/{rg}")?;
        }
        for provider in &self.providers {
            write!(
                f,
                "/{PROVIDERS}/{}/{}/{}",
                provider.namespace, provider.resource_type, provider.name
            )?;
            if let Some(child) = &provider.child {
                write!(f, "/{}/{}", child.resource_type, child.name)?;
            }
        }
        Ok(())
    }
}

impl Serialize for AzureResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AzureResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
