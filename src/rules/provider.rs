use serde::{Deserialize, Serialize};

/// Cloud provider a rule or resource type belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    Oci,
    /// Any provider the tool has no special handling for.
    Generic(String),
}

impl CloudProvider {
    /// Parse a platform/provider string. Case-insensitive.
    pub fn from_platform(platform: &str) -> Self {
        match platform.trim().to_lowercase().as_str() {
            "aws" => Self::Aws,
            "azure" => Self::Azure,
            "gcp" => Self::Gcp,
            "oci" => Self::Oci,
            _ => Self::Generic(platform.trim().to_string()),
        }
    }

    /// Lowercase name the query endpoints expect.
    pub fn api_name(&self) -> String {
        match self {
            Self::Aws => "aws".into(),
            Self::Azure => "azure".into(),
            Self::Gcp => "gcp".into(),
            Self::Oci => "oci".into(),
            Self::Generic(name) => name.to_lowercase(),
        }
    }

    /// Case-sensitive platform name used in rule bodies.
    pub fn platform_name(&self) -> String {
        match self {
            Self::Aws => "AWS".into(),
            Self::Azure => "Azure".into(),
            Self::Gcp => "GCP".into(),
            Self::Oci => "OCI".into(),
            Self::Generic(name) => name.clone(),
        }
    }

    pub fn known() -> [CloudProvider; 4] {
        [Self::Aws, Self::Azure, Self::Gcp, Self::Oci]
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.platform_name())
    }
}

impl std::str::FromStr for CloudProvider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_platform(s))
    }
}

impl From<String> for CloudProvider {
    fn from(s: String) -> Self {
        Self::from_platform(&s)
    }
}

impl From<CloudProvider> for String {
    fn from(p: CloudProvider) -> Self {
        p.api_name()
    }
}
