//! The observable identity of an assembly.
//!
//! This is what a host's loader sees when it inspects a module: the assembly name and version
//! plus the descriptive attributes. The shimmer rewrites all of them to impersonate another
//! module, the patcher renames the assembly so both can share one load context.

use std::fmt;

/// Fully qualified name of `AssemblyCompanyAttribute`.
pub const COMPANY_ATTRIBUTE: &str = "System.Reflection.AssemblyCompanyAttribute";
/// Fully qualified name of `AssemblyProductAttribute`.
pub const PRODUCT_ATTRIBUTE: &str = "System.Reflection.AssemblyProductAttribute";
/// Fully qualified name of `AssemblyTitleAttribute`.
pub const TITLE_ATTRIBUTE: &str = "System.Reflection.AssemblyTitleAttribute";

/// Four part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// An assembly-level custom attribute: its type and, if the constructor takes one, its leading
/// string argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSummary {
    /// Fully qualified attribute type name
    pub type_name: String,
    /// Leading string argument
    pub value: Option<String>,
}

/// Name, version and descriptive attributes of an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
    /// Simple assembly name
    pub name: String,
    /// Assembly version
    pub version: AssemblyVersion,
    /// All assembly-level attributes in table order
    pub attributes: Vec<AttributeSummary>,
}

impl ModuleIdentity {
    /// Identity whose name and descriptive attributes all equal `name`.
    #[must_use]
    pub fn named(name: &str) -> ModuleIdentity {
        ModuleIdentity {
            name: name.to_string(),
            version: AssemblyVersion::default(),
            attributes: [COMPANY_ATTRIBUTE, PRODUCT_ATTRIBUTE, TITLE_ATTRIBUTE]
                .iter()
                .map(|type_name| AttributeSummary {
                    type_name: (*type_name).to_string(),
                    value: Some(name.to_string()),
                })
                .collect(),
        }
    }

    /// Leading string argument of the first attribute of type `type_name`.
    #[must_use]
    pub fn attribute(&self, type_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.type_name == type_name)
            .and_then(|attribute| attribute.value.as_deref())
    }

    /// `AssemblyCompanyAttribute` value.
    #[must_use]
    pub fn company(&self) -> Option<&str> {
        self.attribute(COMPANY_ATTRIBUTE)
    }

    /// `AssemblyProductAttribute` value.
    #[must_use]
    pub fn product(&self) -> Option<&str> {
        self.attribute(PRODUCT_ATTRIBUTE)
    }

    /// `AssemblyTitleAttribute` value.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.attribute(TITLE_ATTRIBUTE)
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Version={}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_identity() {
        let identity = ModuleIdentity::named("Game");
        assert_eq!(identity.company(), Some("Game"));
        assert_eq!(identity.product(), Some("Game"));
        assert_eq!(identity.title(), Some("Game"));
        assert_eq!(identity.attribute("System.ObsoleteAttribute"), None);
        assert_eq!(identity.to_string(), "Game, Version=0.0.0.0");
    }
}
