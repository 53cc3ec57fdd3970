//! Role Catalog
//!
//! The fixed 13-role catalog shared by every persona. Namespace derivation,
//! permission grants, and task-contextual embedding prompts all key off it.

use serde::{Deserialize, Serialize};

/// A persona's role within the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Ceo,
    Cto,
    EngineeringManager,
    SeniorEngineer,
    SoftwareEngineer,
    QaEngineer,
    DevopsEngineer,
    DataScientist,
    ProductManager,
    UxDesigner,
    MarketingManager,
    SalesLead,
    HrManager,
}

impl Role {
    /// Every role in the catalog, in declaration order.
    pub const ALL: [Role; 13] = [
        Role::Ceo,
        Role::Cto,
        Role::EngineeringManager,
        Role::SeniorEngineer,
        Role::SoftwareEngineer,
        Role::QaEngineer,
        Role::DevopsEngineer,
        Role::DataScientist,
        Role::ProductManager,
        Role::UxDesigner,
        Role::MarketingManager,
        Role::SalesLead,
        Role::HrManager,
    ];

    /// Short suffix used in namespace identifiers. Unique across the catalog.
    pub fn abbrev(&self) -> &'static str {
        match self {
            Role::Ceo => "ceo",
            Role::Cto => "cto",
            Role::EngineeringManager => "em",
            Role::SeniorEngineer => "seng",
            Role::SoftwareEngineer => "swe",
            Role::QaEngineer => "qa",
            Role::DevopsEngineer => "devops",
            Role::DataScientist => "ds",
            Role::ProductManager => "pm",
            Role::UxDesigner => "ux",
            Role::MarketingManager => "mkt",
            Role::SalesLead => "sales",
            Role::HrManager => "hr",
        }
    }

    /// Fixed sentence prepended to text before task-contextual embedding,
    /// biasing the vector toward the role's working vocabulary.
    pub fn context_sentence(&self) -> &'static str {
        match self {
            Role::Ceo => "As the chief executive setting company strategy and priorities:",
            Role::Cto => "As the chief technology officer owning architecture and technical direction:",
            Role::EngineeringManager => "As an engineering manager coordinating delivery and team health:",
            Role::SeniorEngineer => "As a senior engineer designing and reviewing core systems:",
            Role::SoftwareEngineer => "As a software engineer implementing features and fixing defects:",
            Role::QaEngineer => "As a quality engineer validating behavior and hunting regressions:",
            Role::DevopsEngineer => "As a devops engineer running infrastructure, deploys, and observability:",
            Role::DataScientist => "As a data scientist analyzing datasets and building models:",
            Role::ProductManager => "As a product manager prioritizing user needs and the roadmap:",
            Role::UxDesigner => "As a designer shaping user experience and interfaces:",
            Role::MarketingManager => "As a marketing manager running campaigns and positioning:",
            Role::SalesLead => "As a sales lead managing accounts and revenue pipeline:",
            Role::HrManager => "As an HR manager handling people operations and hiring:",
        }
    }

    /// Leadership roles get wider read/write grants in the permission matrix.
    pub fn is_leadership(&self) -> bool {
        matches!(
            self,
            Role::Ceo
                | Role::Cto
                | Role::EngineeringManager
                | Role::ProductManager
                | Role::MarketingManager
                | Role::SalesLead
                | Role::HrManager
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbrev())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn abbrevs_are_unique() {
        let abbrevs: HashSet<&str> = Role::ALL.iter().map(|r| r.abbrev()).collect();
        assert_eq!(abbrevs.len(), Role::ALL.len());
    }

    #[test]
    fn catalog_has_thirteen_roles() {
        assert_eq!(Role::ALL.len(), 13);
    }

    #[test]
    fn every_role_has_a_context_sentence() {
        for role in Role::ALL {
            assert!(!role.context_sentence().is_empty());
        }
    }
}
