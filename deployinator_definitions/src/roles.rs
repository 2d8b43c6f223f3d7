use std::{fmt, str::FromStr};

use super::{Error, Result};

/// A capability checked by API handlers
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Trait {
    /// Bypasses every other check
    #[serde(rename = "superuser")]
    SuperUser,
    View,
    ViewLogs,
    ViewSecrets,
    EditSecrets,
    EditConfig,
    Deploy,
    Exec,
    Delete,
    CreateServices,
    CreateDatabases,
    ManageGrants,
    ManageMembers,
}

/// A named bundle of traits, granted on a scope
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(rename = "superuser")]
    SuperUser,
    Auditor,
    ServiceOwner,
    ServiceDeployer,
    ServiceViewer,
    ProjectOwner,
    ProjectContributor,
    ProjectViewer,
    DatabaseOwner,
    DatabaseViewer,
    NamespaceAdmin,
    NamespaceViewer,
    TeamAdmin,
    TeamMember,
}

impl Role {
    pub const ALL: [Role; 14] = [
        Role::SuperUser,
        Role::Auditor,
        Role::ServiceOwner,
        Role::ServiceDeployer,
        Role::ServiceViewer,
        Role::ProjectOwner,
        Role::ProjectContributor,
        Role::ProjectViewer,
        Role::DatabaseOwner,
        Role::DatabaseViewer,
        Role::NamespaceAdmin,
        Role::NamespaceViewer,
        Role::TeamAdmin,
        Role::TeamMember,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperUser => "superuser",
            Role::Auditor => "auditor",
            Role::ServiceOwner => "service_owner",
            Role::ServiceDeployer => "service_deployer",
            Role::ServiceViewer => "service_viewer",
            Role::ProjectOwner => "project_owner",
            Role::ProjectContributor => "project_contributor",
            Role::ProjectViewer => "project_viewer",
            Role::DatabaseOwner => "database_owner",
            Role::DatabaseViewer => "database_viewer",
            Role::NamespaceAdmin => "namespace_admin",
            Role::NamespaceViewer => "namespace_viewer",
            Role::TeamAdmin => "team_admin",
            Role::TeamMember => "team_member",
        }
    }

    /// The fixed set of traits this role grants
    pub fn traits(self) -> &'static [Trait] {
        use self::Trait::*;
        match self {
            Role::SuperUser => &[SuperUser],
            Role::Auditor => &[View, ViewLogs],
            Role::ServiceOwner => &[
                View,
                ViewLogs,
                ViewSecrets,
                EditSecrets,
                EditConfig,
                Deploy,
                Exec,
                Delete,
                ManageGrants,
            ],
            Role::ServiceDeployer => &[View, ViewLogs, EditConfig, Deploy],
            Role::ServiceViewer => &[View, ViewLogs],
            Role::ProjectOwner => &[
                View,
                ViewLogs,
                ViewSecrets,
                EditSecrets,
                EditConfig,
                Deploy,
                Delete,
                CreateServices,
                CreateDatabases,
                ManageGrants,
            ],
            Role::ProjectContributor => &[View, ViewLogs, EditConfig, Deploy, CreateServices],
            Role::ProjectViewer => &[View],
            Role::DatabaseOwner => &[View, ViewSecrets, EditConfig, Delete, ManageGrants],
            Role::DatabaseViewer => &[View],
            Role::NamespaceAdmin => &[View, ViewLogs, ViewSecrets, Exec, Delete],
            Role::NamespaceViewer => &[View, ViewLogs],
            Role::TeamAdmin => &[View, ManageMembers, ManageGrants],
            Role::TeamMember => &[View],
        }
    }

    pub fn has_trait(self, t: Trait) -> bool {
        self.traits().contains(&t)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match Role::ALL.iter().find(|r| r.as_str() == s) {
            Some(r) => Ok(*r),
            None => bail!("unknown role '{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, Trait};

    #[test]
    fn names_round_trip() {
        for r in &Role::ALL {
            assert_eq!(r.to_string().parse::<Role>().unwrap(), *r);
            // serde and Display agree
            let yaml = serde_yaml::to_string(r).unwrap();
            assert_eq!(yaml.trim(), r.as_str());
        }
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn only_superuser_carries_superuser() {
        for r in &Role::ALL {
            assert_eq!(r.has_trait(Trait::SuperUser), *r == Role::SuperUser);
        }
    }

    #[test]
    fn viewers_cannot_deploy() {
        assert!(!Role::ServiceViewer.has_trait(Trait::Deploy));
        assert!(Role::ServiceDeployer.has_trait(Trait::Deploy));
        assert!(!Role::ServiceDeployer.has_trait(Trait::EditSecrets));
    }
}
