use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, convert::TryFrom, fmt, iter::FromIterator, str::FromStr};

use super::{Error, ErrorKind, Result, Role, Trait};

/// The kinds of things roles can be granted on
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Global,
    Service,
    Project,
    Database,
    Namespace,
    Team,
}

impl ScopeType {
    /// Scope type of a raw scope string, if it is recognised
    pub fn of(scope: &str) -> Option<ScopeType> {
        scope.parse::<Scope>().ok().map(|s| s.scope_type())
    }

    /// Roles that can be granted on this type of scope
    pub fn roles(self) -> &'static [Role] {
        match self {
            ScopeType::Global => &[Role::SuperUser, Role::Auditor],
            ScopeType::Service => &[Role::ServiceOwner, Role::ServiceDeployer, Role::ServiceViewer],
            ScopeType::Project => &[Role::ProjectOwner, Role::ProjectContributor, Role::ProjectViewer],
            ScopeType::Database => &[Role::DatabaseOwner, Role::DatabaseViewer],
            ScopeType::Namespace => &[Role::NamespaceAdmin, Role::NamespaceViewer],
            ScopeType::Team => &[Role::TeamAdmin, Role::TeamMember],
        }
    }
}

/// Where a role applies
///
/// Serialized as `global` or `<type>:<name>`. Scopes match exactly, there is no hierarchy.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Global,
    Service(String),
    Project(String),
    Database(String),
    Namespace(String),
    Team(String),
}

impl Scope {
    pub fn scope_type(&self) -> ScopeType {
        match self {
            Scope::Global => ScopeType::Global,
            Scope::Service(_) => ScopeType::Service,
            Scope::Project(_) => ScopeType::Project,
            Scope::Database(_) => ScopeType::Database,
            Scope::Namespace(_) => ScopeType::Namespace,
            Scope::Team(_) => ScopeType::Team,
        }
    }

    pub fn service(name: &str) -> Scope {
        Scope::Service(name.into())
    }

    pub fn project(name: &str) -> Scope {
        Scope::Project(name.into())
    }

    pub fn database(name: &str) -> Scope {
        Scope::Database(name.into())
    }

    pub fn namespace(name: &str) -> Scope {
        Scope::Namespace(name.into())
    }

    pub fn team(name: &str) -> Scope {
        Scope::Team(name.into())
    }

    fn name_of(&self, want: ScopeType) -> Result<&str> {
        let name = match (self, want) {
            (Scope::Service(n), ScopeType::Service)
            | (Scope::Project(n), ScopeType::Project)
            | (Scope::Database(n), ScopeType::Database)
            | (Scope::Namespace(n), ScopeType::Namespace)
            | (Scope::Team(n), ScopeType::Team) => n.as_str(),
            _ => bail!("scope '{}' is not a {:?} scope", self, want),
        };
        Ok(name)
    }

    pub fn service_name(&self) -> Result<&str> {
        self.name_of(ScopeType::Service)
    }

    pub fn project_name(&self) -> Result<&str> {
        self.name_of(ScopeType::Project)
    }

    pub fn database_name(&self) -> Result<&str> {
        self.name_of(ScopeType::Database)
    }

    pub fn namespace_name(&self) -> Result<&str> {
        self.name_of(ScopeType::Namespace)
    }

    pub fn team_name(&self) -> Result<&str> {
        self.name_of(ScopeType::Team)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Service(n) => write!(f, "service:{}", n),
            Scope::Project(n) => write!(f, "project:{}", n),
            Scope::Database(n) => write!(f, "database:{}", n),
            Scope::Namespace(n) => write!(f, "namespace:{}", n),
            Scope::Team(n) => write!(f, "team:{}", n),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "global" {
            return Ok(Scope::Global);
        }
        let invalid = || Error::from(ErrorKind::InvalidScope(s.to_string()));
        let (kind, name) = s.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let name = name.to_string();
        match kind {
            "service" => Ok(Scope::Service(name)),
            "project" => Ok(Scope::Project(name)),
            "database" => Ok(Scope::Database(name)),
            "namespace" => Ok(Scope::Namespace(name)),
            "team" => Ok(Scope::Team(name)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Scope> for String {
    fn from(s: Scope) -> String {
        s.to_string()
    }
}

/// The kinds of principals roles are granted to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    User,
    Team,
}

impl TargetType {
    /// Target type of a raw target string, if it is recognised
    pub fn of(target: &str) -> Option<TargetType> {
        target.parse::<Target>().ok().map(|t| t.target_type())
    }
}

/// Who a role is granted to, serialized as `user:<name>` or `team:<name>`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    User(String),
    Team(String),
}

impl Target {
    pub fn target_type(&self) -> TargetType {
        match self {
            Target::User(_) => TargetType::User,
            Target::Team(_) => TargetType::Team,
        }
    }

    pub fn user_name(&self) -> Result<&str> {
        match self {
            Target::User(n) => Ok(n),
            _ => bail!("target '{}' is not a user", self),
        }
    }

    pub fn team_name(&self) -> Result<&str> {
        match self {
            Target::Team(n) => Ok(n),
            _ => bail!("target '{}' is not a team", self),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::User(n) => write!(f, "user:{}", n),
            Target::Team(n) => write!(f, "team:{}", n),
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::from(ErrorKind::InvalidTarget(s.to_string()));
        match s.split_once(':') {
            Some((_, "")) | None => Err(invalid()),
            Some(("user", n)) => Ok(Target::User(n.into())),
            Some(("team", n)) => Ok(Target::Team(n.into())),
            Some(_) => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Target> for String {
    fn from(t: Target) -> String {
        t.to_string()
    }
}

/// One role assignment as stored
///
/// Scope and target are kept as written so that stored rows with unknown types can be rejected by `validate`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub scope: String,
    pub target: String,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    pub role: Role,
}

impl Grant {
    pub fn new(scope: &Scope, target: &Target, role: Role, granted_by: &str) -> Self {
        Grant {
            scope: scope.to_string(),
            target: target.to_string(),
            granted_by: granted_by.into(),
            granted_at: Utc::now(),
            role,
        }
    }

    pub fn scope(&self) -> Result<Scope> {
        self.scope.parse()
    }

    pub fn target(&self) -> Result<Target> {
        self.target.parse()
    }

    pub fn validate(&self) -> Result<()> {
        let scope_type = match ScopeType::of(&self.scope) {
            Some(st) => st,
            None => bail!(ErrorKind::InvalidScope(self.scope.clone())),
        };
        if TargetType::of(&self.target).is_none() {
            bail!(ErrorKind::InvalidTarget(self.target.clone()));
        }
        if !scope_type.roles().contains(&self.role) {
            bail!("role {} cannot be granted on {} scopes", self.role, self.scope);
        }
        Ok(())
    }
}

/// Roles held by one principal, per scope
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Grants(pub BTreeMap<Scope, Vec<Role>>);

impl Grants {
    pub fn add(&mut self, scope: Scope, role: Role) {
        let roles = self.0.entry(scope).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    pub fn roles(&self, scope: &Scope) -> &[Role] {
        self.0.get(scope).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether the global scope carries the superuser trait
    pub fn is_superuser(&self) -> bool {
        self.roles(&Scope::Global).iter().any(|r| r.has_trait(Trait::SuperUser))
    }

    /// Whether any of `traits` is held on `scope`
    ///
    /// Global roles apply everywhere, and a global superuser holds every trait.
    pub fn has_any_trait(&self, scope: &Scope, traits: &[Trait]) -> bool {
        let carries = |r: &Role| traits.iter().any(|t| r.has_trait(*t));
        if self
            .roles(&Scope::Global)
            .iter()
            .any(|r| r.has_trait(Trait::SuperUser) || carries(r))
        {
            return true;
        }
        self.roles(scope).iter().any(carries)
    }

    pub fn has_trait(&self, scope: &Scope, t: Trait) -> bool {
        self.has_any_trait(scope, &[t])
    }

    /// Scopes of a given type on which `t` is held, excluding the global short-circuit
    pub fn scopes_with_trait(&self, scope_type: ScopeType, t: Trait) -> Vec<&Scope> {
        self.0
            .iter()
            .filter(|(s, roles)| s.scope_type() == scope_type && roles.iter().any(|r| r.has_trait(t)))
            .map(|(s, _)| s)
            .collect()
    }
}

/// Collect valid grants, skipping rows that do not validate
impl<'a> FromIterator<&'a Grant> for Grants {
    fn from_iter<I: IntoIterator<Item = &'a Grant>>(iter: I) -> Self {
        let mut grants = Grants::default();
        for g in iter {
            match g.validate().and_then(|_| g.scope()) {
                Ok(scope) => grants.add(scope, g.role),
                Err(e) => warn!("Ignoring grant of {} on {}: {}", g.role, g.scope, e),
            }
        }
        grants
    }
}

#[cfg(test)]
mod tests {
    use super::{Grant, Grants, Scope, ScopeType, Target, TargetType};
    use crate::{Role, Trait};

    const ALL_TRAITS: [Trait; 13] = [
        Trait::SuperUser,
        Trait::View,
        Trait::ViewLogs,
        Trait::ViewSecrets,
        Trait::EditSecrets,
        Trait::EditConfig,
        Trait::Deploy,
        Trait::Exec,
        Trait::Delete,
        Trait::CreateServices,
        Trait::CreateDatabases,
        Trait::ManageGrants,
        Trait::ManageMembers,
    ];

    #[test]
    fn superuser_short_circuits() {
        let mut g = Grants::default();
        g.add(Scope::Global, Role::SuperUser);
        assert!(g.is_superuser());
        for scope in &[Scope::Global, Scope::service("foo"), Scope::team("bar")] {
            for t in &ALL_TRAITS {
                assert!(g.has_trait(scope, *t));
            }
            assert!(g.has_any_trait(scope, &[]));
        }
    }

    #[test]
    fn exact_scope_match() {
        let mut g = Grants::default();
        g.add(Scope::service("foo"), Role::ServiceDeployer);
        assert!(!g.is_superuser());
        assert!(g.has_trait(&Scope::service("foo"), Trait::Deploy));
        assert!(!g.has_trait(&Scope::service("foobar"), Trait::Deploy));
        assert!(!g.has_trait(&Scope::project("foo"), Trait::Deploy));
        assert!(!g.has_trait(&Scope::service("foo"), Trait::EditSecrets));
        assert!(g.has_any_trait(&Scope::service("foo"), &[Trait::EditSecrets, Trait::Deploy]));
    }

    #[test]
    fn global_roles_apply_everywhere() {
        let mut g = Grants::default();
        g.add(Scope::Global, Role::Auditor);
        assert!(!g.is_superuser());
        assert!(g.has_trait(&Scope::database("orders"), Trait::View));
        assert!(!g.has_trait(&Scope::database("orders"), Trait::Delete));
    }

    #[test]
    fn validation() {
        let bad = Grant::new(&Scope::service("foo"), &Target::User("ann".into()), Role::TeamAdmin, "root");
        assert!(bad.validate().is_err());

        let good = Grant::new(&Scope::service("foo"), &Target::User("ann".into()), Role::ServiceOwner, "root");
        assert!(good.validate().is_ok());

        let unknown_scope = Grant {
            scope: "cluster:prod".into(),
            ..good.clone()
        };
        assert!(unknown_scope.validate().is_err());
        let unknown_target = Grant {
            target: "robot:r2d2".into(),
            ..good
        };
        assert!(unknown_target.validate().is_err());
    }

    #[test]
    fn scope_round_trips() {
        for name in &["foo", "foo-bar", "x"] {
            assert_eq!(Scope::service(name).service_name().unwrap(), *name);
            assert_eq!(Scope::project(name).project_name().unwrap(), *name);
            assert_eq!(Scope::database(name).database_name().unwrap(), *name);
            assert_eq!(Scope::namespace(name).namespace_name().unwrap(), *name);
            assert_eq!(Scope::team(name).team_name().unwrap(), *name);
            let s = Scope::service(name).to_string();
            assert_eq!(s.parse::<Scope>().unwrap(), Scope::service(name));

            let user = Target::User(name.to_string());
            assert_eq!(user.to_string().parse::<Target>().unwrap().user_name().unwrap(), *name);
            let team = Target::Team(name.to_string());
            assert_eq!(team.to_string().parse::<Target>().unwrap().team_name().unwrap(), *name);
        }
        assert!(Scope::service("foo").project_name().is_err());
        assert!("service:".parse::<Scope>().is_err());
        assert!("global".parse::<Scope>().unwrap() == Scope::Global);
        assert_eq!(ScopeType::of("team:a"), Some(ScopeType::Team));
        assert_eq!(TargetType::of("user:a"), Some(TargetType::User));
        assert_eq!(TargetType::of("user:"), None);
    }

    #[test]
    fn from_stored_rows() {
        let rows = vec![
            Grant::new(&Scope::project("shop"), &Target::Team("checkout".into()), Role::ProjectOwner, "root"),
            Grant::new(&Scope::project("shop"), &Target::Team("checkout".into()), Role::TeamAdmin, "root"),
        ];
        let grants: Grants = rows.iter().collect();
        assert_eq!(grants.roles(&Scope::project("shop")), &[Role::ProjectOwner]);
        assert_eq!(grants.scopes_with_trait(ScopeType::Project, Trait::CreateServices).len(), 1);
    }

    #[test]
    fn serde_as_strings() {
        let mut g = Grants::default();
        g.add(Scope::service("foo"), Role::ServiceOwner);
        g.add(Scope::Global, Role::SuperUser);
        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["service:foo"][0], "service_owner");
        assert_eq!(json["global"][0], "superuser");
        let back: Grants = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
    }
}
