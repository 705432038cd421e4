/// A named, versioned API group, e.g. `apps/v1`, or the special core group.
///
/// Each discovered `groupVersion` of a group becomes its own `ApiGroup`
/// entry (a `Deployment` served under both `apps/v1` and a hypothetical
/// `apps/v1beta1` would be two `ApiGroup`s), matching how `/apis` discovery
/// is shaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiGroup {
    pub name: String,
    /// URL path prefix for this group version, e.g. `/api/v1` for the core
    /// group or `/apis/apps/v1` for a named, versioned group.
    pub endpoint: String,
    pub version: String,
}

impl ApiGroup {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            version: version.into(),
        }
    }

    /// The core (unnamed) `v1` group, always present: `GET /api/v1`.
    pub fn core_v1() -> Self {
        Self::new("core", "/api/v1", "v1")
    }
}

/// A listable/watchable REST resource on a cluster: (group, kind, plural
/// name, namespaced, supported verbs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiResource {
    pub group: ApiGroup,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ApiResource {
    pub fn new(
        group: ApiGroup,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
        verbs: Vec<String>,
    ) -> Self {
        Self {
            group,
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
            verbs,
        }
    }

    /// `group/plural`, used to deduplicate resources merged from several
    /// discovery calls in the facade.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.plural, self.group.name)
    }

    pub fn supports(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb)
    }

    pub fn pods() -> Self {
        Self::new(
            ApiGroup::core_v1(),
            "Pod",
            "pods",
            true,
            ["create", "delete", "deletecollection", "get", "list", "patch", "update", "watch"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    pub fn namespaces() -> Self {
        Self::new(
            ApiGroup::core_v1(),
            "Namespace",
            "namespaces",
            false,
            ["create", "delete", "get", "list", "patch", "update", "watch"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}
