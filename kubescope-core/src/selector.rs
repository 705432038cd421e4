use crate::resource::ApiResource;

/// Per-operation parameters that ride along with a selector but don't
/// affect its identity as a watch-registration key in the way resource/
/// namespace/pod do. Currently only log streaming has any.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientOperationParams {
    LogStreaming(LogStreamingParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogStreamingParams {
    /// How many lines of backlog to fetch before following. 0 means no
    /// backlog, matching the original implementation's default.
    pub tail_lines: u32,
}

impl Default for LogStreamingParams {
    fn default() -> Self {
        Self { tail_lines: 0 }
    }
}

/// Identifies what a list/watch/log-stream operation targets: a resource
/// kind, optionally scoped to a namespace, and (for logs) a pod and
/// container within it.
///
/// Used both to build request URLs and as the key `ClusterLoop` registers
/// watch tasks under, so it compares by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectSelector {
    pub resource: ApiResource,
    pub namespace: Option<String>,
    pub pod_name: Option<String>,
    pub container_name: Option<String>,
    pub op_params: Option<ClientOperationParams>,
}

/// Raised when a caller tries to scope a selector by namespace against a
/// cluster-scoped resource.
#[derive(Debug, thiserror::Error)]
#[error("cannot select {kind} objects by namespace: the resource is not namespaced", kind = .0)]
pub struct NotNamespacedError(pub String);

impl ObjectSelector {
    pub fn new(resource: ApiResource) -> Self {
        Self {
            resource,
            namespace: None,
            pod_name: None,
            container_name: None,
            op_params: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Result<Self, NotNamespacedError> {
        if !self.resource.namespaced {
            return Err(NotNamespacedError(self.resource.kind.clone()));
        }
        self.namespace = Some(namespace.into());
        Ok(self)
    }

    pub fn for_pod(mut self, pod_name: impl Into<String>, container_name: impl Into<String>) -> Self {
        self.pod_name = Some(pod_name.into());
        self.container_name = Some(container_name.into());
        self
    }

    pub fn with_log_params(mut self, params: LogStreamingParams) -> Self {
        self.op_params = Some(ClientOperationParams::LogStreaming(params));
        self
    }

    /// A short, log-friendly rendering: `namespace/Kind` or just `Kind`.
    pub fn pretty(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{kind}", kind = self.resource.kind),
            None => self.resource.kind.clone(),
        }
    }
}
