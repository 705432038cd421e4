//! URL construction. Deterministic in `(server, selector, watch, timeout,
//! cursor)`: query parameters are always emitted in the same order so two
//! identical inputs produce byte-identical URLs.

use kubescope_core::{ApiGroup, ObjectSelector};

fn resource_base(server: &str, selector: &ObjectSelector) -> String {
    let group: &ApiGroup = &selector.resource.group;
    let plural = &selector.resource.plural;

    match &selector.namespace {
        Some(namespace) => format!("{server}{endpoint}/namespaces/{namespace}/{plural}", endpoint = group.endpoint),
        None => format!("{server}{endpoint}/{plural}", endpoint = group.endpoint),
    }
}

/// URL for a `list` or `watch` request.
///
/// `timeoutSeconds=0` is treated as "unset": the caller asked for no
/// timeout at all, and the query parameter is omitted rather than sent as
/// a literal zero (which the API server would treat as "expire instantly").
pub fn list_or_watch_url(
    server: &str,
    selector: &ObjectSelector,
    watch: bool,
    cursor: Option<u64>,
    timeout_seconds: Option<u32>,
) -> String {
    let base = resource_base(server, selector);
    let mut params = Vec::new();

    if watch {
        params.push("watch=1".to_string());
        if let Some(cursor) = cursor {
            params.push(format!("resourceVersion={cursor}"));
        }
    }
    if let Some(timeout) = timeout_seconds.filter(|t| *t != 0) {
        params.push(format!("timeoutSeconds={timeout}"));
    }

    if params.is_empty() {
        base
    } else {
        format!("{base}?{query}", query = params.join("&"))
    }
}

/// URL for streaming a pod's logs. Always includes the pod name segment,
/// matching `original_source/kube/client.py`'s shape (spec.md §4.3's log
/// URL omits it, but the original always addresses a specific pod).
pub fn pod_log_url(server: &str, selector: &ObjectSelector, tail_lines: u32) -> Option<String> {
    let namespace = selector.namespace.as_deref()?;
    let pod_name = selector.pod_name.as_deref()?;
    let container_name = selector.container_name.as_deref()?;
    let endpoint = &selector.resource.group.endpoint;
    let plural = &selector.resource.plural;

    Some(format!(
        "{server}{endpoint}/namespaces/{namespace}/{plural}/{pod_name}/log?container={container_name}&follow=1&tailLines={tail_lines}"
    ))
}

pub fn api_groups_url(server: &str) -> String {
    format!("{server}/apis")
}

pub fn api_resources_url(server: &str, group: &ApiGroup) -> String {
    format!("{server}{endpoint}", endpoint = group.endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubescope_core::ApiResource;

    #[test]
    fn namespaced_list_url() {
        let selector = ObjectSelector::new(ApiResource::pods()).in_namespace("default").unwrap();
        let url = list_or_watch_url("https://cluster.example", &selector, false, None, None);
        assert_eq!(url, "https://cluster.example/api/v1/namespaces/default/pods");
    }

    #[test]
    fn cluster_scoped_list_url() {
        let selector = ObjectSelector::new(ApiResource::namespaces());
        let url = list_or_watch_url("https://cluster.example", &selector, false, None, None);
        assert_eq!(url, "https://cluster.example/api/v1/namespaces");
    }

    #[test]
    fn watch_url_includes_cursor_and_timeout_in_canonical_order() {
        let selector = ObjectSelector::new(ApiResource::pods()).in_namespace("default").unwrap();
        let url = list_or_watch_url("https://cluster.example", &selector, true, Some(42), Some(300));
        assert_eq!(
            url,
            "https://cluster.example/api/v1/namespaces/default/pods?watch=1&resourceVersion=42&timeoutSeconds=300"
        );
    }

    #[test]
    fn zero_timeout_is_omitted() {
        let selector = ObjectSelector::new(ApiResource::pods()).in_namespace("default").unwrap();
        let url = list_or_watch_url("https://cluster.example", &selector, false, None, Some(0));
        assert_eq!(url, "https://cluster.example/api/v1/namespaces/default/pods");
    }

    #[test]
    fn construction_is_deterministic() {
        let selector = ObjectSelector::new(ApiResource::pods()).in_namespace("default").unwrap();
        let a = list_or_watch_url("https://cluster.example", &selector, true, Some(7), Some(15));
        let b = list_or_watch_url("https://cluster.example", &selector, true, Some(7), Some(15));
        assert_eq!(a, b);
    }

    #[test]
    fn pod_log_url_shape() {
        let selector = ObjectSelector::new(ApiResource::pods())
            .in_namespace("default")
            .unwrap()
            .for_pod("web-0", "app");
        let url = pod_log_url("https://cluster.example", &selector, 100).unwrap();
        assert_eq!(
            url,
            "https://cluster.example/api/v1/namespaces/default/pods/web-0/log?container=app&follow=1&tailLines=100"
        );
    }
}
