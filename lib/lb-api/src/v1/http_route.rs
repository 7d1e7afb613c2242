use crate::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HTTPRoute attaches HTTP match rules and backends to one or more Gateways
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "HTTPRoute",
    plural = "httproutes",
    namespaced,
    derive = "Default",
    status = "HTTPRouteStatus",
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteSpec {
    /// Gateways (and optionally listeners) this route attaches to
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,

    /// Hostnames matched against the Host header
    #[serde(default)]
    pub hostnames: Vec<String>,

    #[serde(default)]
    pub rules: Vec<HTTPRouteRule>,
}

/// Reference from a route to its parent Gateway
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Defaults to the route's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,

    /// Listener name to attach to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,

    /// Listener port to attach to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteRule {
    /// Any one match selects the rule; empty means "prefix /"
    #[serde(default)]
    pub matches: Vec<HTTPRouteMatch>,

    #[serde(default)]
    pub filters: Vec<HTTPRouteFilter>,

    #[serde(default)]
    pub backend_refs: Vec<HTTPBackendRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<HTTPPathMatch>,

    #[serde(default)]
    pub headers: Vec<HTTPHeaderMatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPPathMatch {
    /// Exact, PathPrefix (default) or RegularExpression
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPHeaderMatch {
    /// Exact (default) or RegularExpression
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    pub name: String,

    pub value: String,
}

/// Request or response processing step attached to a rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteFilter {
    /// RequestHeaderModifier, ResponseHeaderModifier or RequestRedirect
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_header_modifier: Option<HTTPHeaderFilter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_header_modifier: Option<HTTPHeaderFilter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_redirect: Option<HTTPRequestRedirectFilter>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPHeaderFilter {
    #[serde(default)]
    pub set: Vec<HTTPHeader>,

    #[serde(default)]
    pub add: Vec<HTTPHeader>,

    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HTTPHeader {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRequestRedirectFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// 301 or 302; defaults to 302
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Backend receiving traffic for a rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPBackendRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Defaults to Service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Relative share of traffic; defaults to 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteStatus {
    /// One entry per (parent, controller) pair
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,

    pub controller_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    const ROUTE: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata:
  name: foo
  namespace: default
spec:
  parentRefs:
    - name: gw
      sectionName: http
  hostnames: ["foo.com"]
  rules:
    - matches:
        - path:
            type: PathPrefix
            value: /foo
      filters:
        - type: RequestHeaderModifier
          requestHeaderModifier:
            add:
              - name: x-env
                value: prod
      backendRefs:
        - name: svc
          port: 8080
"#;

    #[test]
    fn test_route_manifest_parses() {
        let route: HTTPRoute = serde_yaml::from_str(ROUTE).expect("valid manifest");
        assert_eq!(route.spec.parent_refs[0].section_name.as_deref(), Some("http"));
        assert_eq!(route.spec.hostnames, vec!["foo.com"]);

        let rule = &route.spec.rules[0];
        let path = rule.matches[0].path.as_ref().unwrap();
        assert_eq!(path.type_.as_deref(), Some("PathPrefix"));
        assert_eq!(path.value.as_deref(), Some("/foo"));

        let modifier = rule.filters[0].request_header_modifier.as_ref().unwrap();
        assert_eq!(modifier.add[0].name, "x-env");
        assert!(modifier.set.is_empty());
        assert_eq!(rule.backend_refs[0].weight, None);
    }

    #[test]
    fn test_route_crd_metadata() {
        let crd = HTTPRoute::crd();
        assert_eq!(crd.spec.group, "gateway.networking.k8s.io");
        assert_eq!(crd.spec.names.plural, "httproutes");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = HTTPRouteStatus {
            parents: vec![RouteParentStatus {
                parent_ref: ParentReference { name: "gw".into(), ..Default::default() },
                controller_name: "example.com/lb".into(),
                conditions: vec![],
            }],
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["parents"][0]["parentRef"]["name"], "gw");
        assert_eq!(value["parents"][0]["controllerName"], "example.com/lb");
    }
}
