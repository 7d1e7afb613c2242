/// API version v1 of the Gateway API resources

pub mod gateway;
pub mod gateway_class;
pub mod http_route;

pub use gateway::{Gateway, GatewaySpec, GatewayStatus, Listener, ListenerStatus};
pub use gateway_class::{GatewayClass, GatewayClassSpec, GatewayClassStatus};
pub use http_route::{HTTPRoute, HTTPRouteSpec, HTTPRouteStatus, ParentReference};

/// API group for Gateway API resources
pub const API_GROUP: &str = "gateway.networking.k8s.io";
/// API version served by the controller
pub const API_VERSION: &str = "v1";
