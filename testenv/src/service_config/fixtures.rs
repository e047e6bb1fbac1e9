//! Default service descriptions for each backend kind

use shared::{BackendKind, WORKING_BACKEND_PORT};

use super::{
    Api, AuthRequirement, Authentication, AuthenticationRule, Backend, BackendRule, Endpoint, Http, HttpRule,
    Service, Usage, UsageRule,
};

pub const ECHO_SERVICE_NAME: &str = "echo-api.endpoints.cloudesf-testing.cloud.goog";
pub const BOOKSTORE_SERVICE_NAME: &str = "bookstore.endpoints.cloudesf-testing.cloud.goog";
pub const GRPC_ECHO_SERVICE_NAME: &str = "grpc-echo.endpoints.cloudesf-testing.cloud.goog";
pub const GRPC_INTEROP_SERVICE_NAME: &str = "grpc-interop.endpoints.cloudesf-testing.cloud.goog";

pub const INIT_CONFIG_ID: &str = "test-config-id";

const ECHO_API: &str = "1.echo_api_endpoints_cloudesf_testing_cloud_goog";
const BOOKSTORE_API: &str = "endpoints.examples.bookstore.Bookstore";
const GRPC_ECHO_API: &str = "test.grpc.Test";
const GRPC_INTEROP_API: &str = "grpc.testing.TestService";

/// Service description a fresh environment starts from
pub fn service_config_for(kind: BackendKind) -> Service {
    let mut service = match kind {
        BackendKind::EchoSidecar | BackendKind::EchoRemote => echo_service(),
        BackendKind::GrpcBookstoreSidecar | BackendKind::GrpcBookstoreRemote => bookstore_service(),
        BackendKind::GrpcEchoSidecar | BackendKind::GrpcEchoRemote => grpc_echo_service(),
        BackendKind::GrpcInteropSidecar => grpc_interop_service(),
    };

    if kind.is_remote() {
        let scheme = match kind {
            BackendKind::EchoRemote => "https",
            _ => "grpcs",
        };
        let address = format!("{scheme}://localhost:{WORKING_BACKEND_PORT}");
        let rules = service
            .http
            .rules
            .iter()
            .map(|rule| BackendRule::new(&rule.selector, &address))
            .collect();
        service.backend = Some(Backend { rules });
    }

    service
}

fn base_service(name: &str, api: &str) -> Service {
    Service {
        name: name.to_string(),
        id: INIT_CONFIG_ID.to_string(),
        title: format!("Endpoints test service {name}"),
        apis: vec![Api {
            name: api.to_string(),
            version: "1.0.0".to_string(),
        }],
        endpoints: vec![Endpoint {
            name: name.to_string(),
            allow_cors: false,
        }],
        ..Default::default()
    }
}

fn allow_unregistered(selectors: &[String]) -> Usage {
    Usage {
        rules: selectors
            .iter()
            .map(|selector| UsageRule {
                selector: selector.clone(),
                allow_unregistered_calls: true,
                skip_service_control: false,
            })
            .collect(),
    }
}

fn echo_service() -> Service {
    let mut service = base_service(ECHO_SERVICE_NAME, ECHO_API);
    let selector = |method: &str| format!("{ECHO_API}.{method}");

    service.http = Http {
        rules: vec![
            HttpRule::post(&selector("Echo"), "/echo", "message"),
            HttpRule::get(&selector("Simpleget"), "/simpleget"),
            HttpRule::get(&selector("Auth_info_google_jwt"), "/auth/info/googlejwt"),
        ],
    };
    service.usage = allow_unregistered(&[selector("Echo"), selector("Simpleget")]);
    service.authentication = Some(Authentication {
        rules: vec![AuthenticationRule {
            selector: selector("Auth_info_google_jwt"),
            requirements: vec![AuthRequirement {
                provider_id: "google_jwt".to_string(),
                audiences: "ok_audience".to_string(),
            }],
        }],
        providers: vec![],
    });
    service
}

fn bookstore_service() -> Service {
    let mut service = base_service(BOOKSTORE_SERVICE_NAME, BOOKSTORE_API);
    let selector = |method: &str| format!("{BOOKSTORE_API}.{method}");

    service.http = Http {
        rules: vec![
            HttpRule::get(&selector("ListShelves"), "/v1/shelves"),
            HttpRule::post(&selector("CreateShelf"), "/v1/shelves", "shelf"),
            HttpRule::get(&selector("GetShelf"), "/v1/shelves/{shelf}"),
            HttpRule {
                selector: selector("DeleteShelf"),
                delete: Some("/v1/shelves/{shelf}".to_string()),
                ..Default::default()
            },
        ],
    };
    service.usage = allow_unregistered(&[selector("ListShelves"), selector("GetShelf")]);
    service.authentication = Some(Authentication {
        rules: vec![AuthenticationRule {
            selector: selector("CreateShelf"),
            requirements: vec![AuthRequirement {
                provider_id: "google_service_account".to_string(),
                audiences: "bookstore_test_client.cloud.goog".to_string(),
            }],
        }],
        providers: vec![],
    });
    service
}

fn grpc_echo_service() -> Service {
    let mut service = base_service(GRPC_ECHO_SERVICE_NAME, GRPC_ECHO_API);
    let selector = |method: &str| format!("{GRPC_ECHO_API}.{method}");

    service.http = Http {
        rules: vec![
            HttpRule::post(&selector("Echo"), "/echo", "*"),
            HttpRule::post(&selector("EchoStream"), "/echostream", "*"),
        ],
    };
    service.usage = allow_unregistered(&[selector("Echo"), selector("EchoStream")]);
    service
}

fn grpc_interop_service() -> Service {
    let mut service = base_service(GRPC_INTEROP_SERVICE_NAME, GRPC_INTEROP_API);
    let selectors: Vec<String> = [
        "EmptyCall",
        "UnaryCall",
        "StreamingOutputCall",
        "StreamingInputCall",
        "FullDuplexCall",
    ]
    .iter()
    .map(|method| format!("{GRPC_INTEROP_API}.{method}"))
    .collect();

    service.usage = allow_unregistered(&selectors);
    service
}
