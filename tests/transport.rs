use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

use voltalis::client::{ClientError, Credentials, Endpoints, RawResponse};
use voltalis::models::voltalis::{ModulatorId, SiteId};
use voltalis::services::switch;
use voltalis::transport::UreqTransport;
use voltalis::{Queries, VoltalisClient};

const REMEMBER_ME: &str = "rememberMe=%7B%22token%22%3A%22tok-1%22%2C%22subscriberId%22%3A77%7D";

fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints {
        login_url: server.url("/login"),
        base_url: server.base_url(),
        api_url: server.base_url(),
    }
}

fn credentials() -> Credentials {
    Credentials {
        username: "me@example.com".into(),
        password: "secret".into(),
    }
}

fn login(server: &MockServer) -> VoltalisClient {
    VoltalisClient::builder(UreqTransport::new(Duration::from_secs(5)))
        .endpoints(endpoints(server))
        .login_classic(&credentials())
        .expect("login")
}

fn mock_login(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body_includes("username=me%40example.com")
            .body_includes("stayLoggedIn=true");
        then.status(200)
            .header("content-type", "application/json")
            .header("set-cookie", "JSESSIONID=abc123; Path=/; HttpOnly")
            .json_body(json!({
                "loginToken": {"value": {"token": "tok-1", "subscriberId": 77}},
                "subscriber": {"siteList": [{"id": 1, "modulatorList": [
                    {"modulatorTypeId": 7, "values": {"2": {"csLinkId": 42, "name": "Salon", "color": "#ff0000"}}}
                ]}]}
            }));
    })
}

#[test]
fn cookie_session_over_http() {
    let server = MockServer::start();
    let login_mock = mock_login(&server);
    let state = server.mock(|when, then| {
        when.method(GET)
            .path("/programmationEvent/getOnOffState.json")
            .query_param("csLinkId", "42")
            .header("user-site-id", "1")
            .header("cookie", format!("{}; JSESSIONID=abc123", REMEMBER_ME));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"status": true}));
    });

    let client = login(&server);
    assert_eq!(client.sites().len(), 1);
    let value = client.on_off_state(SiteId(1), ModulatorId(42)).unwrap();
    assert_eq!(value, json!({"status": true}));

    login_mock.assert();
    state.assert();
}

#[test]
fn no_content_and_error_statuses() {
    let server = MockServer::start();
    mock_login(&server);
    server.mock(|when, then| {
        when.method(POST).path("/programmationEvent/updateOnOffEvent");
        then.status(204);
    });
    server.mock(|when, then| {
        when.method(GET).path("/scheduler/getSchedulerList.json");
        then.status(500).body("internal");
    });

    let client = login(&server);
    let site = client.site(SiteId(1)).unwrap().clone();
    assert_eq!(switch::switch_all(&client, &site, true).unwrap(), RawResponse::NoContent);

    match client.scheduler_list(SiteId(1)) {
        Err(ClientError::Http { endpoint, status, body }) => {
            assert_eq!(endpoint, "getSchedulerList");
            assert_eq!(status, 500);
            assert_eq!(body, "internal");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn listings_are_fetched_once_per_query_facade() {
    let server = MockServer::start();
    mock_login(&server);
    let modes = server.mock(|when, then| {
        when.method(GET).path("/scheduler/getModeList.json");
        then.status(200).json_body(json!({"programmationModeList": [
            {"id": 5, "name": "AllEco", "type": 0, "color": "#f13434", "group": [], "targets": []}
        ]}));
    });

    let client = login(&server);
    let queries = Queries::new(&client);
    assert_eq!(queries.mode_by_name(SiteId(1), "AllEco").unwrap().and_then(|m| m.id), Some(5));
    assert!(queries.mode_by_name(SiteId(1), "Other").unwrap().is_none());
    assert_eq!(modes.calls(), 1);
}

#[test]
fn rejected_login_is_an_auth_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/login");
        then.status(401).body("bad credentials");
    });

    let err = VoltalisClient::builder(UreqTransport::new(Duration::from_secs(5)))
        .endpoints(endpoints(&server))
        .login_classic(&credentials())
        .err()
        .expect("login must fail");
    assert!(matches!(err, ClientError::Auth(_)), "{err}");
}

#[test]
fn bearer_session_over_http() {
    let server = MockServer::start();
    let login_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/auth/login")
            .json_body(json!({"login": "me@example.com", "password": "secret"}));
        then.status(200).json_body(json!({"token": "jwt-1"}));
    });
    let me = server.mock(|when, then| {
        when.method(GET)
            .path("/api/account/me")
            .header("authorization", "Bearer jwt-1");
        then.status(200).json_body(json!({"defaultSite": {"id": 12}}));
    });

    let client = VoltalisClient::builder(UreqTransport::new(Duration::from_secs(5)))
        .endpoints(endpoints(&server))
        .login_bearer(&credentials())
        .unwrap();
    let account = client.me().unwrap();
    assert_eq!(account.default_site.map(|s| s.uid), Some(SiteId(12)));

    login_mock.assert();
    me.assert();
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let endpoints = Endpoints {
        login_url: "http://127.0.0.1:1/login".into(),
        ..Endpoints::default()
    };
    let err = VoltalisClient::builder(UreqTransport::new(Duration::from_secs(2)))
        .endpoints(endpoints)
        .login_classic(&credentials())
        .err()
        .expect("nothing listens on port 1");
    assert!(matches!(err, ClientError::Transport(_)), "{err}");
}
