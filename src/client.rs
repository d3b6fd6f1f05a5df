//! Authenticated session against the Voltalis web API.
//!
//! - Blocking, one request at a time, through a [`Transport`].
//! - Two vendor generations are supported:
//!   - cookie: form login on `classic.myvoltalis.com`, then every call carries the
//!     `rememberMe` cookie, the session cookies and a `User-Site-Id` header;
//!   - bearer: JSON login on `api.myvoltalis.com`, then `Authorization: Bearer`.
//! - Responses are classified here: 204 (or an empty 2xx body) is success without
//!   content, any other 2xx must carry JSON, everything else is
//!   [`ClientError::Http`]. Nothing is retried.

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::models::codec::{self, DecodeError};
use crate::models::token::{COOKIE_NAME, CookieError, Token};
use crate::models::voltalis::*;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::utils::{chart_date, endpoint_name, epoch_millis};

pub const LOGIN_URL: &str = "https://classic.myvoltalis.com/login";
pub const BASE_URL: &str = "https://myvoltalis.com";
pub const API_URL: &str = "https://api.myvoltalis.com";

const ACCEPT: &str = "application/json, text/plain, */*";
const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{endpoint}: http {status}: {body}")]
    Http { endpoint: String, status: u16, body: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("form encode error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
    #[error(transparent)]
    Cookie(#[from] CookieError),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("{endpoint} needs a {expected} session")]
    WrongScheme { endpoint: &'static str, expected: &'static str },
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A classified, successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Json(Value),
    NoContent,
}

impl RawResponse {
    /// The JSON document, `Value::Null` when there was none.
    pub fn into_value(self) -> Value {
        match self {
            RawResponse::Json(v) => v,
            RawResponse::NoContent => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login_url: String,
    pub base_url: String,
    pub api_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            login_url: LOGIN_URL.to_string(),
            base_url: BASE_URL.to_string(),
            api_url: API_URL.to_string(),
        }
    }
}

/// Sees every response (endpoint name, raw response) before classification.
pub type ResponseObserver = Box<dyn Fn(&str, &HttpResponse)>;

enum AuthArtifact {
    Cookie {
        token: Token,
        session_cookies: Vec<(String, String)>,
        sites: Vec<Site>,
    },
    Bearer(String),
}

pub struct ClientBuilder {
    transport: Box<dyn Transport>,
    endpoints: Endpoints,
    observer: Option<ResponseObserver>,
}

impl ClientBuilder {
    pub fn new(transport: impl Transport + 'static) -> Self {
        ClientBuilder {
            transport: Box::new(transport),
            endpoints: Endpoints::default(),
            observer: None,
        }
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn on_response(mut self, f: impl Fn(&str, &HttpResponse) + 'static) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    /// Cookie-generation login.
    pub fn login_classic(self, credentials: &Credentials) -> Result<VoltalisClient, ClientError> {
        let fields: &[(&str, &str)] = &[
            ("id", ""),
            ("alternative_email", ""),
            ("email", ""),
            ("firstname", ""),
            ("lastname", ""),
            ("login", ""),
            ("password", credentials.password.as_str()),
            ("phone", ""),
            ("country", ""),
            ("selectedSiteId", ""),
            ("username", credentials.username.as_str()),
            ("stayLoggedIn", "true"),
        ];
        let form = serde_urlencoded::to_string(fields)?;
        let request = HttpRequest::post(self.endpoints.login_url.clone(), form.into_bytes())
            .header("Accept", ACCEPT)
            .header("Content-Type", FORM_CONTENT_TYPE);

        let response = self.transport.send(&request)?;
        observe(self.observer.as_ref(), "login", &response);
        let session_cookies = response.header_values("set-cookie").filter_map(parse_set_cookie).collect();
        let body = classify_login(response)?;

        let token = Token::from_login_response(&body)?;
        if token.value.is_none() {
            warn!("login response carries no loginToken; legacy calls will likely be rejected");
        }
        let login: LoginResponse = codec::decode("login", &body)?;
        let sites = login.subscriber.map(|s| s.site_list).unwrap_or_default();
        info!("Logged in (cookie scheme), {} site(s)", sites.len());

        Ok(self.finish(AuthArtifact::Cookie {
            token,
            session_cookies,
            sites,
        }))
    }

    /// Bearer-generation login.
    pub fn login_bearer(self, credentials: &Credentials) -> Result<VoltalisClient, ClientError> {
        let url = format!("{}/auth/login", self.endpoints.api_url);
        let body = serde_json::to_vec(&json!({
            "login": credentials.username,
            "password": credentials.password,
        }))?;
        let request = HttpRequest::post(url, body)
            .header("Accept", ACCEPT)
            .header("Content-Type", JSON_CONTENT_TYPE);

        let response = self.transport.send(&request)?;
        observe(self.observer.as_ref(), "login", &response);
        let body = classify_login(response)?;

        let token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Auth("login response carries no token".to_string()))?
            .to_string();
        info!("Logged in (bearer scheme)");

        Ok(self.finish(AuthArtifact::Bearer(token)))
    }

    fn finish(self, auth: AuthArtifact) -> VoltalisClient {
        VoltalisClient {
            transport: self.transport,
            endpoints: self.endpoints,
            observer: self.observer,
            auth,
        }
    }
}

fn observe(observer: Option<&ResponseObserver>, endpoint: &str, response: &HttpResponse) {
    info!("{} -> {}", endpoint, response.status.as_u16());
    if let Some(observer) = observer {
        observer(endpoint, response);
    }
}

fn classify(endpoint: &str, response: HttpResponse) -> Result<RawResponse, ClientError> {
    let status = response.status;
    if !status.is_success() {
        return Err(ClientError::Http {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }
    if status == http::StatusCode::NO_CONTENT || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RawResponse::NoContent);
    }
    Ok(RawResponse::Json(codec::parse(endpoint, &response.body)?))
}

fn classify_login(response: HttpResponse) -> Result<Value, ClientError> {
    match classify("login", response) {
        Ok(RawResponse::Json(v)) => Ok(v),
        Ok(RawResponse::NoContent) => Err(ClientError::Auth("empty login response".to_string())),
        Err(ClientError::Http { status, body, .. }) => Err(ClientError::Auth(format!("http {}: {}", status, body))),
        Err(e) => Err(e),
    }
}

/// `name=value` of a `Set-Cookie` header, attributes dropped.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

pub struct VoltalisClient {
    transport: Box<dyn Transport>,
    endpoints: Endpoints,
    observer: Option<ResponseObserver>,
    auth: AuthArtifact,
}

impl VoltalisClient {
    pub fn builder(transport: impl Transport + 'static) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    /// Sites listed in the cookie-generation login response. Bearer sessions
    /// discover their site through [`VoltalisClient::me`] instead.
    pub fn sites(&self) -> &[Site] {
        match &self.auth {
            AuthArtifact::Cookie { sites, .. } => sites,
            AuthArtifact::Bearer(_) => &[],
        }
    }

    pub fn site(&self, site_id: SiteId) -> Option<&Site> {
        self.sites().iter().find(|s| s.uid == site_id)
    }

    pub fn token(&self) -> Option<&Token> {
        match &self.auth {
            AuthArtifact::Cookie { token, .. } => Some(token),
            AuthArtifact::Bearer(_) => None,
        }
    }

    fn execute(&self, request: HttpRequest) -> Result<RawResponse, ClientError> {
        let endpoint = endpoint_name(&request.url).to_string();
        debug!("{} {}", request.method, request.url);
        let response = self.transport.send(&request)?;
        observe(self.observer.as_ref(), &endpoint, &response);
        classify(&endpoint, response)
    }

    fn cookie_header(&self, endpoint: &'static str) -> Result<String, ClientError> {
        let AuthArtifact::Cookie {
            token, session_cookies, ..
        } = &self.auth
        else {
            return Err(ClientError::WrongScheme {
                endpoint,
                expected: "cookie",
            });
        };

        // session cookies win over the computed rememberMe of the same name
        let mut pairs = vec![(COOKIE_NAME.to_string(), token.cookie_value()?)];
        for (name, value) in session_cookies {
            match pairs.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1 = value.clone(),
                None => pairs.push((name.clone(), value.clone())),
            }
        }
        Ok(pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; "))
    }

    /// Legacy call: GET without body, POST with one.
    fn call(
        &self,
        endpoint: &'static str,
        path: &str,
        site_id: SiteId,
        body: Option<Value>,
    ) -> Result<RawResponse, ClientError> {
        let url = format!("{}{}", self.endpoints.base_url, path);
        let cookie = self.cookie_header(endpoint)?;
        let request = match body {
            Some(body) => HttpRequest::post(url, serde_json::to_vec(&body)?).header("Content-Type", JSON_CONTENT_TYPE),
            None => HttpRequest::get(url),
        };
        self.execute(
            request
                .header("Accept", ACCEPT)
                .header("User-Site-Id", site_id.to_string())
                .header("Cookie", cookie),
        )
    }

    fn read(&self, endpoint: &'static str, path: &str, site_id: SiteId) -> Result<Value, ClientError> {
        self.call(endpoint, path, site_id, None).map(RawResponse::into_value)
    }

    fn write<T: Serialize>(
        &self,
        endpoint: &'static str,
        path: &str,
        site_id: SiteId,
        payload: &T,
    ) -> Result<RawResponse, ClientError> {
        self.call(endpoint, path, site_id, Some(codec::encode(payload)?))
    }

    fn api_get<T: DeserializeOwned>(&self, endpoint: &'static str, path: &str) -> Result<T, ClientError> {
        let AuthArtifact::Bearer(token) = &self.auth else {
            return Err(ClientError::WrongScheme {
                endpoint,
                expected: "bearer",
            });
        };
        let request = HttpRequest::get(format!("{}{}", self.endpoints.api_url, path))
            .header("Accept", ACCEPT)
            .header("Authorization", format!("Bearer {}", token));
        let value = self.execute(request)?.into_value();
        Ok(codec::decode(endpoint, &value)?)
    }

    // =====================
    // Cookie generation: reads
    // =====================

    pub fn last_minute_consumption(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read("lastMinuteConsumption", "/siteDataRealTime/lastMinuteConsumption.json", site_id)
    }

    pub fn immediate_consumption_in_kw(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read("immediateConsumptionInkW", "/siteData/immediateConsumptionInkW.json", site_id)
    }

    pub fn site_max_power(
        &self,
        site_id: SiteId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Value, ClientError> {
        let path = format!(
            "/siteData/getSiteMaxPower.json?endDate={}&startDate={}",
            epoch_millis(end),
            epoch_millis(start)
        );
        self.read("getSiteMaxPower", &path, site_id)
    }

    pub fn absence_mode_state(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read("getAbsenceModeState", "/programmationEvent/getAbsenceModeState.json", site_id)
    }

    pub fn absence_state(&self, site_id: SiteId, modulator: ModulatorId) -> Result<Value, ClientError> {
        let path = format!("/absence/getAbsenceState.json?csLinkId={}", modulator);
        self.read("getAbsenceState", &path, site_id)
    }

    pub fn on_off_state(&self, site_id: SiteId, modulator: ModulatorId) -> Result<Value, ClientError> {
        let path = format!("/programmationEvent/getOnOffState.json?csLinkId={}", modulator);
        self.read("getOnOffState", &path, site_id)
    }

    pub fn modulator_state(&self, site_id: SiteId, modulator: ModulatorId) -> Result<Value, ClientError> {
        let path = format!("/modulator/getModulatorState.json?csLinkId={}", modulator);
        self.read("getModulatorState", &path, site_id)
    }

    pub fn available_programmation_mode(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read("availableProgrammationMode", "/scheduler/availableProgrammationMode.json", site_id)
    }

    pub fn mode_list(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read("getModeList", "/scheduler/getModeList.json", site_id)
    }

    pub fn scheduler_list(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read("getSchedulerList", "/scheduler/getSchedulerList.json", site_id)
    }

    pub fn immediate_consumption_charts(&self, site_id: SiteId, day: NaiveDate) -> Result<Value, ClientError> {
        let date = chart_date(day);
        let path = format!(
            "/chart/getImmediateConsumptionCharts.json?chartWithLegend=true&endDate={date}\
             &isWebView=false&startDate={date}&withSubscriptionSerie=true"
        );
        self.read("getImmediateConsumptionCharts", &path, site_id)
    }

    pub fn annual_consumption_charts(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read(
            "getAnnualConsumptionDetailedCharts",
            "/chart/getAnnualConsumptionDetailedCharts.json?isWebView=false",
            site_id,
        )
    }

    pub fn total_modulated_power(
        &self,
        site_id: SiteId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Value, ClientError> {
        let path = format!(
            "/siteData/getTotalModulatedPower.json?endDate={}&startDate={}",
            epoch_millis(end),
            epoch_millis(start)
        );
        self.read("getTotalModulatedPower", &path, site_id)
    }

    pub fn country_consumption_map(&self, site_id: SiteId) -> Result<Value, ClientError> {
        self.read(
            "getCountryConsumptionMap",
            "/chart/getCountryConsumptionMap.json?isWebView=false&mapType=annual&useLegend=true",
            site_id,
        )
    }

    // =====================
    // Cookie generation: writes
    // =====================

    pub fn update_on_off(&self, site_id: SiteId, payload: &OnOffUpdate) -> Result<RawResponse, ClientError> {
        self.write("updateOnOffEvent", "/programmationEvent/updateOnOffEvent", site_id, payload)
    }

    pub fn update_mode_config(&self, site_id: SiteId, payload: &UpdateModeConfig) -> Result<RawResponse, ClientError> {
        self.write("updateModeConfig", "/scheduler/updateModeConfig", site_id, payload)
    }

    pub fn update_scheduler_config(
        &self,
        site_id: SiteId,
        payload: &UpdateSchedulerConfig,
    ) -> Result<SchedulerUpdated, ClientError> {
        let response = self.write("updateSchedulerConfig", "/scheduler/updateSchedulerConfig", site_id, payload)?;
        match response {
            RawResponse::Json(v) => Ok(codec::decode("updateSchedulerConfig", &v)?),
            RawResponse::NoContent => Ok(SchedulerUpdated::default()),
        }
    }

    pub fn change_scheduler_state(
        &self,
        site_id: SiteId,
        payload: &ChangeSchedulerState,
    ) -> Result<RawResponse, ClientError> {
        self.write("changeSchedulerState", "/scheduler/changeSchedulerState", site_id, payload)
    }

    // =====================
    // Bearer generation
    // =====================

    pub fn me(&self) -> Result<Account, ClientError> {
        self.api_get("me", "/api/account/me")
    }

    pub fn consumption_stats_per_hour(&self, site_id: SiteId, day: NaiveDate) -> Result<ConsumptionStats, ClientError> {
        let path = format!("/api/site/{}/consumption/day/{}/full-data", site_id, day.format("%Y-%m-%d"));
        self.api_get("consumption", &path)
    }
}
