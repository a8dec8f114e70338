//! HTTPS client for the 365gps web portal.
//!
//! The portal has no API. A session is opened by visiting the login page and
//! keeping its `PHPSESSID` cookie, the cookie is authenticated by posting the
//! login form, and the current position is read from the map marker feed.

use domain::models::{Position, ProviderCredentials, SessionToken};
use domain::services::ports::{FixResponse, LocationProvider};
use domain::ProviderError;
use reqwest::header::{HeaderMap, ACCEPT_LANGUAGE, COOKIE, SET_COOKIE};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::PortalConfig;

const SESSION_COOKIE_PREFIX: &str = "PHPSESSID=";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// Body returned by the marker feed when the session cookie is not authenticated.
const SESSION_INVALID_BODY: &[u8] = br#"{"result":"NULL"}"#;

#[derive(Debug, Deserialize)]
struct MarkerList {
    #[serde(rename = "aaData", default)]
    aa_data: Vec<Marker>,
}

#[derive(Debug, Deserialize)]
struct Marker {
    lat_google: String,
    lng_google: String,
}

/// [`LocationProvider`] backed by the live portal.
#[derive(Clone)]
pub struct GpsPortalClient {
    client: Client,
    base_url: String,
    accept_language: String,
    timezone_minutes: i32,
}

impl GpsPortalClient {
    pub fn new(config: &PortalConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        info!(
            base_url = %config.base_url,
            accept_invalid_certs = config.accept_invalid_certs,
            "GPS portal client initialized"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            accept_language: config.accept_language.clone(),
            timezone_minutes: config.timezone_minutes,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Visits the login page and returns the anonymous session cookie.
    async fn open_session(&self) -> Result<SessionToken, ProviderError> {
        let response = self
            .client
            .get(self.url("login.php"))
            .send()
            .await
            .map_err(transport)?;
        let response = require_success("session", response)?;

        extract_session_cookie(response.headers()).ok_or(ProviderError::MissingSessionCookie)
    }

    /// Posts the credentials against an anonymous session.
    async fn authenticate(
        &self,
        token: &SessionToken,
        credentials: &ProviderCredentials,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.url("npost_login.php?lang=en"))
            .header(COOKIE, token.as_str())
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .form(&login_form(credentials))
            .send()
            .await
            .map_err(transport)?;
        require_success("login", response)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LocationProvider for GpsPortalClient {
    async fn login(&self, credentials: &ProviderCredentials) -> Result<SessionToken, ProviderError> {
        let token = self.open_session().await?;
        self.authenticate(&token, credentials).await?;
        debug!(token = %token.fingerprint(), "Portal session authenticated");
        Ok(token)
    }

    async fn current_fix(&self, token: &SessionToken) -> Result<FixResponse, ProviderError> {
        let url = self.url(&format!(
            "post_map_marker_list.php?timezonemins={}",
            self.timezone_minutes
        ));
        let response = self
            .client
            .get(url)
            .header(COOKIE, token.as_str())
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .map_err(transport)?;
        let response = require_success("fetch", response)?;
        let body = response.bytes().await.map_err(transport)?;

        parse_fix_body(&body)
    }
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

fn require_success(step: &'static str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ProviderError::UnexpectedStatus {
            step,
            status: status.as_u16(),
        })
    }
}

/// Login form fields, in the order the portal's own page encodes them.
fn login_form(credentials: &ProviderCredentials) -> [(&'static str, &str); 4] {
    [
        ("demo", "F"),
        ("form_type", "0"),
        ("password", credentials.secret()),
        ("username", credentials.identity()),
    ]
}

/// Finds the `PHPSESSID=...` pair among the response's `Set-Cookie` headers.
fn extract_session_cookie(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .find(|pair| pair.starts_with(SESSION_COOKIE_PREFIX))
        .map(SessionToken::new)
}

fn strip_bom(body: &[u8]) -> &[u8] {
    body.strip_prefix(UTF8_BOM).unwrap_or(body)
}

/// Interprets a marker feed body.
fn parse_fix_body(body: &[u8]) -> Result<FixResponse, ProviderError> {
    let body = strip_bom(body);
    if body == SESSION_INVALID_BODY {
        return Ok(FixResponse::SessionInvalid);
    }

    let markers: MarkerList = serde_json::from_slice(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("marker list: {}", e)))?;
    let marker = markers
        .aa_data
        .first()
        .ok_or_else(|| ProviderError::MalformedResponse("marker list is empty".to_string()))?;

    let latitude = parse_coordinate("lat_google", &marker.lat_google)?;
    let longitude = parse_coordinate("lng_google", &marker.lng_google)?;
    shared::validation::validate_latitude(latitude)
        .and_then(|_| shared::validation::validate_longitude(longitude))
        .map_err(|e| ProviderError::MalformedResponse(shared::validation::message_of(&e)))?;

    Ok(FixResponse::Position(Position::new(latitude, longitude)))
}

fn parse_coordinate(field: &str, raw: &str) -> Result<f64, ProviderError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ProviderError::MalformedResponse(format!("{} is not a number: {:?}", field, raw)))
}
