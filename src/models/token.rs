//! Credential bundle of the cookie-generation API and its `rememberMe` cookie.
//!
//! The cookie value is the percent-encoded form of
//! `{"token":<token>,"subscriberId":<id>}` where `<token>` is itself compact JSON
//! that has been percent-encoded once more. The vendor compares it byte for byte,
//! so the encoding rules below are fixed:
//! - unreserved characters (`A-Z a-z 0-9 - _ . ~`) stay literal, space is `%20`;
//! - `!`, `*` and `)` stay literal, everything else is `%XX` (upper-case hex);
//! - `subscriberId` is written as a bare number (`null` when absent).

use crate::models::codec::{self, DecodeError};
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;
use std::borrow::Cow;
use std::string::FromUtf8Error;

pub const COOKIE_NAME: &str = "rememberMe";

const PREFIX: &str = "%7B%22token%22%3A";
const SEPARATOR: &str = "%2C%22subscriberId%22%3A";
const SUFFIX: &str = "%7D";

#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("cookie value does not follow the rememberMe template")]
    Template,
    #[error("token is not valid percent-encoded utf-8: {0}")]
    Percent(#[from] FromUtf8Error),
    #[error("token is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid subscriber id {0:?}")]
    SubscriberId(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Token {
    /// Opaque to the client; echoed back inside the cookie.
    pub value: Option<Value>,
    pub subscriber_id: Option<i64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    login_token: Option<LoginToken>,
}

#[derive(Deserialize, Default)]
struct LoginToken {
    value: Option<LoginTokenValue>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LoginTokenValue {
    token: Option<Value>,
    #[serde(default, deserialize_with = "subscriber_id")]
    subscriber_id: Option<i64>,
}

/// Some accounts get the id as a decimal string.
fn subscriber_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(i64),
        Text(String),
    }

    match Option::<Wire>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Wire::Number(id)) => Ok(Some(id)),
        Some(Wire::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("subscriberId {:?} is not an integer", text))),
    }
}

impl Token {
    /// Read `loginToken.value.{token,subscriberId}`; absent keys give `None`.
    pub fn from_login_response(body: &Value) -> Result<Self, DecodeError> {
        let body: LoginBody = codec::decode("login", body)?;
        let value = body.login_token.and_then(|t| t.value).unwrap_or_default();
        Ok(Token {
            value: value.token,
            subscriber_id: value.subscriber_id,
        })
    }

    /// The token part of the cookie, encoded on its own.
    pub fn encoded(&self) -> Result<String, serde_json::Error> {
        let json = match &self.value {
            Some(v) => serde_json::to_string(v)?,
            None => "null".to_string(),
        };
        Ok(encode_component(&json))
    }

    pub fn cookie_value(&self) -> Result<String, serde_json::Error> {
        let subscriber = match self.subscriber_id {
            Some(id) => id.to_string(),
            None => "null".to_string(),
        };
        Ok(format!("{PREFIX}{}{SEPARATOR}{subscriber}{SUFFIX}", self.encoded()?))
    }

    /// `(name, value)` of the cookie sent with every legacy call.
    pub fn as_cookie(&self) -> Result<(&'static str, String), serde_json::Error> {
        Ok((COOKIE_NAME, self.cookie_value()?))
    }

    /// Inverse of [`Token::cookie_value`].
    pub fn from_cookie_value(cookie: &str) -> Result<Self, CookieError> {
        let inner = cookie
            .strip_prefix(PREFIX)
            .and_then(|s| s.strip_suffix(SUFFIX))
            .ok_or(CookieError::Template)?;
        let (token, subscriber) = inner.rsplit_once(SEPARATOR).ok_or(CookieError::Template)?;

        let json = urlencoding::decode(token)?;
        let value = match serde_json::from_str::<Value>(&json)? {
            Value::Null => None,
            v => Some(v),
        };
        let subscriber_id = match subscriber {
            "null" => None,
            s => Some(s.parse().map_err(|_| CookieError::SubscriberId(s.to_string()))?),
        };
        Ok(Token { value, subscriber_id })
    }
}

fn encode_component(raw: &str) -> String {
    match urlencoding::encode(raw) {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s.replace("%21", "!").replace("%2A", "*").replace("%29", ")"),
    }
}
