use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{
    errors::Error as JwtError, DecodingKey, EncodingKey, Header as JwtHeader, TokenData,
    Validation,
};
use log::debug;
use rocket::{
    http::{Header, Status},
    request::{self, FromRequest},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::mongodb::Id;

use super::role::{Capability, Role};

/// Scheme prefix of the `Authorization` header value.
const BEARER: &str = "Bearer ";

/// An authentication token representing a specific user with a specific role.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AuthToken {
    id: Id,
    role: Role,
}

impl AuthToken {
    pub fn new(id: Id, role: Role) -> Self {
        Self { id, role }
    }

    /// Get the user ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the user's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Does this token's role have the given capability?
    pub fn permits(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    /// Fail with `Forbidden` unless the token's role has the given capability.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.permits(capability) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "role {} lacks capability {capability:?}",
                self.role
            )))
        }
    }

    /// Sign this token into a JWT that expires after the configured lifetime.
    pub fn encode(&self, config: &Config) -> std::result::Result<String, JwtError> {
        let claims = Claims {
            sub: self.id.to_string(),
            rol: self.role,
            expire_at: Utc::now() + config.auth_ttl(),
        };
        jsonwebtoken::encode(
            &JwtHeader::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
    }

    /// Sign this token into an `Authorization: Bearer` header.
    pub fn into_header(self, config: &Config) -> std::result::Result<Header<'static>, JwtError> {
        let token = self.encode(config)?;
        Ok(Header::new("Authorization", format!("{BEARER}{token}")))
    }

    /// Verify and decode a JWT.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let data: TokenData<Claims> = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?;
        let id = data
            .claims
            .sub
            .parse::<Id>()
            .map_err(|e| Error::Unauthorized(format!("malformed subject: {e}")))?;
        Ok(Self::new(id, data.claims.rol))
    }
}

/// JWT claims: the user ID, their role and an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    rol: Role,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an AuthToken from the bearer header.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = match req.guard::<&State<Config>>().await {
            request::Outcome::Success(config) => config,
            _ => {
                return request::Outcome::Failure((
                    Status::InternalServerError,
                    Error::Internal("configuration unavailable".to_string()),
                ))
            }
        };

        let token = match req
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix(BEARER))
        {
            Some(token) => token,
            None => {
                return request::Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("missing bearer token".to_string()),
                ))
            }
        };

        match Self::decode(token, config) {
            Ok(token) => request::Outcome::Success(token),
            Err(e) => {
                debug!("Rejected bearer token: {e}");
                request::Outcome::Failure((Status::Unauthorized, e))
            }
        }
    }
}
