use crate::config::SecurityConfig;
use crate::error::Error;
use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod auth;

/// Administrative roles, lowest privilege first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(Error::Authorization(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User name
    pub name: String,
    /// User role
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

impl Claims {
    pub fn role(&self) -> Result<Role, Error> {
        self.role.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    /// Seconds
    pub expires_in: u64,
}

/// Issues and checks bearer tokens
pub struct SecurityService {
    config: SecurityConfig,
}

impl SecurityService {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Generate a JWT token for an operator
    pub fn generate_token(&self, subject: &str, name: &str, role: Role) -> Result<AuthToken> {
        let now = Utc::now();
        let expiration = now + Duration::minutes(self.config.jwt_expiration_minutes as i64);

        let claims = Claims {
            sub: subject.to_string(),
            name: name.to_string(),
            role: role.as_str().to_string(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Authentication(format!("Failed to generate JWT token: {}", e)))?;

        Ok(AuthToken {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.jwt_expiration_minutes * 60,
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| Error::Authentication(format!("Invalid token: {}", e)))?;

        Ok(token_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SecurityService {
        SecurityService::new(SecurityConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_minutes: 5,
        })
    }

    #[test]
    fn token_round_trips_claims() -> Result<()> {
        let service = service();
        let token = service.generate_token("42", "ops", Role::SuperAdmin)?;

        let data = service.validate_token(&token.access_token)?;

        assert_eq!(data.claims.sub, "42");
        assert_eq!(data.claims.role()?, Role::SuperAdmin);
        assert_eq!(token.expires_in, 300);
        Ok(())
    }

    #[test]
    fn super_admin_satisfies_admin_but_not_reverse() -> Result<()> {
        let service = service();
        let admin = service.validate_token(&service.generate_token("1", "a", Role::Admin)?.access_token)?;
        let root = service.validate_token(&service.generate_token("2", "r", Role::SuperAdmin)?.access_token)?;

        assert!(admin.claims.role()? >= Role::Admin);
        assert!(admin.claims.role()? < Role::SuperAdmin);
        assert!(root.claims.role()? >= Role::Admin);
        Ok(())
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() -> Result<()> {
        let other = SecurityService::new(SecurityConfig {
            jwt_secret: "other".to_string(),
            jwt_expiration_minutes: 5,
        });
        let token = other.generate_token("1", "a", Role::Admin)?;

        assert!(service().validate_token(&token.access_token).is_err());
        Ok(())
    }
}
