//! Issuing and verifying auth tokens, and the handlers for the auth routes.
//!
//! Tokens are JSON Web Tokens signed with a symmetric secret. Every route
//! except the health check, registration, and log-in goes through the
//! [AuthenticatedUser] extractor, which verifies the bearer token and resolves
//! the user it refers to. Any failure along the way produces the same
//! unauthenticated response so that callers cannot distinguish a bad token
//! from a deleted user.

use axum::{
    Json, RequestPartsExt,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    Error,
    password::PasswordHash,
    state::AppState,
    user::{Email, User, UserID, create_user, get_user_by_email, get_user_by_id},
};

/// How long an auth token stays valid after it is issued.
pub const TOKEN_DURATION: Duration = Duration::days(7);

/// The contents of a JSON Web Token.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The ID of the user the token was issued to.
    pub sub: i64,
    /// The time the token was issued as a unix timestamp.
    pub iat: i64,
    /// The expiry time of the token as a unix timestamp.
    pub exp: i64,
}

/// Sign a token for `user_id` issued at the current time.
///
/// # Errors
/// Returns an [Error::TokenCreation] if the token could not be signed.
pub fn issue_token(user_id: UserID, encoding_key: &EncodingKey) -> Result<String, Error> {
    encode_jwt(user_id, OffsetDateTime::now_utc(), encoding_key)
}

/// Sign a token for `user_id` as if it were issued at `issued_at`.
///
/// The token expires [TOKEN_DURATION] after `issued_at`.
pub(crate) fn encode_jwt(
    user_id: UserID,
    issued_at: OffsetDateTime,
    encoding_key: &EncodingKey,
) -> Result<String, Error> {
    let claims = Claims {
        sub: user_id.as_i64(),
        iat: issued_at.unix_timestamp(),
        exp: (issued_at + TOKEN_DURATION).unix_timestamp(),
    };

    encode(&Header::default(), &claims, encoding_key).map_err(|error| {
        tracing::error!("Error signing auth token: {}", error);
        Error::TokenCreation
    })
}

/// Verify `token` and return its claims.
///
/// Malformed, expired, and tampered tokens all produce the same
/// [Error::InvalidToken].
pub(crate) fn decode_jwt(token: &str, decoding_key: &DecodingKey) -> Result<Claims, Error> {
    decode::<Claims>(token, decoding_key, &Validation::default())
        .map(|token_data| token_data.claims)
        .map_err(|_| Error::InvalidToken)
}

/// An extractor that authenticates the request's bearer token and resolves
/// the user it was issued to.
///
/// Handlers that take this extractor reject unauthenticated requests before
/// their body runs.
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::MissingToken)?;

        let state = AppState::from_ref(state);
        let claims = decode_jwt(bearer.token(), state.decoding_key())?;

        let connection = state.lock_connection()?;
        let user =
            get_user_by_id(UserID::new(claims.sub), &connection).map_err(|error| match error {
                // A token for a user that no longer resolves is treated the
                // same as a bad token.
                Error::NotFound => Error::InvalidToken,
                error => error,
            })?;

        Ok(Self(user))
    }
}

/// The email and password sent to the registration and log-in routes.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    /// Email entered by the user.
    pub email: Option<String>,
    /// Password entered by the user.
    pub password: Option<String>,
}

impl CredentialsRequest {
    /// Split the request into its email and password.
    ///
    /// # Errors
    /// Returns an [Error::MissingCredentials] if either field is absent or
    /// empty.
    fn into_parts(self) -> Result<(String, String), Error> {
        match (self.email, self.password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Ok((email, password))
            }
            _ => Err(Error::MissingCredentials),
        }
    }
}

/// The subset of [User] fields that is safe to send to the client.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    /// The user's ID.
    pub id: UserID,
    /// The user's normalized email address.
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.as_str().to_owned(),
        }
    }
}

/// The response body for successful registration and log-in requests.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// A human readable description of the outcome.
    pub message: &'static str,
    /// The signed auth token for the user.
    pub token: String,
    /// The user the token was issued to.
    pub user: UserSummary,
}

/// The response body for the identity route.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    /// The authenticated caller.
    pub user: UserSummary,
}

/// A route handler for registering a new user.
///
/// Returns the new user along with a signed auth token so the client can
/// start making authenticated requests immediately.
pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, Error> {
    let (raw_email, raw_password) = request.into_parts()?;

    let email = Email::new(&raw_email)?;
    let password_hash = PasswordHash::from_raw_password(&raw_password, PasswordHash::DEFAULT_COST)?;

    let user = {
        let connection = state.lock_connection()?;
        create_user(email, password_hash, &connection)?
    };

    let token = issue_token(user.id, state.encoding_key())?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            token,
            user: UserSummary::from(&user),
        }),
    ))
}

/// A route handler for logging in a registered user.
///
/// Responds with the same [Error::InvalidCredentials] for an unknown email
/// and a wrong password.
pub async fn log_in(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, Error> {
    let (raw_email, raw_password) = request.into_parts()?;
    let normalized_email = raw_email.trim().to_lowercase();

    let user = {
        let connection = state.lock_connection()?;
        get_user_by_email(&normalized_email, &connection).map_err(|error| match error {
            Error::NotFound => Error::InvalidCredentials,
            error => error,
        })?
    };

    let password_is_correct = user
        .password_hash
        .verify(&raw_password)
        .map_err(|error| Error::HashingError(error.to_string()))?;

    if !password_is_correct {
        return Err(Error::InvalidCredentials);
    }

    let token = issue_token(user.id, state.encoding_key())?;

    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user: UserSummary::from(&user),
    }))
}

/// A route handler that returns the authenticated caller's identity.
pub async fn get_me(AuthenticatedUser(user): AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        user: UserSummary::from(&user),
    })
}

#[cfg(test)]
mod jwt_tests {
    use jsonwebtoken::{DecodingKey, EncodingKey};
    use time::{Duration, OffsetDateTime};

    use crate::{Error, user::UserID};

    use super::{decode_jwt, encode_jwt, issue_token};

    fn test_keys() -> (EncodingKey, DecodingKey) {
        let secret = "foobar";
        (
            EncodingKey::from_secret(secret.as_ref()),
            DecodingKey::from_secret(secret.as_ref()),
        )
    }

    #[test]
    fn decode_jwt_returns_issued_user_id() {
        let (encoding_key, decoding_key) = test_keys();

        let token = issue_token(UserID::new(42), &encoding_key).unwrap();
        let claims = decode_jwt(&token, &decoding_key).unwrap();

        assert_eq!(claims.sub, 42);
    }

    #[test]
    fn decode_jwt_accepts_six_day_old_token() {
        let (encoding_key, decoding_key) = test_keys();
        let issued_at = OffsetDateTime::now_utc() - Duration::days(6);

        let token = encode_jwt(UserID::new(42), issued_at, &encoding_key).unwrap();

        assert!(decode_jwt(&token, &decoding_key).is_ok());
    }

    #[test]
    fn decode_jwt_rejects_eight_day_old_token() {
        let (encoding_key, decoding_key) = test_keys();
        let issued_at = OffsetDateTime::now_utc() - Duration::days(8);

        let token = encode_jwt(UserID::new(42), issued_at, &encoding_key).unwrap();

        assert_eq!(decode_jwt(&token, &decoding_key), Err(Error::InvalidToken));
    }

    #[test]
    fn decode_jwt_rejects_tampered_token() {
        let (encoding_key, decoding_key) = test_keys();

        let mut token = issue_token(UserID::new(42), &encoding_key).unwrap();
        token.replace_range(..4, "AAAA");

        assert_eq!(decode_jwt(&token, &decoding_key), Err(Error::InvalidToken));
    }

    #[test]
    fn decode_jwt_rejects_token_signed_with_other_secret() {
        let (encoding_key, _) = test_keys();
        let other_decoding_key = DecodingKey::from_secret("other secret".as_ref());

        let token = issue_token(UserID::new(42), &encoding_key).unwrap();

        assert_eq!(
            decode_jwt(&token, &other_decoding_key),
            Err(Error::InvalidToken)
        );
    }
}
