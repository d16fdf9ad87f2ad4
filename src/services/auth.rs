// src/services/auth.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserStore,
    models::auth::{Claims, User},
};

/// Colaborador externo: transforma um token de sessão num usuário.
/// `Ok(None)` significa "sem sessão válida"; `Err` só para falhas de infraestrutura.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_session(&self, token: &str) -> Result<Option<User>, AppError>;
}

// Sessões em JWT assinado (HS256) com o ID do usuário em "sub"
#[derive(Clone)]
pub struct JwtIdentityResolver {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
}

impl JwtIdentityResolver {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: String) -> Self {
        Self { users, jwt_secret }
    }

    /// Emite um token para o usuário. O login em si fica fora deste núcleo;
    /// isto serve ao comando `issue-token` e aos testes.
    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(7);

        let claims = Claims {
            sub: user_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve_session(&self, token: &str) -> Result<Option<User>, AppError> {
        // Token inválido ou expirado = sessão ausente, não é erro
        let token_data = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        ) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("Token rejeitado: {}", e);
                return Ok(None);
            }
        };

        self.users.find_user(token_data.claims.sub).await
    }
}
