use async_trait::async_trait;

/// Identity the authentication collaborator resolves a credential to.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub role: String,
}

/// Session issuance lives elsewhere; this subsystem only hands the opaque
/// credential over at connect time and gets back a profile or nothing.
/// The token is never interpreted or refreshed here.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str, user_id: &str) -> Option<UserProfile>;
}

/// Development authenticator: any non-empty credential is accepted and the
/// display name defaults to the user id.
pub struct AcceptAll;

#[async_trait]
impl Authenticator for AcceptAll {
    async fn authenticate(&self, credential: &str, user_id: &str) -> Option<UserProfile> {
        if credential.is_empty() || user_id.is_empty() {
            return None;
        }
        Some(UserProfile {
            id: user_id.to_string(),
            name: user_id.to_string(),
            role: "member".to_string(),
        })
    }
}
