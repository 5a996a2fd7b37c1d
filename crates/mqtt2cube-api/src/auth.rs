// Access token endpoint
//
// The hub only hands out a token while its "allow third-party access"
// window is open; outside it the envelope carries 400/401.

use secrecy::SecretString;
use tracing::debug;

use crate::client::HubClient;
use crate::error::Error;
use crate::models::AccessToken;

impl HubClient {
    /// Request an access token for `app_name`.
    ///
    /// `GET /bridge/access_token?app_name=...` (sent without a bearer token).
    pub async fn request_access_token(&self, app_name: &str) -> Result<SecretString, Error> {
        let mut url = self.api_url("bridge/access_token")?;
        url.query_pairs_mut().append_pair("app_name", app_name);
        debug!(app_name, "requesting access token");

        let data: Option<AccessToken> = self.get(url, None).await?;
        data.map(|t| SecretString::from(t.token))
            .ok_or_else(|| Error::Deserialization {
                message: "access token response carried no data".into(),
                body: String::new(),
            })
    }
}
