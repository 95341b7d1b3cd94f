use serde::Deserialize;

/// Response from `/validate`. Only the fields needed to reach the photos
/// database are kept.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLoginResponse {
    #[serde(default)]
    pub ds_info: Option<DsInfo>,
    #[serde(default)]
    pub webservices: Option<Webservices>,
}

impl AccountLoginResponse {
    pub fn dsid(&self) -> Option<&str> {
        self.ds_info.as_ref()?.dsid.as_deref()
    }

    pub fn ckdatabasews_url(&self) -> Option<&str> {
        self.webservices
            .as_ref()?
            .ckdatabasews
            .as_ref()
            .map(|ws| ws.url.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsInfo {
    #[serde(default)]
    pub dsid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Webservices {
    #[serde(default)]
    pub ckdatabasews: Option<WebserviceEndpoint>,
}

#[derive(Debug, Deserialize)]
pub struct WebserviceEndpoint {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_response_full() {
        let json = r#"{
            "dsInfo": {"hsaVersion": 2, "dsid": "12345"},
            "webservices": {
                "ckdatabasews": {"url": "https://p123-ckdatabasews.icloud.com:443", "status": "active"},
                "findme": {"url": "https://p123-fmipweb.icloud.com:443"}
            },
            "hsaTrustedBrowser": true
        }"#;
        let resp: AccountLoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.dsid(), Some("12345"));
        assert_eq!(
            resp.ckdatabasews_url(),
            Some("https://p123-ckdatabasews.icloud.com:443")
        );
    }

    #[test]
    fn test_validate_response_minimal() {
        let resp: AccountLoginResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.dsid().is_none());
        assert!(resp.ckdatabasews_url().is_none());
    }

    #[test]
    fn test_webservices_without_photos() {
        let json = r#"{"dsInfo": {}, "webservices": {}}"#;
        let resp: AccountLoginResponse = serde_json::from_str(json).unwrap();
        assert!(resp.dsid().is_none());
        assert!(resp.ckdatabasews_url().is_none());
    }
}
