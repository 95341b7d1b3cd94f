use crate::types::Domain;

/// iCloud web endpoints for the "com" (international) and "cn" (China
/// mainland) domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub home: &'static str,
    pub setup: &'static str,
}

impl Endpoints {
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Com => Self {
                home: "https://www.icloud.com",
                setup: "https://setup.icloud.com/setup/ws/1",
            },
            Domain::Cn => Self {
                home: "https://www.icloud.com.cn",
                setup: "https://setup.icloud.com.cn/setup/ws/1",
            },
        }
    }

    pub fn validate_url(&self) -> String {
        format!("{}/validate", self.setup)
    }
}
