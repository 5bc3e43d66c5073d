use crate::application::repos::IdentitySource;
use crate::domain::entities::Identity;

/// Identity fixed at startup, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub fn new(identity: Option<Identity>) -> Self {
        Self(identity)
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self(Some(identity))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentitySource for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        self.0.clone()
    }
}
