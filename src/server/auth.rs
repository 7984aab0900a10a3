use crate::proto::socks5::AuthMethod;
use std::collections::HashSet;

/// Negotiates the authentication method during the handshake phase.
///
/// The server offers "no authentication required" only; everything else the
/// client may propose is left unselected, which the handshake phase turns
/// into a NO_ACCEPTABLE_METHODS reply.
pub struct MorayAuthenticator {
    available_methods: HashSet<AuthMethod>,
}

impl MorayAuthenticator {
    pub fn new() -> MorayAuthenticator {
        MorayAuthenticator {
            available_methods: HashSet::from([AuthMethod::None]),
        }
    }

    /// Find any common authentication method between available
    /// auth methods on server and supported methods by client.
    pub fn select_auth_method(&self, client_methods: &HashSet<AuthMethod>) -> Option<AuthMethod> {
        self.available_methods
            .intersection(client_methods)
            .next()
            .copied()
    }
}

impl Default for MorayAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_none_auth_method() {
        let authenticator = MorayAuthenticator::new();

        let client_methods = HashSet::from([AuthMethod::GssAPI, AuthMethod::Password, AuthMethod::None]);
        assert_eq!(Some(AuthMethod::None), authenticator.select_auth_method(&client_methods));

        let without_none = HashSet::from([AuthMethod::GssAPI, AuthMethod::Password]);
        assert_eq!(None, authenticator.select_auth_method(&without_none));
    }
}
