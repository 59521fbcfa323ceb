use std::time::Duration;

use reqwest::{Client, Error, redirect};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

pub struct HttpClient;

impl HttpClient {
    pub fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    /// Client for page and feed fetches. Follows redirects.
    pub fn new(timeout_secs: u64) -> Result<Client, Error> {
        Client::builder()
            .user_agent(Self::default_user_agent())
            .timeout(Duration::from_secs(timeout_secs))
            .build()
    }

    /// Client for shorts probes. Redirects are the signal, so they are never
    /// followed.
    pub fn new_probe(timeout_secs: u64) -> Result<Client, Error> {
        Client::builder()
            .user_agent(Self::default_user_agent())
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(redirect::Policy::none())
            .build()
    }
}
