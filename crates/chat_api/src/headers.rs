use std::collections::BTreeMap;

use crate::config::ChatApiConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";

const EVENT_STREAM: &str = "text/event-stream";
const JSON: &str = "application/json";

/// Headers for one streaming completion request, keyed by lowercase name.
///
/// `user_agent` wins over the configured agent; blank values fall through to
/// [`default_user_agent`]. Extra headers from the config are applied last and may
/// override anything above.
pub fn build_headers(config: &ChatApiConfig, user_agent: Option<&str>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        (HEADER_ACCEPT.to_owned(), EVENT_STREAM.to_owned()),
        (HEADER_CONTENT_TYPE.to_owned(), JSON.to_owned()),
    ]);

    if let Some(key) = non_blank(config.api_key.as_deref()) {
        headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {key}"));
    }

    let agent = non_blank(user_agent)
        .or_else(|| non_blank(config.user_agent.as_deref()))
        .map_or_else(default_user_agent, str::to_owned);
    headers.insert(HEADER_USER_AGENT.to_owned(), agent);

    headers.extend(
        config
            .extra_headers
            .iter()
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_owned())),
    );
    headers
}

pub fn default_user_agent() -> String {
    format!(
        "code-atlas/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
