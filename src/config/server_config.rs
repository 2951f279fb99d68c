use std::env;

const DEFAULT_PORT: &str = "3000";

/// Bind address for the websocket listener, taken from `PORT`.
pub fn server_addr() -> String {
    let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    format!("0.0.0.0:{}", port)
}
