use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

// Short timeout for API calls and photo fetches, long timeout for
// multipart image uploads.
static SHORT_TIMEOUT_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client")
});

static LONG_TIMEOUT_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client")
});

pub fn get_http_client() -> &'static Client {
    &SHORT_TIMEOUT_CLIENT
}

pub fn get_upload_client() -> &'static Client {
    &LONG_TIMEOUT_CLIENT
}
