//! The root!
//!
//! The most important part of Snip, resolving codes to where they should go

use std::str::Utf8Error;

use axum::Extension;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::LOCATION;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use percent_encoding::percent_decode_str;
use unicode_normalization::UnicodeNormalization;

use crate::client_ip::ClientIp;
use crate::geo::CountryResolver;
use crate::resolution::Outcome;
use crate::resolution::Resolver;
use crate::storage::Storage;

/// The root!
///
/// All wildcard requests end up in this function.
///
/// The code is taken from the path, redirects are temporary so every visit is counted
pub async fn root<S: Storage>(
    ip_address: Option<ClientIp>,
    Extension(resolver): Extension<Resolver<S>>,
    Extension(countries): Extension<CountryResolver>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, (StatusCode, String)> {
    let code = uri.path().trim_matches('/');
    let code = url_decode_code(code).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "URL contains invalid UTF-8 characters".to_string(),
        )
    })?;

    let country = countries.resolve(&headers, ip_address.as_ref().map(|ip| &ip.0));

    tracing::debug!("Looking for code: /{code}");

    let outcome = resolver
        .resolve(&code, None, &country)
        .await
        .map_err(internal_error)?;

    let response = match outcome {
        Outcome::Redirect(url) | Outcome::GeoRedirect(url) => {
            let location = HeaderValue::from_str(&url).map_err(internal_error)?;

            (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response()
        }
        Outcome::PasswordRequired | Outcome::PasswordRejected => {
            Html(PASSWORD_PAGE).into_response()
        }
        Outcome::Expired => (StatusCode::GONE, "This link has expired").into_response(),
        Outcome::NotFound => (StatusCode::NOT_FOUND, "Link not found").into_response(),
    };

    Ok(response)
}

/// Utility function for mapping any error into a `500 Internal Server Error`
/// response.
fn internal_error<E>(err: E) -> (StatusCode, String)
where
    E: std::error::Error,
{
    tracing::error!("{err}");

    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// URL decode code
///
/// Uses percentage encoding for the decoding, might error in case of invalid UTF-8.
/// Normalized the same way custom aliases are.
fn url_decode_code(code: &str) -> Result<String, Utf8Error> {
    let decoded = percent_decode_str(code).decode_utf8()?;

    Ok(decoded.nfc().collect())
}

/// Password challenge, the password is posted to the unlock endpoint
///
/// The page is the same for every link, the script takes the code from its own path
const PASSWORD_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Password required</title>
</head>
<body>
<main>
<h1>This link is password protected</h1>
<form id="unlock">
<label for="password">Password</label>
<input id="password" name="password" type="password" required autofocus>
<button type="submit">Continue</button>
<p id="error" role="alert" hidden></p>
</form>
</main>
<script>
const form = document.getElementById("unlock");
// the path is still percent-encoded
const code = window.location.pathname.replace(/^\/+|\/+$/g, "");
form.addEventListener("submit", async (event) => {
    event.preventDefault();
    const error = document.getElementById("error");
    const response = await fetch(`/api/links/${code}/unlock`, {
        method: "POST",
        headers: { "Content-Type": "application/json" },
        body: JSON.stringify({ password: form.elements.password.value }),
    });
    const body = await response.json();
    if (response.ok) {
        window.location.href = body.data.url;
    } else {
        error.textContent = body.error;
        error.hidden = false;
    }
});
</script>
</body>
</html>
"#;
