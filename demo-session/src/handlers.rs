use axum::response::{Html, IntoResponse};
use http::StatusCode;
use session_lifecycle_axum::{IntoResponseError, TrustedSession};

pub(crate) async fn index(
    mut session: TrustedSession,
) -> Result<Html<String>, (StatusCode, String)> {
    let visits = session
        .get::<u64>("visits")
        .into_response_error()?
        .unwrap_or(0)
        + 1;
    session.insert("visits", visits).into_response_error()?;
    session.save().await.into_response_error()?;

    Ok(Html(format!(
        "<h1>Visit #{visits}</h1>\
         <p><a href=\"/status\">Session status</a> | <a href=\"/logout\">Log out</a></p>"
    )))
}

pub(crate) async fn status(session: TrustedSession) -> Html<String> {
    let record = &session.session().record;
    let expires = record
        .expires_at()
        .map_or_else(|| "end of browser session".to_string(), |at| at.to_rfc3339());

    Html(format!(
        "<p>Transition: {:?}</p><p>Rotating: {}</p><p>Expires: {}</p>\
         <p><a href=\"/\">Back</a></p>",
        session.transition(),
        record.is_rotating(),
        expires
    ))
}

pub(crate) async fn logout(session: TrustedSession) -> Result<impl IntoResponse, (StatusCode, String)> {
    let headers = session.destroy().await.into_response_error()?;
    Ok((headers, Html("<p>Logged out. <a href=\"/\">Start again</a></p>")))
}
