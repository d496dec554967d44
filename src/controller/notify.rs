use std::collections::HashMap;

use actix_web::{post, web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;

use crate::{
    configuration::{AppState, State},
    error::Error,
    helpers::require_operator,
    push,
    types::NotificationPayload,
};

#[post("/send-to-user")]
pub async fn send_to_user(
    state: web::Data<AppState<State>>,
    body: web::Json<SendToUserRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    require_operator(&req)?;

    let payload = NotificationPayload::new(
        body.title.to_owned(),
        body.message.to_owned(),
        body.data.clone(),
    )?;

    // an unknown or unsubscribed user yields an empty result, never 404
    let result =
        push::send_to_subscriber(state.get_ref(), &body.user_id, &payload)
            .await?;

    Ok(HttpResponse::Ok().json(result))
}

#[post("/send-to-all")]
pub async fn send_to_all(
    state: web::Data<AppState<State>>,
    body: web::Json<SendToAllRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    require_operator(&req)?;

    let payload = NotificationPayload::new(
        body.title.to_owned(),
        body.message.to_owned(),
        body.data.clone(),
    )?;

    let result = push::send_to_all(state.get_ref(), &payload).await?;

    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
pub struct SendToUserRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SendToAllRequest {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}
