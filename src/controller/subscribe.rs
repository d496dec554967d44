use actix_web::{get, post, web, HttpRequest, HttpResponse, Result};
use serde::Serialize;

use crate::{
    configuration::{AppState, State},
    error::Error,
    helpers::caller_identity,
    types::SubscribeRequest,
};

#[get("/public-key")]
pub async fn public_key(
    state: web::Data<AppState<State>>,
) -> Result<HttpResponse, Error> {
    let key = state
        .push
        .as_ref()
        .map(|client| client.public_key().to_owned())
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(PublicKeyResponse { public_key: key }))
}

#[post("/subscribe")]
pub async fn subscribe(
    state: web::Data<AppState<State>>,
    body: web::Json<SubscribeRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let caller = caller_identity(&req)?;
    body.validate()?;

    let subscription = state
        .database
        .subscription
        .register(
            caller.id,
            body.endpoint.to_owned(),
            body.keys.p256dh.to_owned(),
            body.keys.auth.to_owned(),
        )
        .await?;

    Ok(HttpResponse::Created().json(SubscribeResponse {
        subscription_id: subscription.id,
    }))
}

#[post("/unsubscribe")]
pub async fn unsubscribe(
    state: web::Data<AppState<State>>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let caller = caller_identity(&req)?;

    let deleted = state
        .database
        .subscription
        .unregister_all(caller.id)
        .await?;

    Ok(HttpResponse::Ok().json(UnsubscribeResponse {
        deleted_subscriptions: deleted,
    }))
}

#[get("/status")]
pub async fn status(
    state: web::Data<AppState<State>>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let caller = caller_identity(&req)?;

    let count = state
        .database
        .subscription
        .count_active(caller.id)
        .await?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        is_subscribed: count > 0,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub subscription_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeResponse {
    pub deleted_subscriptions: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_subscribed: bool,
}
