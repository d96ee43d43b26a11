//! Catalog handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use core_kernel::PaymentMethodId;
use domain_payments::{BankTransferInstructions, GatewayType, PublicGateway};

use crate::auth::Claims;

use crate::dto::payments::*;
use crate::{error::ApiError, AppState};

pub async fn list_payment_methods(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentMethodResponse>>, ApiError> {
    let methods = state.service.list_payment_methods().await?;
    Ok(Json(methods.into_iter().map(Into::into).collect()))
}

/// Administrator only
pub async fn create_payment_method(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreatePaymentMethodBody>,
) -> Result<(StatusCode, Json<PaymentMethodResponse>), ApiError> {
    body.validate()?;

    let method = state.service.create_payment_method(body.into()).await?;
    info!(method_id = %method.id, user = %claims.sub, "Payment method created via API");
    Ok((StatusCode::CREATED, Json(method.into())))
}

/// Administrator only
pub async fn update_payment_method(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(method_id): Path<Uuid>,
    Json(body): Json<UpdatePaymentMethodBody>,
) -> Result<Json<PaymentMethodResponse>, ApiError> {
    body.validate()?;

    let method = state
        .service
        .update_payment_method(PaymentMethodId::from_uuid(method_id), body.into())
        .await?;
    info!(method_id = %method.id, user = %claims.sub, "Payment method updated via API");
    Ok(Json(method.into()))
}

/// Soft delete; answers with the deactivated method
pub async fn deactivate_payment_method(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(method_id): Path<Uuid>,
) -> Result<Json<PaymentMethodResponse>, ApiError> {
    let method = state
        .service
        .deactivate_payment_method(PaymentMethodId::from_uuid(method_id))
        .await?;
    info!(method_id = %method.id, user = %claims.sub, "Payment method deactivated via API");
    Ok(Json(method.into()))
}

/// Active gateways, credentials stripped
pub async fn list_gateways(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
) -> Result<Json<Vec<PublicGateway>>, ApiError> {
    let gateway_type = query
        .gateway_type
        .as_deref()
        .map(str::parse::<GatewayType>)
        .transpose()?;

    Ok(Json(state.service.list_gateways(gateway_type).await?))
}

pub async fn bank_transfer_instructions(
    State(state): State<AppState>,
) -> Result<Json<BankTransferInstructions>, ApiError> {
    Ok(Json(state.service.bank_transfer_instructions().await?))
}
