//! Payment handlers
//!
//! Checkout links for card gateways, and the manual path for cash and bank
//! transfers. Verification and rejection are mounted behind the admin gate.

use axum::{extract::State, http::StatusCode, Extension, Json};
use validator::Validate;

use domain_payments::{
    CreateLinkRequest, GatewayType, ManualPaymentRequest, ManualVerification, PaymentLink,
};

use crate::auth::Claims;
use crate::dto::payments::*;
use crate::{error::ApiError, AppState};

/// Creates a hosted payment link for a quote
pub async fn create_link(
    State(state): State<AppState>,
    Json(body): Json<CreateLinkBody>,
) -> Result<(StatusCode, Json<PaymentLink>), ApiError> {
    body.validate()?;
    let request = CreateLinkRequest {
        quote_id: body.quote_id.into(),
        gateway_type: body.gateway_type.parse::<GatewayType>()?,
        payer_email: body.payer_email,
        payment_method_id: body.payment_method_id.map(Into::into),
    };

    let link = state.service.create_payment_link(request).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// Registers a cash or bank transfer payment awaiting verification
pub async fn register_manual(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ManualPaymentBody>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    body.validate()?;
    let gateway_type = body
        .gateway_type
        .as_deref()
        .map(str::parse::<GatewayType>)
        .transpose()?;

    let request = ManualPaymentRequest {
        quote_id: body.quote_id.into(),
        payment_method_id: body.payment_method_id.into(),
        gateway_type,
        payment_reference: body.payment_reference,
        registered_by: Some(claims.sub),
    };

    let transaction = state.service.register_manual_payment(request).await?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// Approves a manual payment and marks its quote paid
pub async fn verify_manual(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<VerifyManualBody>,
) -> Result<Json<TransactionResponse>, ApiError> {
    body.validate()?;
    let verification = ManualVerification {
        transaction_id: body.transaction_id,
        payment_reference: body.payment_reference,
        payment_proof: body.payment_proof,
        verified_by: claims.sub,
    };

    let transaction = state.service.verify_manual(verification).await?;
    Ok(Json(transaction.into()))
}

pub async fn reject_manual(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<RejectManualBody>,
) -> Result<Json<TransactionResponse>, ApiError> {
    body.validate()?;
    let transaction = state
        .service
        .reject_manual(&body.transaction_id, &body.reason, &claims.sub)
        .await?;
    Ok(Json(transaction.into()))
}
