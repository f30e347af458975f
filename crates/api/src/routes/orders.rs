//! Order routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marketplace_core::{OrderId, OrderStatus, PaymentMethod};

use crate::db::Page;
use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Order, OrderLine, OrderWithItems};
use crate::services::orders::OrderService;
use crate::services::push::PushError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all).post(place))
        .route("/mine", get(mine))
        .route("/{id}", get(show))
        .route("/{id}/pay", put(pay))
        .route("/{id}/status", put(update_status))
}

/// Checkout request.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub order_items: Vec<OrderLine>,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// One page of orders.
#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderWithItems>,
    pub page: i64,
    pub pages: i64,
    pub total: i64,
}

/// POST /api/orders
async fn place(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let order = OrderService::new(state.pool())
        .place(user, body.order_items, &body.shipping_address, body.payment_method)
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders/mine
async fn mine(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderWithItems>>> {
    Ok(Json(OrderService::new(state.pool()).list_mine(user).await?))
}

/// GET /api/orders/{id}
async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderWithItems>> {
    Ok(Json(OrderService::new(state.pool()).get_for(user, id).await?))
}

/// PUT /api/orders/{id}/pay
async fn pay(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(OrderService::new(state.pool()).pay(user, id).await?))
}

/// GET /api/orders
async fn list_all(
    RequireAdmin(_): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderPage>> {
    let page = Page::new(query.page, query.limit);
    let (orders, total) = OrderService::new(state.pool())
        .list_all(query.status, page)
        .await?;

    Ok(Json(OrderPage {
        orders,
        page: page.number,
        pages: page.page_count(total),
        total,
    }))
}

/// PUT /api/orders/{id}/status
///
/// The owner is notified in the background; the response never waits on
/// push delivery.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn update_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.pool())
        .update_status(id, body.status)
        .await?;

    notify_owner(&state, &order);
    Ok(Json(order))
}

fn notify_owner(state: &AppState, order: &Order) {
    if !state.push().is_enabled() {
        return;
    }

    let state = state.clone();
    let user_id = order.user_id;
    let order_id = order.id;
    let title = format!("Order #{order_id} update");
    let body = format!("Your order is now {}.", order.status.label());
    let url = format!("/orders/{order_id}");

    tokio::spawn(async move {
        match state
            .push()
            .notify_user(state.pool(), user_id, &title, &body, Some(&url))
            .await
        {
            Ok(report) => tracing::debug!(%order_id, sent = report.sent, "Order update pushed"),
            Err(PushError::Disabled) => {}
            Err(e) => tracing::warn!(%order_id, error = %e, "Order update push failed"),
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_place_request_defaults() {
        let body: PlaceOrderRequest = serde_json::from_str("{}").unwrap();
        assert!(body.order_items.is_empty());
        assert_eq!(body.payment_method, PaymentMethod::CashOnDelivery);

        let body: PlaceOrderRequest = serde_json::from_str(
            r#"{"order_items":[{"product_id":3,"quantity":2}],"shipping_address":"1 Main St","payment_method":"card"}"#,
        )
        .unwrap();
        assert_eq!(body.order_items.len(), 1);
        assert_eq!(body.payment_method, PaymentMethod::Card);
    }
}
