//! Two-phase order placement: preview, then place with the preview id.
//!
//! Both requests carry the same client order id. A failed preview has not
//! created anything and may be retried with a fresh id; a failed place may
//! have been partly processed and must only be retried with the same id,
//! which the backend uses to deduplicate.

use log::{debug, info, warn};
use serde::Serialize;
use tradegate::{ClientOrderId, OrderIntent};

use super::ETradeBroker;
use super::client::parse_json;
use super::types::PreviewEnvelope;
use crate::error::BrokerError;
use crate::types::OrderResult;

/// Top-level request body. Serializes as `{"PreviewOrderRequest": {...}}`
/// or `{"PlaceOrderRequest": {...}}`.
#[derive(Debug, Serialize)]
enum OrderEnvelope<'a> {
    PreviewOrderRequest(OrderRequest<'a>),
    PlaceOrderRequest(OrderRequest<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    order_type: &'static str,
    client_order_id: &'a str,
    #[serde(rename = "PreviewIds", skip_serializing_if = "Option::is_none")]
    preview_ids: Option<[PreviewIdRef; 1]>,
    #[serde(rename = "Order")]
    order: [OrderDetail<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewIdRef {
    preview_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail<'a> {
    all_or_none: &'static str,
    price_type: &'static str,
    order_term: &'static str,
    market_session: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_price: Option<f64>,
    #[serde(rename = "Instrument")]
    instrument: [Instrument<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Instrument<'a> {
    #[serde(rename = "Product")]
    product: Product<'a>,
    order_action: &'static str,
    quantity_type: &'static str,
    quantity: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Product<'a> {
    security_type: &'static str,
    symbol: &'a str,
}

fn order_request<'a>(
    intent: &'a OrderIntent,
    client_order_id: &'a ClientOrderId,
    preview_id: Option<u64>,
) -> OrderRequest<'a> {
    // Prices only where the price type uses them
    let limit_price = intent
        .price_type
        .needs_limit_price()
        .then_some(intent.limit_price)
        .flatten()
        .map(|p| p.as_dollars());
    let stop_price = intent
        .price_type
        .needs_stop_price()
        .then_some(intent.stop_price)
        .flatten()
        .map(|p| p.as_dollars());

    OrderRequest {
        order_type: "EQ",
        client_order_id: client_order_id.as_str(),
        preview_ids: preview_id.map(|preview_id| [PreviewIdRef { preview_id }]),
        order: [OrderDetail {
            all_or_none: "false",
            price_type: intent.price_type.as_str(),
            order_term: intent.term.as_str(),
            market_session: intent.market_session.as_str(),
            limit_price,
            stop_price,
            instrument: [Instrument {
                product: Product {
                    security_type: "EQ",
                    symbol: intent.symbol.as_str(),
                },
                order_action: intent.action().as_str(),
                quantity_type: "QUANTITY",
                quantity: intent.shares(),
            }],
        }],
    }
}

/// JSON body for the preview request.
pub fn preview_payload(
    intent: &OrderIntent,
    client_order_id: &ClientOrderId,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OrderEnvelope::PreviewOrderRequest(order_request(
        intent,
        client_order_id,
        None,
    )))
}

/// JSON body for the place request.
pub fn place_payload(
    intent: &OrderIntent,
    client_order_id: &ClientOrderId,
    preview_id: u64,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OrderEnvelope::PlaceOrderRequest(order_request(
        intent,
        client_order_id,
        Some(preview_id),
    )))
}

/// An order that passed preview and can be placed.
#[derive(Debug, Clone)]
pub struct PreviewedOrder {
    pub intent: OrderIntent,
    pub client_order_id: ClientOrderId,
    pub preview_id: u64,
    /// The backend's preview response (estimated cost, commission, ...).
    pub preview: serde_json::Value,
}

impl ETradeBroker {
    /// Phase one: validate and preview. Nothing is placed.
    pub fn preview(
        &self,
        intent: &OrderIntent,
        client_order_id: Option<ClientOrderId>,
    ) -> Result<PreviewedOrder, BrokerError> {
        let (creds, account) = self.ready()?;
        intent.validate()?;
        let client_order_id = client_order_id.unwrap_or_else(ClientOrderId::generate);

        let failed = |reason: String| BrokerError::OrderPreviewFailed {
            client_order_id: client_order_id.clone(),
            reason,
        };

        let body = preview_payload(intent, &client_order_id).map_err(|e| failed(e.to_string()))?;
        debug!("previewing {intent} as {client_order_id}");
        let path = format!("/v1/accounts/{}/orders/preview.json", account.account_key);
        let preview: serde_json::Value =
            parse_json(self.client.post_json(creds, &path, body)).map_err(|e| failed(e.to_string()))?;

        let preview_id = serde_json::from_value::<PreviewEnvelope>(preview.clone())
            .ok()
            .and_then(|env| env.response.preview_ids.first().map(|p| p.preview_id))
            .ok_or_else(|| failed("preview response carries no preview id".into()))?;

        Ok(PreviewedOrder {
            intent: intent.clone(),
            client_order_id,
            preview_id,
            preview,
        })
    }

    /// Phase two: place a previewed order. Safe to call again with the same
    /// `PreviewedOrder` after an [`BrokerError::OrderPlacementFailed`].
    pub fn confirm(&self, order: &PreviewedOrder) -> Result<OrderResult, BrokerError> {
        let (creds, account) = self.ready()?;
        let failed = |reason: String| BrokerError::OrderPlacementFailed {
            client_order_id: order.client_order_id.clone(),
            preview_id: Some(order.preview_id),
            reason,
        };

        let body = place_payload(&order.intent, &order.client_order_id, order.preview_id)
            .map_err(|e| failed(e.to_string()))?;
        let path = format!("/v1/accounts/{}/orders/place.json", account.account_key);
        let confirmation: serde_json::Value =
            parse_json(self.client.post_json(creds, &path, body)).map_err(|e| {
                warn!(
                    "placement of {} (preview {}) failed; retry only with client order id {}",
                    order.intent, order.preview_id, order.client_order_id
                );
                failed(e.to_string())
            })?;

        info!(
            "placed {} (client order id {}, preview {})",
            order.intent, order.client_order_id, order.preview_id
        );
        Ok(OrderResult {
            client_order_id: order.client_order_id.clone(),
            preview_id: order.preview_id,
            confirmation,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tradegate::{OrderTerm, Price, PriceType, Symbol};

    use super::*;

    fn id() -> ClientOrderId {
        ClientOrderId::new("abc123").unwrap()
    }

    fn parse(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn market_preview_payload() {
        let intent = OrderIntent::market(Symbol::new("AAPL"), -5);
        let body = parse(&preview_payload(&intent, &id()).unwrap());
        assert_eq!(
            body,
            json!({
                "PreviewOrderRequest": {
                    "orderType": "EQ",
                    "clientOrderId": "abc123",
                    "Order": [{
                        "allOrNone": "false",
                        "priceType": "MARKET",
                        "orderTerm": "GOOD_FOR_DAY",
                        "marketSession": "REGULAR",
                        "Instrument": [{
                            "Product": { "securityType": "EQ", "symbol": "AAPL" },
                            "orderAction": "SELL",
                            "quantityType": "QUANTITY",
                            "quantity": 5
                        }]
                    }]
                }
            })
        );
    }

    #[test]
    fn limit_price_on_both_requests() {
        let intent = OrderIntent::limit(Symbol::new("MSFT"), 10, Price(410_25))
            .with_term(OrderTerm::GoodUntilCancel);

        let preview = parse(&preview_payload(&intent, &id()).unwrap());
        let order = &preview["PreviewOrderRequest"]["Order"][0];
        assert_eq!(order["limitPrice"], json!(410.25));
        assert_eq!(order["orderTerm"], "GOOD_UNTIL_CANCEL");
        assert!(order.get("stopPrice").is_none());

        let place = parse(&place_payload(&intent, &id(), 987).unwrap());
        let req = &place["PlaceOrderRequest"];
        assert_eq!(req["clientOrderId"], "abc123");
        assert_eq!(req["PreviewIds"], json!([{ "previewId": 987 }]));
        assert_eq!(req["Order"][0]["limitPrice"], json!(410.25));
        assert_eq!(req["Order"][0]["Instrument"][0]["orderAction"], "BUY");
    }

    #[test]
    fn stop_limit_carries_both_prices() {
        let mut intent = OrderIntent::limit(Symbol::new("SPY"), -1, Price(500_00));
        intent.price_type = PriceType::StopLimit;
        intent.stop_price = Some(Price(501_00));
        let body = parse(&preview_payload(&intent, &id()).unwrap());
        let order = &body["PreviewOrderRequest"]["Order"][0];
        assert_eq!(order["limitPrice"], json!(500.0));
        assert_eq!(order["stopPrice"], json!(501.0));
    }

    #[test]
    fn preview_payload_has_no_preview_ids() {
        let intent = OrderIntent::market(Symbol::new("AAPL"), 1);
        let body = parse(&preview_payload(&intent, &id()).unwrap());
        assert!(body["PreviewOrderRequest"].get("PreviewIds").is_none());
    }
}
