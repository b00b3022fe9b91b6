use {
    crate::domain::{
        cart::{DeliveryAddress, ValidatedCart},
        error::EngineError,
        gateway::{
            CallbackSource, CreatedIntent, GatewayCallback, GatewayCredentials, GatewayFuture,
            GatewayRefundReceipt, GatewayRefundRequest, GatewayRefundStatus, IntentRequest,
            PaymentGateway, PaymobCredentials,
        },
        money::MoneyAmount,
        payment::{GatewayKind, Payment, PaymentLookup, PaymentOutcome},
    },
    chrono::Utc,
    hmac::{Hmac, Mac},
    serde::Deserialize,
    serde_json::{Value, json},
    sha2::Sha512,
    std::time::Duration,
};

pub const DEFAULT_BASE_URL: &str = "https://uae.paymob.com";

const MAX_ITEM_NAME_LEN: usize = 50;

/// Transaction fields covered by Paymob's HMAC, in signing order. The
/// second element is the path inside a webhook `obj`.
const HMAC_FIELDS: [(&str, &str); 20] = [
    ("amount_cents", "amount_cents"),
    ("created_at", "created_at"),
    ("currency", "currency"),
    ("error_occured", "error_occured"),
    ("has_parent_transaction", "has_parent_transaction"),
    ("id", "id"),
    ("integration_id", "integration_id"),
    ("is_3d_secure", "is_3d_secure"),
    ("is_auth", "is_auth"),
    ("is_capture", "is_capture"),
    ("is_refunded", "is_refunded"),
    ("is_standalone_payment", "is_standalone_payment"),
    ("is_voided", "is_voided"),
    ("order", "order.id"),
    ("owner", "owner"),
    ("pending", "pending"),
    ("source_data.pan", "source_data.pan"),
    ("source_data.sub_type", "source_data.sub_type"),
    ("source_data.type", "source_data.type"),
    ("success", "success"),
];

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
struct IntentionResponse {
    id: Value,
    client_secret: Option<String>,
    special_reference: Option<String>,
    redirect_url: Option<String>,
}

/// Paymob Intention API over `reqwest`.
#[derive(Clone)]
pub struct PaymobGateway {
    http: reqwest::Client,
    base_url: String,
}

impl PaymobGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| EngineError::Gateway(format!("paymob client: {e}")))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn auth_token(&self, credentials: &PaymobCredentials) -> Result<String, EngineError> {
        let response: AuthResponse = self
            .post_json(
                "/api/auth/tokens",
                None,
                &json!({ "api_key": credentials.api_key }),
            )
            .await?;
        Ok(response.token)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<T, EngineError> {
        let mut request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Gateway(format!("paymob {path}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Gateway(format!(
                "paymob {path} returned {status}: {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Gateway(format!("paymob {path} response: {e}")))
    }

    async fn create_intention(
        &self,
        credentials: &PaymobCredentials,
        request: &IntentRequest,
    ) -> Result<CreatedIntent, EngineError> {
        let token = self.auth_token(credentials).await?;
        let cart = &request.cart;
        let integration_id: i64 = credentials.integration_id.trim().parse().map_err(|_| {
            EngineError::validation("Paymob integration ID must be numeric")
        })?;

        let body = json!({
            "amount": MoneyAmount::from_major(cart.total_amount, cart.currency)?.minor(),
            "currency": cart.currency.as_str(),
            "payment_methods": [integration_id],
            "items": intention_items(cart)?,
            "billing_data": billing_data(cart),
            "shipping_data": billing_data(cart),
            "special_reference": format!(
                "order-{}-{}-{}",
                cart.restaurant_id,
                cart.guest_id,
                Utc::now().timestamp_millis()
            ),
            "redirection_url": request.redirect_url,
            "notification_url": request.webhook_url,
        });

        let intention: IntentionResponse = self.post_json("/v1/intention/", Some(&token), &body).await?;
        let session_id = scalar(&intention.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::Gateway("Failed to create Paymob payment intention".into()))?;

        let redirect_url = match (&intention.client_secret, credentials.public_key.is_empty()) {
            (Some(secret), false) => format!(
                "{}/unifiedcheckout/?publicKey={}&clientSecret={secret}",
                self.base_url, credentials.public_key
            ),
            _ => intention.redirect_url.clone().ok_or_else(|| {
                EngineError::Gateway("paymob intention has no checkout url".into())
            })?,
        };

        Ok(CreatedIntent {
            session_id,
            redirect_url,
            special_reference: intention.special_reference,
        })
    }
}

impl PaymentGateway for PaymobGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paymob
    }

    fn create_intent<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a IntentRequest,
    ) -> GatewayFuture<'a, CreatedIntent> {
        Box::pin(async move { self.create_intention(credentials.paymob()?, request).await })
    }

    fn locate(&self, callback: &GatewayCallback) -> Result<Vec<PaymentLookup>, EngineError> {
        let (transaction, reference) = match callback.source {
            CallbackSource::Redirect => (
                callback.query.get("id").cloned(),
                callback.query.get("merchant_order_id").cloned(),
            ),
            CallbackSource::Webhook => {
                let event: Value = serde_json::from_str(&callback.body)?;
                let obj = &event["obj"];
                let reference = scalar(&obj["merchant_order_id"])
                    .or_else(|| scalar(&obj["order"]["merchant_order_id"]));
                (scalar(&obj["id"]), reference)
            }
        };

        let lookups: Vec<PaymentLookup> = transaction
            .filter(|id| !id.is_empty())
            .map(PaymentLookup::Transaction)
            .into_iter()
            .chain(
                reference
                    .filter(|r| !r.is_empty())
                    .map(PaymentLookup::Reference),
            )
            .collect();

        if lookups.is_empty() {
            return Err(EngineError::validation(
                "paymob callback carries neither transaction id nor merchant_order_id",
            ));
        }
        Ok(lookups)
    }

    fn verify<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        callback: &'a GatewayCallback,
        payment: &'a Payment,
    ) -> GatewayFuture<'a, PaymentOutcome> {
        Box::pin(async move {
            let credentials = credentials.paymob()?;
            let signature = callback
                .signature
                .as_deref()
                .ok_or_else(|| EngineError::WebhookSignature("missing hmac".into()))?;

            let fields = match callback.source {
                CallbackSource::Redirect => TransactionFields::from_query(callback),
                CallbackSource::Webhook => {
                    let event: Value = serde_json::from_str(&callback.body)?;
                    if event["type"].as_str().is_some_and(|t| t != "TRANSACTION") {
                        return Ok(PaymentOutcome::Pending);
                    }
                    TransactionFields::from_object(&event["obj"])
                }
            };

            verify_hmac(&credentials.hmac_secret, &fields.signing_string(), signature)?;
            fields.outcome(payment)
        })
    }

    fn refund<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a GatewayRefundRequest,
    ) -> GatewayFuture<'a, GatewayRefundReceipt> {
        Box::pin(async move {
            let credentials = credentials.paymob()?;
            let body = json!({
                "transaction_id": request.transaction_id,
                "amount_cents": request.amount.amount().minor(),
            });
            let response: Value = self
                .post_json(
                    "/api/acceptance/void_refund/refund",
                    Some(&credentials.secret_key),
                    &body,
                )
                .await?;

            let gateway_refund_id = scalar(&response["id"])
                .ok_or_else(|| EngineError::Gateway("paymob refund response has no id".into()))?;
            let status = match (response["success"].as_bool(), response["pending"].as_bool()) {
                (Some(true), Some(false)) => GatewayRefundStatus::Succeeded,
                (Some(false), _) => GatewayRefundStatus::Declined(
                    scalar(&response["data"]["message"])
                        .unwrap_or_else(|| "refund declined by paymob".to_string()),
                ),
                _ => GatewayRefundStatus::Pending,
            };

            Ok(GatewayRefundReceipt {
                gateway_refund_id,
                status,
            })
        })
    }
}

/// Transaction fields as Paymob signs them.
struct TransactionFields {
    values: Vec<(&'static str, String)>,
    message: Option<String>,
}

impl TransactionFields {
    fn from_query(callback: &GatewayCallback) -> Self {
        let values = HMAC_FIELDS
            .iter()
            .map(|(key, _)| (*key, callback.query.get(*key).cloned().unwrap_or_default()))
            .collect();
        Self {
            values,
            message: callback.query.get("data.message").cloned(),
        }
    }

    fn from_object(obj: &Value) -> Self {
        let values = HMAC_FIELDS
            .iter()
            .map(|(key, path)| {
                let value = path.split('.').fold(obj, |node, part| &node[part]);
                (*key, scalar(value).unwrap_or_default())
            })
            .collect();
        Self {
            values,
            message: scalar(&obj["data"]["message"]),
        }
    }

    fn get(&self, key: &str) -> &str {
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    fn signing_string(&self) -> String {
        self.values.iter().map(|(_, v)| v.as_str()).collect()
    }

    fn outcome(&self, payment: &Payment) -> Result<PaymentOutcome, EngineError> {
        let transaction_id = Some(self.get("id").to_string()).filter(|id| !id.is_empty());
        match (self.get("success"), self.get("pending")) {
            ("true", "false") => {
                let expected = MoneyAmount::from_major(payment.amount, payment.currency)?;
                let paid = self.get("amount_cents");
                if paid != expected.minor().to_string() {
                    return Err(EngineError::Conflict(format!(
                        "paymob amount {paid} does not match payment {} amount {expected}",
                        payment.id
                    )));
                }
                Ok(PaymentOutcome::Succeeded { transaction_id })
            }
            ("false", _) => Ok(PaymentOutcome::Failed {
                transaction_id,
                reason: self
                    .message
                    .clone()
                    .unwrap_or_else(|| "payment declined".to_string()),
            }),
            _ => Ok(PaymentOutcome::Pending),
        }
    }
}

/// Hex HMAC-SHA512, compared in constant time.
pub fn verify_hmac(secret: &str, message: &str, signature: &str) -> Result<(), EngineError> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| EngineError::WebhookSignature("hmac is not hex".into()))?;
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| EngineError::Crypto(e.to_string()))?;
    mac.update(message.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| EngineError::WebhookSignature("Invalid HMAC signature".into()))
}

pub fn sign_hmac(secret: &str, message: &str) -> Result<String, EngineError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| EngineError::Crypto(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Paymob rejects item names with markup or over 50 chars.
pub fn sanitize_name(raw: &str) -> String {
    let mut clean = raw
        .replace("&amp;", "and")
        .replace("&#39;", "")
        .replace("&apos;", "")
        .replace("&quot;", "``")
        .replace("&lt;", " less ")
        .replace("&gt;", " greater ");
    clean = strip_numeric_entities(&clean)
        .replace('&', "and")
        .replace('\'', "")
        .replace('"', "``")
        .replace('<', " less ")
        .replace('>', " greater ");

    let collapsed = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ITEM_NAME_LEN {
        let head: String = collapsed.chars().take(MAX_ITEM_NAME_LEN - 3).collect();
        format!("{head}...")
    } else {
        collapsed
    }
}

fn strip_numeric_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("&#") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let digits = tail.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 && tail[digits..].starts_with(';') {
            rest = &tail[digits + 1..];
        } else {
            out.push_str("&#");
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

fn intention_items(cart: &ValidatedCart) -> Result<Vec<Value>, EngineError> {
    let mut items = Vec::with_capacity(cart.line_items.len() + cart.add_ons_line_items.len());
    for line in &cart.line_items {
        items.push(json!({
            "name": sanitize_name(&line.product_name),
            "amount": MoneyAmount::from_major(line.item_subtotal, cart.currency)?.minor(),
            "description": format!("Quantity: {}", line.quantity),
            "quantity": line.quantity,
        }));
    }
    for add_on in &cart.add_ons_line_items {
        items.push(json!({
            "name": sanitize_name(&add_on.name),
            "amount": MoneyAmount::from_major(add_on.price, cart.currency)?.minor(),
            "description": "Common Add-On",
            "quantity": add_on.quantity,
        }));
    }
    Ok(items)
}

fn billing_data(cart: &ValidatedCart) -> Value {
    let placeholder_email = format!("guest_{}@dineos.com", cart.guest_id);
    match &cart.delivery_address {
        Some(DeliveryAddress {
            name, phone, email, ..
        }) => {
            let mut names = name.split_whitespace();
            let first = names.next().unwrap_or("Guest").to_string();
            let last = names.collect::<Vec<_>>().join(" ");
            let phone = if phone.number.trim().is_empty() {
                "0000000000".to_string()
            } else {
                phone.display()
            };
            json!({
                "first_name": first,
                "last_name": if last.is_empty() { "Customer".to_string() } else { last },
                "email": email.clone().filter(|e| !e.trim().is_empty()).unwrap_or(placeholder_email),
                "phone_number": phone,
                "country": "AE",
            })
        }
        None => json!({
            "first_name": "Guest",
            "last_name": "Customer",
            "email": placeholder_email,
            "phone_number": "0000000000",
            "country": "AE",
        }),
    }
}

/// JSON scalar as Paymob stringifies it for signing.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_markup_and_length() {
        assert_eq!(sanitize_name("Fish &amp; Chips"), "Fish and Chips");
        assert_eq!(sanitize_name("Mac & Cheese"), "Mac and Cheese");
        assert_eq!(sanitize_name("Chef's   \"Special\""), "Chefs ``Special``");
        assert_eq!(sanitize_name("a<b"), "a less b");
        assert_eq!(sanitize_name("Caf&#233; Latte"), "Caf Latte");

        let long = sanitize_name(&"x".repeat(80));
        assert_eq!(long.chars().count(), MAX_ITEM_NAME_LEN);
        assert!(long.ends_with("..."));
    }

    #[test]
    fn hmac_roundtrip_and_tamper() {
        let sig = sign_hmac("secret", "100true").unwrap();
        assert!(verify_hmac("secret", "100true", &sig).is_ok());
        assert!(matches!(
            verify_hmac("secret", "999true", &sig),
            Err(EngineError::WebhookSignature(_))
        ));
        assert!(matches!(
            verify_hmac("secret", "100true", "not-hex"),
            Err(EngineError::WebhookSignature(_))
        ));
    }

    #[test]
    fn webhook_fields_follow_signing_order() {
        let obj = json!({
            "amount_cents": 3000, "created_at": "2024-01-01T00:00:00", "currency": "AED",
            "error_occured": false, "has_parent_transaction": false, "id": 77,
            "integration_id": 5, "is_3d_secure": true, "is_auth": false, "is_capture": false,
            "is_refunded": false, "is_standalone_payment": true, "is_voided": false,
            "order": { "id": 9 }, "owner": 1, "pending": false,
            "source_data": { "pan": "2346", "sub_type": "MasterCard", "type": "card" },
            "success": true
        });
        let fields = TransactionFields::from_object(&obj);
        assert_eq!(
            fields.signing_string(),
            "30002024-01-01T00:00:00AEDfalsefalse775truefalsefalsefalsetruefalse91false2346MasterCardcardtrue"
        );
    }
}
