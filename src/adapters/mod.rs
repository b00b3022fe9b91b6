pub mod api_errors;
pub mod checkout_routes;
pub mod events;
pub mod extract;
pub mod order_routes;
pub mod paymob_client;
pub mod paymob_webhook;
pub mod refund_routes;
pub mod router;
pub mod stripe_client;
pub mod stripe_webhook;
