// Rankflow Infrastructure - HTTP Adapter
// Implements: WebhookClient

mod webhook_client;

pub use webhook_client::ReqwestWebhookClient;
