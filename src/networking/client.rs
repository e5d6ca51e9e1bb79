use super::{
    WakuRelayMessage,
    message::RawRelayMessage,
    topics::is_fees_topic,
};
use crate::{config::WakuConfig, constants::WAKU_MAX_RETRIES, error::WakuError};
use eyre::WrapErr;
use metrics::counter;
use reqwest::Method;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};
use url::Url;

/// Endpoints of the Waku REST bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakuRequestMethod {
    /// `GET /debug/v1/info`
    DebugInfo,
    /// `POST /relay/v1/subscriptions`
    PublishSubscription,
    /// `DELETE /relay/v1/subscriptions`
    DeleteSubscriptions,
    /// `POST /relay/v1/messages/{topic}`
    PublishMessage,
    /// `GET /relay/v1/messages/{topic}`
    GetMessages,
}

impl WakuRequestMethod {
    /// Path of the endpoint, without the pubsub topic.
    pub const fn path(&self) -> &'static str {
        match self {
            Self::DebugInfo => "/debug/v1/info",
            Self::PublishSubscription | Self::DeleteSubscriptions => "/relay/v1/subscriptions",
            Self::PublishMessage | Self::GetMessages => "/relay/v1/messages/",
        }
    }

    /// HTTP method of the endpoint.
    pub fn http_method(&self) -> Method {
        match self {
            Self::DebugInfo | Self::GetMessages => Method::GET,
            Self::PublishSubscription | Self::PublishMessage => Method::POST,
            Self::DeleteSubscriptions => Method::DELETE,
        }
    }

    /// Whether the pubsub topic is part of the path.
    const fn takes_topic(&self) -> bool {
        matches!(self, Self::PublishMessage | Self::GetMessages)
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::DebugInfo => "debug_info",
            Self::PublishSubscription => "subscribe",
            Self::DeleteSubscriptions => "unsubscribe",
            Self::PublishMessage => "publish",
            Self::GetMessages => "get_messages",
        }
    }
}

/// Body of every bridge response.
#[derive(Debug, Deserialize)]
pub struct WakuResponse<T> {
    /// Call result.
    pub result: Option<T>,
    /// Error reported by the node.
    pub error: Option<Value>,
}

impl<T> WakuResponse<T> {
    /// The node error as a message, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| match error.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugInfo {
    #[serde(default)]
    listen_addresses: Vec<String>,
}

/// Client of a Waku node's REST bridge with a primary and a backup endpoint.
///
/// The first attempt of a request goes to the primary endpoint and every retry to the backup.
#[derive(Debug, Clone)]
pub struct WakuApiClient {
    client: reqwest::Client,
    url: Url,
    url_backup: Url,
    request_timeout: Duration,
}

impl WakuApiClient {
    /// Creates a client from the bridge configuration.
    pub fn new(config: &WakuConfig) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.client_timeout)
            .build()
            .wrap_err("Failed to build waku http client")?;
        debug!(url = %config.url, backup = %config.url_backup, "Relaying via waku");
        Ok(Self {
            client,
            url: config.url.clone(),
            url_backup: config.url_backup.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Endpoint used for the given attempt.
    pub fn endpoint_for_attempt(&self, attempt: u32) -> &Url {
        if attempt == 0 { &self.url } else { &self.url_backup }
    }

    /// Sends a request starting at `attempt`, retrying on the backup endpoint until
    /// [`WAKU_MAX_RETRIES`] is reached.
    #[instrument(skip(self, params), fields(method = method.name()))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: WakuRequestMethod,
        topic: &str,
        params: Option<&Value>,
        attempt: u32,
    ) -> Result<WakuResponse<T>, WakuError> {
        let mut attempt = attempt;
        loop {
            match self.send(method, topic, params, attempt).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < WAKU_MAX_RETRIES => {
                    debug!(attempt, %err, "Waku request failed, retrying");
                    counter!("relayer_waku_retries_total", "method" => method.name()).increment(1);
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, %err, "Waku request failed");
                    counter!("relayer_waku_failures_total", "method" => method.name()).increment(1);
                    return Err(err);
                }
            }
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: WakuRequestMethod,
        topic: &str,
        params: Option<&Value>,
        attempt: u32,
    ) -> Result<WakuResponse<T>, WakuError> {
        let url = self.url_for(method, topic, attempt)?;
        trace!(%url, attempt, "Sending waku request");

        let mut request = self.client.request(method.http_method(), url);
        if let Some(params) = params {
            request = request.json(params);
        }

        let call = async {
            let body = request.send().await?.error_for_status()?.bytes().await?;
            serde_json::from_slice::<WakuResponse<T>>(&body)
                .map_err(|err| WakuError::Malformed(err.to_string()))
        };
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| WakuError::Timeout(self.request_timeout))?
    }

    fn url_for(
        &self,
        method: WakuRequestMethod,
        topic: &str,
        attempt: u32,
    ) -> Result<Url, WakuError> {
        let base = self.endpoint_for_attempt(attempt).as_str().trim_end_matches('/');
        let url = if method.takes_topic() {
            format!("{base}{}{}", method.path(), urlencoding::encode(topic))
        } else {
            format!("{base}{}", method.path())
        };
        Url::parse(&url).map_err(|err| WakuError::Malformed(format!("{url}: {err}")))
    }

    /// Listen addresses of the node. A node error is logged and yields no addresses.
    pub async fn debug_info(&self) -> Result<Vec<String>, WakuError> {
        let response =
            self.request::<DebugInfo>(WakuRequestMethod::DebugInfo, "", None, 0).await?;
        if let Some(info) = response.result {
            return Ok(info.listen_addresses);
        }
        if let Some(error) = response.error_message() {
            warn!(%error, "Waku debug info failed");
        }
        Ok(Vec::new())
    }

    /// Subscribes the node to `topics`.
    pub async fn subscribe(&self, topics: &[String]) -> Result<(), WakuError> {
        debug!(?topics, "Subscribing to topics");
        self.subscription(WakuRequestMethod::PublishSubscription, topics).await
    }

    /// Unsubscribes the node from `topics`.
    pub async fn unsubscribe(&self, topics: &[String]) -> Result<(), WakuError> {
        debug!(?topics, "Unsubscribing from topics");
        self.subscription(WakuRequestMethod::DeleteSubscriptions, topics).await
    }

    async fn subscription(
        &self,
        method: WakuRequestMethod,
        topics: &[String],
    ) -> Result<(), WakuError> {
        let response = self.request::<Value>(method, "", Some(&json!([topics])), 0).await?;
        match response.error_message() {
            Some(error) => Err(WakuError::Upstream(error)),
            None => Ok(()),
        }
    }

    /// Publishes `message` on the pubsub `topic`.
    ///
    /// Returns `false` without sending anything when the payload is empty. Fee broadcasts get a
    /// single attempt, on the backup endpoint.
    #[instrument(skip_all, fields(content_topic = %message.content_topic))]
    pub async fn publish(
        &self,
        message: &WakuRelayMessage,
        topic: &str,
    ) -> Result<bool, WakuError> {
        if message.payload.is_empty() {
            debug!("Tried to publish an empty message");
            return Ok(false);
        }

        let params = json!([RawRelayMessage::from(message)]);
        let attempt = if is_fees_topic(&message.content_topic) { WAKU_MAX_RETRIES } else { 0 };
        let response = self
            .request::<Value>(WakuRequestMethod::PublishMessage, topic, Some(&params), attempt)
            .await?;

        if let Some(error) = response.error_message() {
            return Err(WakuError::Upstream(error));
        }
        let result =
            response.result.ok_or_else(|| missing_result(WakuRequestMethod::PublishMessage))?;
        Ok(result != Value::Bool(false))
    }

    /// Messages received on `topic` since the last call.
    ///
    /// The node returns every message of the pubsub topic. When `content_topics` is not empty,
    /// only messages on one of those content topics are returned. Messages whose payload cannot
    /// be decoded are logged and dropped without affecting the rest of the batch.
    pub async fn get_messages(
        &self,
        topic: &str,
        content_topics: &[String],
    ) -> Result<Vec<WakuRelayMessage>, WakuError> {
        let response = self
            .request::<Vec<RawRelayMessage>>(WakuRequestMethod::GetMessages, topic, None, 0)
            .await?;
        if let Some(error) = response.error_message() {
            return Err(WakuError::Upstream(error));
        }

        let raw = response.result.ok_or_else(|| missing_result(WakuRequestMethod::GetMessages))?;

        Ok(raw
            .into_iter()
            .filter(|message| {
                content_topics.is_empty() || content_topics.contains(&message.content_topic)
            })
            .filter_map(|message| {
                let content_topic = message.content_topic.clone();
                WakuRelayMessage::try_from(message)
                    .inspect_err(|err| warn!(%content_topic, %err, "Dropping undecodable message"))
                    .ok()
            })
            .collect())
    }
}

fn missing_result(method: WakuRequestMethod) -> WakuError {
    WakuError::Malformed(format!("{} response has no result", method.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chains::NetworkChainId, constants::DEFAULT_PUBSUB_TOPIC, networking::topics};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    const MESSAGES_PATH: &str = "/relay/v1/messages/%2Fwaku%2F2%2Fdefault-waku%2Fproto";

    fn client(primary: &MockServer, backup: &MockServer) -> WakuApiClient {
        WakuApiClient::new(&WakuConfig {
            url: primary.uri().parse().unwrap(),
            url_backup: backup.uri().parse().unwrap(),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap()
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "result": result }))
    }

    #[tokio::test]
    async fn endpoint_depends_on_attempt() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        let client = client(&primary, &backup);
        assert_eq!(client.endpoint_for_attempt(0).as_str(), format!("{}/", primary.uri()));
        for attempt in 1..=WAKU_MAX_RETRIES {
            assert_eq!(client.endpoint_for_attempt(attempt).as_str(), format!("{}/", backup.uri()));
        }
    }

    #[tokio::test]
    async fn fails_over_to_backup() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("GET"))
            .and(path("/debug/v1/info"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .and(path("/debug/v1/info"))
            .respond_with(ok(json!({ "listenAddresses": ["/ip4/127.0.0.1/tcp/60000"] })))
            .expect(1)
            .mount(&backup)
            .await;

        let addresses = client(&primary, &backup).debug_info().await.unwrap();
        assert_eq!(addresses, vec!["/ip4/127.0.0.1/tcp/60000".to_string()]);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(u64::from(WAKU_MAX_RETRIES))
            .mount(&backup)
            .await;

        let err = client(&primary, &backup)
            .subscribe(&[topics::DEFAULT_CONTENT_TOPIC.to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, WakuError::Http(_)));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        for server in [&primary, &backup] {
            Mock::given(method("GET"))
                .respond_with(ok(json!([])).set_delay(Duration::from_secs(2)))
                .mount(server)
                .await;
        }

        let err =
            client(&primary, &backup).get_messages(DEFAULT_PUBSUB_TOPIC, &[]).await.unwrap_err();
        assert!(matches!(err, WakuError::Timeout(_)));
    }

    #[tokio::test]
    async fn publishes_base64_payload() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(body_json(json!([{
                "contentTopic": "/railgun/v1/1/transact-response/json",
                "payload": "aGVsbG8=",
                "timestamp": 42,
                "version": 0,
            }])))
            .respond_with(ok(json!(true)))
            .expect(1)
            .mount(&primary)
            .await;

        let message = WakuRelayMessage::new(
            topics::transact_response(NetworkChainId::Ethereum),
            b"hello".to_vec(),
        )
        .with_timestamp(42);
        assert!(client(&primary, &backup).publish(&message, DEFAULT_PUBSUB_TOPIC).await.unwrap());
    }

    #[tokio::test]
    async fn fee_broadcasts_get_one_backup_attempt() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("POST")).respond_with(ok(json!(true))).expect(0).mount(&primary).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&backup)
            .await;

        let message = WakuRelayMessage::new(topics::fees(NetworkChainId::Ethereum), b"{}".to_vec());
        let err =
            client(&primary, &backup).publish(&message, DEFAULT_PUBSUB_TOPIC).await.unwrap_err();
        assert!(matches!(err, WakuError::Http(_)));
    }

    #[tokio::test]
    async fn empty_payload_is_not_sent() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("POST")).respond_with(ok(json!(true))).expect(0).mount(&primary).await;

        let message = WakuRelayMessage::new(topics::DEFAULT_CONTENT_TOPIC, Vec::<u8>::new());
        assert!(!client(&primary, &backup).publish(&message, DEFAULT_PUBSUB_TOPIC).await.unwrap());
    }

    #[tokio::test]
    async fn filters_messages_by_content_topic() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("GET"))
            .and(path(MESSAGES_PATH))
            .respond_with(ok(json!([
                { "contentTopic": "abc", "payload": "", "timestamp": 123 },
                { "contentTopic": "def", "payload": "aGVsbG8=", "timestamp": 456, "version": 1 },
            ])))
            .mount(&primary)
            .await;
        let client = client(&primary, &backup);

        let messages =
            client.get_messages(DEFAULT_PUBSUB_TOPIC, &["abc".to_string()]).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, Some(123));
        assert_eq!(messages[0].version, 0);

        let messages = client.get_messages(DEFAULT_PUBSUB_TOPIC, &[]).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[1].payload[..], b"hello");
        assert_eq!(messages[1].version, 1);
    }

    #[tokio::test]
    async fn undecodable_payloads_do_not_drop_the_batch() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        Mock::given(method("GET"))
            .and(path(MESSAGES_PATH))
            .respond_with(ok(json!([
                { "contentTopic": "/railgun/v1/1/transact/json", "payload": "aGVsbG8=" },
                { "contentTopic": "/railgun/v1/1/transact/json", "payload": "!!!not-base64" },
                { "contentTopic": "/railgun/v1/1/transact/json", "payload": "d29ybGQ=" },
            ])))
            .mount(&primary)
            .await;

        let messages = client(&primary, &backup)
            .get_messages(DEFAULT_PUBSUB_TOPIC, &[topics::transact(NetworkChainId::Ethereum)])
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0].payload[..], b"hello");
        assert_eq!(&messages[1].payload[..], b"world");
    }

    #[tokio::test]
    async fn missing_result_is_malformed() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        for server in [&primary, &backup] {
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
                .mount(server)
                .await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
                .mount(server)
                .await;
        }
        let client = client(&primary, &backup);

        let err = client.get_messages(DEFAULT_PUBSUB_TOPIC, &[]).await.unwrap_err();
        assert!(matches!(err, WakuError::Malformed(_)));

        let message = WakuRelayMessage::new(topics::DEFAULT_CONTENT_TOPIC, b"hello".to_vec());
        let err = client.publish(&message, DEFAULT_PUBSUB_TOPIC).await.unwrap_err();
        assert!(matches!(err, WakuError::Malformed(_)));
    }

    #[tokio::test]
    async fn upstream_errors() {
        let (primary, backup) = (MockServer::start().await, MockServer::start().await);
        let error = ResponseTemplate::new(200)
            .set_body_json(json!({ "error": { "message": "not subscribed" } }));
        Mock::given(method("GET")).respond_with(error).mount(&primary).await;
        let client = client(&primary, &backup);

        // debug info swallows node errors
        assert!(client.debug_info().await.unwrap().is_empty());

        let err = client.get_messages(DEFAULT_PUBSUB_TOPIC, &[]).await.unwrap_err();
        assert!(matches!(err, WakuError::Upstream(message) if message == "not subscribed"));
    }
}
