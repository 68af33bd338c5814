//! Kafka implementation of the change source.

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message as KafkaMessage,
    Offset, TopicPartitionList,
};
use tracing::{debug, info};

use super::{ChangeMessage, ChangeSource};
use crate::config::KafkaSettings;
use crate::errors::ConsumerError;

/// Consumer group member reading the change topics.
pub struct KafkaChangeSource {
    consumer: StreamConsumer,
    topics: Vec<String>,
}

impl KafkaChangeSource {
    /// Create a new consumer.
    ///
    /// Auto-commit is disabled: offsets are committed explicitly once a
    /// message reached a terminal outcome. SASL over TLS is enabled when
    /// credentials are configured.
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaChangeSource)` - A new consumer instance
    /// * `Err(ConsumerError)` - If consumer creation fails
    pub fn new(settings: &KafkaSettings) -> Result<Self, ConsumerError> {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &settings.brokers)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &settings.auto_offset_reset)
            .set("session.timeout.ms", "6000");

        if let Some((username, password)) = settings.credentials() {
            config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| ConsumerError::kafka(e.to_string()))?;

        info!(
            brokers = %settings.brokers,
            group_id = %settings.group_id,
            sasl = settings.credentials().is_some(),
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer,
            topics: settings.topics.clone(),
        })
    }
}

#[async_trait]
impl ChangeSource for KafkaChangeSource {
    fn subscribe(&self) -> Result<(), ConsumerError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| ConsumerError::subscribe(e.to_string()))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    async fn next_message(&self) -> Option<Result<ChangeMessage, ConsumerError>> {
        let message = match self.consumer.recv().await {
            Ok(message) => message,
            Err(e) => return Some(Err(ConsumerError::from(e))),
        };

        debug!(
            topic = %message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            "Received message from Kafka"
        );

        Some(Ok(ChangeMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
        }))
    }

    fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumerError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
            .map_err(|e| ConsumerError::commit(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| ConsumerError::commit(e.to_string()))?;
        Ok(())
    }
}
