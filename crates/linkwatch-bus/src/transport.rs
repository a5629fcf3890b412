use serde::Deserialize;

/// How update events travel from the scrapper to the bot.
///
/// Configured as `MESSAGE_TRANSPORT=HTTP|KAFKA`; `KAFKA` selects this
/// crate's record log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Transport {
  #[default]
  #[serde(rename = "HTTP", alias = "http")]
  Http,
  #[serde(rename = "KAFKA", alias = "kafka", alias = "BUS", alias = "bus")]
  Kafka,
}
