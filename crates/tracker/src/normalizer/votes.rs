use chrono::{DateTime, NaiveDate, Utc};
use common::types::{ChainLog, RawEvent, RawItem};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use super::{
    normalize_batch, parse_explorer_timestamp, scale_token_amount, Normalized, SkipReason,
    TOKEN_DECIMALS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRecord {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub voting_power: Decimal,
    pub total_weight: Decimal,
    pub voter: String,
}

/// What a decoder pulled out of a `Voted` log. Amounts are already in token units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVote {
    pub weight: Decimal,
    pub total_weight: Decimal,
    pub voter: String,
    /// Unix seconds, when the event carries its own timestamp.
    pub timestamp: Option<i64>,
}

/// One strategy for reading a `Voted` log.
///
/// `Ok(None)` means "no weight found here, try the next decoder"; `Err` drops
/// the item outright.
pub trait VoteDecoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, log: &ChainLog) -> Result<Option<DecodedVote>, SkipReason>;
}

/// Reads the explorer's own ABI decoding (`decoded.parameters`).
pub struct DecodedParamsDecoder;

impl VoteDecoder for DecodedParamsDecoder {
    fn name(&self) -> &'static str {
        "decoded_params"
    }

    fn decode(&self, log: &ChainLog) -> Result<Option<DecodedVote>, SkipReason> {
        let Some(decoded) = &log.decoded else {
            return Ok(None);
        };

        let mut weight = None;
        let mut total_weight = Decimal::ZERO;
        let mut voter = "Unknown".to_string();
        let mut timestamp = None;

        for p in &decoded.parameters {
            let Some(value) = p.value.as_ref().and_then(value_text) else {
                continue;
            };
            match p.name.as_deref().unwrap_or_default() {
                "weight" => weight = Some(scale_token_amount(&value)?),
                "totalWeight" => total_weight = scale_token_amount(&value)?,
                "voter" => voter = value,
                "timestamp" => {
                    timestamp = Some(value.parse::<i64>().ok().ok_or(SkipReason::BadTimestamp)?);
                }
                _ => {}
            }
        }

        Ok(weight.map(|weight| DecodedVote {
            weight,
            total_weight,
            voter,
            timestamp,
        }))
    }
}

/// Reads the raw `data` field: three big-endian 32-byte words
/// (weight, totalWeight, timestamp). The voter is the low 20 bytes of topic 1.
pub struct HexDataDecoder;

const WORD_HEX_LEN: usize = 64;

impl VoteDecoder for HexDataDecoder {
    fn name(&self) -> &'static str {
        "hex_data"
    }

    fn decode(&self, log: &ChainLog) -> Result<Option<DecodedVote>, SkipReason> {
        let data = log.data.as_deref().unwrap_or_default();
        let data = data.strip_prefix("0x").unwrap_or(data);
        if data.len() < 3 * WORD_HEX_LEN {
            return Ok(None);
        }

        let weight = word_to_token_amount(word(data, 0)?)?;
        let total_weight = word_to_token_amount(word(data, 1)?)?;
        let timestamp = i64::try_from(word_to_u128(word(data, 2)?)?)
            .ok()
            .ok_or(SkipReason::MalformedData)?;

        let voter = log
            .topic(1)
            .and_then(|t| t.get(26..))
            .map_or_else(|| "Unknown".to_string(), |addr| format!("0x{addr}"));

        Ok(Some(DecodedVote {
            weight,
            total_weight,
            voter,
            timestamp: Some(timestamp),
        }))
    }
}

fn word(data: &str, idx: usize) -> Result<&str, SkipReason> {
    data.get(idx * WORD_HEX_LEN..(idx + 1) * WORD_HEX_LEN)
        .ok_or(SkipReason::MalformedData)
}

fn word_to_u128(word: &str) -> Result<u128, SkipReason> {
    let half = WORD_HEX_LEN / 2;
    let (Some(high), Some(low)) = (word.get(..half), word.get(half..)) else {
        return Err(SkipReason::MalformedData);
    };
    if !high.chars().all(|c| c == '0') {
        // Valid hex but beyond anything a real weight or timestamp reaches.
        return Err(SkipReason::MalformedData);
    }
    u128::from_str_radix(low, 16).ok().ok_or(SkipReason::MalformedData)
}

fn word_to_token_amount(word: &str) -> Result<Decimal, SkipReason> {
    let raw = i128::try_from(word_to_u128(word)?)
        .ok()
        .ok_or(SkipReason::MalformedData)?;
    Decimal::try_from_i128_with_scale(raw, TOKEN_DECIMALS)
        .map(|d| d.normalize())
        .ok()
        .ok_or(SkipReason::MalformedData)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turns `Voted` logs into [`VoteRecord`]s, trying decoders in priority order.
pub struct VoteNormalizer {
    voted_topic: String,
    decoders: Vec<Box<dyn VoteDecoder>>,
}

impl VoteNormalizer {
    /// Decoded parameters first, raw hex data as the fallback.
    pub fn new(voted_topic: &str) -> Self {
        Self::with_decoders(
            voted_topic,
            vec![Box::new(DecodedParamsDecoder), Box::new(HexDataDecoder)],
        )
    }

    pub fn with_decoders(voted_topic: &str, decoders: Vec<Box<dyn VoteDecoder>>) -> Self {
        Self {
            voted_topic: voted_topic.to_string(),
            decoders,
        }
    }

    pub fn normalize(&self, item: &RawItem) -> Result<VoteRecord, SkipReason> {
        match RawEvent::classify(item).ok().ok_or(SkipReason::Malformed)? {
            RawEvent::Log(log) => self.from_log(&log),
            RawEvent::Transfer(_) => Err(SkipReason::WrongShape),
        }
    }

    pub fn normalize_all(&self, items: &[RawItem]) -> Normalized<VoteRecord> {
        normalize_batch("vote", items, |item| self.normalize(item))
    }

    fn from_log(&self, log: &ChainLog) -> Result<VoteRecord, SkipReason> {
        match log.topic(0) {
            Some(t) if t.eq_ignore_ascii_case(&self.voted_topic) => {}
            _ => return Err(SkipReason::WrongTopic),
        }

        let vote = self.decode(log)?.ok_or(SkipReason::NoWeight)?;
        let timestamp = resolve_instant(&vote, log)?;
        if vote.weight <= Decimal::ZERO {
            return Err(SkipReason::NonPositiveWeight);
        }

        Ok(VoteRecord {
            date: timestamp.date_naive(),
            timestamp,
            voting_power: vote.weight,
            total_weight: vote.total_weight,
            voter: vote.voter,
        })
    }

    fn decode(&self, log: &ChainLog) -> Result<Option<DecodedVote>, SkipReason> {
        for decoder in &self.decoders {
            if let Some(vote) = decoder.decode(log)? {
                tracing::trace!(decoder = decoder.name(), "decoded vote");
                return Ok(Some(vote));
            }
        }
        Ok(None)
    }
}

/// The event's own timestamp (Unix seconds, UTC) when positive, else the
/// explorer's timestamp for the log.
fn resolve_instant(vote: &DecodedVote, log: &ChainLog) -> Result<DateTime<Utc>, SkipReason> {
    if let Some(secs) = vote.timestamp.filter(|s| *s > 0) {
        return DateTime::from_timestamp(secs, 0).ok_or(SkipReason::BadTimestamp);
    }
    let raw = log
        .timestamp
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| log.block_timestamp.as_deref().filter(|s| !s.is_empty()))
        .ok_or(SkipReason::MissingTimestamp)?;
    parse_explorer_timestamp(raw)
}
