use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One item exactly as the explorer returned it.
///
/// Items are persisted verbatim so a reloaded store normalizes to the same
/// records as a fresh fetch. Field access goes through the typed views
/// ([`TokenTransfer`], [`ChainLog`]) rather than ad-hoc key lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(Map<String, Value>);

impl RawItem {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for RawItem {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Deduplication key: `{transaction}_{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(transaction: &str, index: &str) -> Self {
        Self(format!("{transaction}_{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a paginated explorer listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub next_page_params: Option<Map<String, Value>>,
}

/// Address details from `/addresses/{hash}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressDetails {
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub coin_balance: Option<String>,
}

/// Token transfer from `/addresses/{hash}/token-transfers`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTransfer {
    pub tx_hash: Option<String>,
    pub log_index: Option<Value>,
    pub timestamp: Option<String>,
    pub total: Option<TransferTotal>,
    pub from: Option<AddressRef>,
    pub to: Option<AddressRef>,
}

/// `total` is either `{ "value": "..", "decimals": ".." }` or a bare amount.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransferTotal {
    Object {
        #[serde(deserialize_with = "de_opt_string_any", default)]
        value: Option<String>,
    },
    Bare(#[serde(deserialize_with = "de_opt_string_any")] Option<String>),
}

impl TransferTotal {
    pub fn raw_value(&self) -> Option<&str> {
        match self {
            Self::Object { value } | Self::Bare(value) => value.as_deref(),
        }
    }
}

/// Address reference: either `{ "hash": "0x.." }` or a plain string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AddressRef {
    Object { hash: Option<String> },
    Plain(String),
}

impl AddressRef {
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Object { hash } => hash.as_deref(),
            Self::Plain(s) => Some(s.as_str()),
        }
    }
}

/// Contract log from `/addresses/{hash}/logs`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainLog {
    pub transaction_hash: Option<String>,
    pub index: Option<Value>,
    #[serde(default)]
    pub topics: Option<Vec<Option<String>>>,
    pub data: Option<String>,
    /// `None` when absent or not shaped like a decoding; the raw `data` still applies.
    #[serde(deserialize_with = "de_opt_lenient", default)]
    pub decoded: Option<DecodedLog>,
    pub timestamp: Option<String>,
    pub block_timestamp: Option<String>,
}

impl ChainLog {
    pub fn topic(&self, idx: usize) -> Option<&str> {
        self.topics.as_ref()?.get(idx)?.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodedLog {
    pub method_call: Option<String>,
    #[serde(default)]
    pub parameters: Vec<DecodedParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodedParam {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<Value>,
}

/// A raw item classified into one of the two shapes the explorer serves.
#[derive(Debug, Clone)]
pub enum RawEvent {
    Transfer(TokenTransfer),
    Log(ChainLog),
}

impl RawEvent {
    /// Log-shaped items carry `topics`; everything else is read as a transfer.
    pub fn classify(item: &RawItem) -> serde_json::Result<Self> {
        if item.get("topics").is_some() {
            Ok(Self::Log(serde_json::from_value(item.to_value())?))
        } else {
            Ok(Self::Transfer(serde_json::from_value(item.to_value())?))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transfer(_) => "transfer",
            Self::Log(_) => "log",
        }
    }
}

/// Deserialize an optional field, treating a value of the wrong shape as absent.
pub fn de_opt_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize a field that can be either a string or a number into Option<String>.
pub fn de_opt_string_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}
