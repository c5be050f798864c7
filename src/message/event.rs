//! # Event Model
//!
//! An [`Event`] is one message in flight. It is immutable: every change
//! produces a new value, so a step can never observe another step's writes
//! except through the event it was handed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::constants::properties;

/// Whether the source expects a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExchangePattern {
    #[default]
    OneWay,
    RequestResponse,
}

impl ExchangePattern {
    pub fn has_response(&self) -> bool {
        matches!(self, Self::RequestResponse)
    }
}

impl fmt::Display for ExchangePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneWay => write!(f, "one_way"),
            Self::RequestResponse => write!(f, "request_response"),
        }
    }
}

/// Error information attached to an event handed to an error handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionPayload {
    pub message: String,
    /// Name of the step that raised the error, when known
    pub step: Option<String>,
}

impl ExceptionPayload {
    pub fn new(message: impl Into<String>, step: Option<String>) -> Self {
        Self {
            message: message.into(),
            step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    correlation_id: String,
    payload: Value,
    properties: HashMap<String, Value>,
    exchange_pattern: ExchangePattern,
    exception: Option<ExceptionPayload>,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Create a one-way event with a generated correlation id
    pub fn new(payload: Value) -> Self {
        Self::builder(payload).build()
    }

    pub fn builder(payload: Value) -> EventBuilder {
        EventBuilder {
            correlation_id: None,
            payload,
            properties: HashMap::new(),
            exchange_pattern: ExchangePattern::OneWay,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn exchange_pattern(&self) -> ExchangePattern {
        self.exchange_pattern
    }

    pub fn exception(&self) -> Option<&ExceptionPayload> {
        self.exception.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expected number of parts in this event's correlation group
    pub fn correlation_group_size(&self) -> Option<usize> {
        self.property(properties::CORRELATION_GROUP_SIZE)
            .and_then(Value::as_u64)
            .map(|size| size as usize)
    }

    pub fn correlation_sequence(&self) -> Option<usize> {
        self.property(properties::CORRELATION_SEQUENCE)
            .and_then(Value::as_u64)
            .map(|seq| seq as usize)
    }

    pub fn is_last_in_group(&self) -> bool {
        self.property(properties::CORRELATION_LAST)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }

    pub fn with_property(&self, name: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.properties.insert(name.into(), value);
        next
    }

    pub fn without_property(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.properties.remove(name);
        next
    }

    pub fn with_exception(&self, exception: ExceptionPayload) -> Self {
        Self {
            exception: Some(exception),
            ..self.clone()
        }
    }

    pub fn without_exception(&self) -> Self {
        Self {
            exception: None,
            ..self.clone()
        }
    }

    pub fn with_exchange_pattern(&self, exchange_pattern: ExchangePattern) -> Self {
        Self {
            exchange_pattern,
            ..self.clone()
        }
    }

    /// Copy this event into another correlation group, keeping everything else
    pub fn with_correlation_id(&self, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..self.clone()
        }
    }
}

/// Builder used by sources to assemble the initial event
#[derive(Debug)]
pub struct EventBuilder {
    correlation_id: Option<String>,
    payload: Value,
    properties: HashMap<String, Value>,
    exchange_pattern: ExchangePattern,
}

impl EventBuilder {
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn exchange_pattern(mut self, exchange_pattern: ExchangePattern) -> Self {
        self.exchange_pattern = exchange_pattern;
        self
    }

    /// Mark this event as part `sequence` of a group of `group_size`
    pub fn correlation_part(mut self, sequence: usize, group_size: usize) -> Self {
        self.properties.insert(
            properties::CORRELATION_SEQUENCE.to_string(),
            Value::from(sequence as u64),
        );
        self.properties.insert(
            properties::CORRELATION_GROUP_SIZE.to_string(),
            Value::from(group_size as u64),
        );
        self
    }

    /// Flag this event as the final part when the group size is not known
    pub fn last_part(mut self) -> Self {
        self.properties
            .insert(properties::CORRELATION_LAST.to_string(), Value::Bool(true));
        self
    }

    pub fn build(self) -> Event {
        Event {
            correlation_id: self
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            payload: self.payload,
            properties: self.properties,
            exchange_pattern: self.exchange_pattern,
            exception: None,
            created_at: Utc::now(),
        }
    }
}
