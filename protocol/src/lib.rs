//! Shared wire model and JSON codec for the canvas relay protocol.
//!
//! This crate owns the envelope vocabulary exchanged between canvas clients
//! and the relay. Every envelope is a JSON object tagged by a `"type"` field;
//! the four object actions travel unchanged in both directions, wrapped in
//! `ServerAction` on the way up and `ServerActionReported` on the way down.
//!
//! Decoding is lenient about *kinds* and strict about *shape*: an envelope
//! whose `"type"` this build does not know decodes to `Ok(None)` so newer
//! relays can add messages, while a known kind with broken fields is an error.
//! The same holds one level down: snapshot entries whose object variant is
//! unknown are skipped.
//!
//! Coordinates are reals in memory but go on the wire as integers whenever
//! they are whole, which is what integer-coordinate relays accept.

use std::fmt;

use base64::Engine;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Error returned by the decode and encode functions.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not JSON, or a known envelope kind failed schema decoding.
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload is JSON but carries no string `"type"` discriminator.
    #[error("envelope has no string `type` field")]
    MissingType,
}

// =============================================================================
// OBJECT MODEL
// =============================================================================

/// Opaque object identifier, generated by the client that creates the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh identifier backed by a random (v4) UUID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates can go on the wire.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Linear interpolation toward `to`; `t` is clamped to `[0, 1]`.
    #[must_use]
    pub fn lerp(self, to: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Position", 2)?;
        state.serialize_field("x", &Coordinate(self.x))?;
        state.serialize_field("y", &Coordinate(self.y))?;
        state.end()
    }
}

/// Largest magnitude below which every whole `f64` is an exact integer.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// One coordinate on the wire: an integer when whole, a real otherwise.
/// Non-finite values have no JSON form and fail to serialize.
struct Coordinate(f64);

impl Serialize for Coordinate {
    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if !value.is_finite() {
            return Err(serde::ser::Error::custom(format!("non-finite coordinate {value}")));
        }
        if value.trunc() == value && value.abs() < EXACT_INTEGER_LIMIT {
            serializer.serialize_i64(value as i64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

/// Text placed on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextObject {
    pub text: String,
}

/// Raster image placed on the canvas.
///
/// `url` is either a locator the renderer can fetch or an embedded
/// `data:` URL produced by [`ImageObject::embed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageObject {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl ImageObject {
    /// Build an image whose content travels inline as a base64 `data:` URL.
    #[must_use]
    pub fn embed(mime: &str, bytes: &[u8], width: u32, height: u32) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            url: format!("data:{mime};base64,{encoded}"),
            width,
            height,
        }
    }

    /// Whether the content is carried inline rather than by reference.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// The visual content of a canvas object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CanvasObject {
    Text(TextObject),
    Image(ImageObject),
}

impl CanvasObject {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextObject { text: text.into() })
    }

    /// Every `"type"` value this build understands.
    pub const KINDS: [&'static str; 2] = ["Text", "Image"];

    /// Variant name, as it appears in the `"type"` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "Text",
            Self::Image(_) => "Image",
        }
    }
}

/// An object and where it sits, as recorded by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedObject {
    pub position: Position,
    pub object: CanvasObject,
}

/// One element of an `Objects` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub id: ObjectId,
    pub object: PlacedObject,
}

// =============================================================================
// ACTIONS
// =============================================================================

/// A discrete mutation of the shared canvas. Identical in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Introduce a new object.
    CreateObject {
        id: ObjectId,
        object: CanvasObject,
        initial_position: Position,
    },
    /// Relocate an existing object. Unknown ids are ignored by receivers.
    MoveObject { id: ObjectId, position: Position },
    /// Delete one object. Unknown ids are ignored by receivers.
    RemoveObject { id: ObjectId },
    /// Delete every object.
    ClearObjects,
}

impl Action {
    /// The object this action targets, if it targets exactly one.
    #[must_use]
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::CreateObject { id, .. } | Self::MoveObject { id, .. } | Self::RemoveObject { id } => {
                Some(id)
            }
            Self::ClearObjects => None,
        }
    }
}

// =============================================================================
// ENVELOPES
// =============================================================================

/// Envelopes sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Authenticate { username: String, password: String },
    /// Report a locally applied action for the relay to order and rebroadcast.
    ServerAction { action: Action },
    /// Ask for a full `Objects` snapshot.
    RequestObjects,
}

impl ClientMessage {
    /// Every `"type"` value this build understands.
    pub const KINDS: [&'static str; 3] = ["Authenticate", "ServerAction", "RequestObjects"];

    /// Envelope name, as it appears in the `"type"` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "Authenticate",
            Self::ServerAction { .. } => "ServerAction",
            Self::RequestObjects => "RequestObjects",
        }
    }
}

/// Envelopes sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Authenticated,
    Error { message: String },
    /// An accepted action, rebroadcast to every participant.
    ServerActionReported { action: Action },
    /// Full snapshot of every live object.
    Objects {
        #[serde(deserialize_with = "known_entries")]
        objects: Vec<ObjectEntry>,
    },
}

impl ServerMessage {
    /// Every `"type"` value this build understands.
    pub const KINDS: [&'static str; 4] = ["Authenticated", "Error", "ServerActionReported", "Objects"];
}

/// Snapshot entries, minus those whose object variant this build does not
/// know. An entry of a known variant with broken fields still fails.
fn known_entries<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ObjectEntry>, D::Error> {
    let raw = Vec::<Value>::deserialize(deserializer)?;
    let mut entries = Vec::with_capacity(raw.len());
    for value in raw {
        let kind = value.pointer("/object/object/type").and_then(Value::as_str);
        if kind.is_some_and(|kind| !CanvasObject::KINDS.contains(&kind)) {
            continue;
        }
        entries.push(serde_json::from_value(value).map_err(serde::de::Error::custom)?);
    }
    Ok(entries)
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a client envelope as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_client(message: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Encode a relay envelope as a JSON text frame.
///
/// # Errors
///
/// See [`encode_client`].
pub fn encode_server(message: &ServerMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a client envelope. Unknown kinds decode to `Ok(None)`.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON or a known kind with
/// invalid fields, and [`CodecError::MissingType`] when there is no
/// discriminator to route on.
pub fn decode_client(text: &str) -> Result<Option<ClientMessage>, CodecError> {
    decode_known(text, &ClientMessage::KINDS)
}

/// Decode a relay envelope. Unknown kinds decode to `Ok(None)`.
///
/// # Errors
///
/// See [`decode_client`].
pub fn decode_server(text: &str) -> Result<Option<ServerMessage>, CodecError> {
    decode_known(text, &ServerMessage::KINDS)
}

fn decode_known<T>(text: &str, kinds: &[&str]) -> Result<Option<T>, CodecError>
where
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::from_str::<Value>(text)?;
    let known = kinds.contains(&envelope_kind(&value)?);
    if !known {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

fn envelope_kind(value: &Value) -> Result<&str, CodecError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
