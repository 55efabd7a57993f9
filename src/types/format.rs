//! Wire formats accepted and produced at the boundary.

/// Encoding of document payloads at the call boundary.
///
/// `Msgpack` doubles as the internal at-rest form: every stored value is
/// exactly one MessagePack document. The two patch variants are JSON text on
/// the wire but select RFC 6902 / RFC 7396 semantics on the write path; they
/// cannot be used to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Msgpack,
    Json,
    JsonPatch,
    JsonMergePatch,
    Bson,
    Cbor,
    Ubjson,
    Raw,
}

impl Format {
    /// The at-rest storage encoding.
    pub const INTERNAL: Format = Format::Msgpack;

    pub fn name(&self) -> &'static str {
        match self {
            Format::Msgpack => "messagepack",
            Format::Json => "json",
            Format::JsonPatch => "json-patch",
            Format::JsonMergePatch => "json-merge-patch",
            Format::Bson => "bson",
            Format::Cbor => "cbor",
            Format::Ubjson => "ubjson",
            Format::Raw => "raw",
        }
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, Format::JsonPatch | Format::JsonMergePatch)
    }
}
