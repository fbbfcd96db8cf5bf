use std::collections::HashMap;

use serde_json::Value;

/// Bag of fields a normalizer didn't have a dedicated slot for.
///
/// Every IR type that wraps a wire format carries one of these so that
/// round-tripping through a *different* format doesn't silently lose
/// provider-specific fields we don't otherwise model. Flattened into the
/// containing struct on serialize/deserialize.
pub type Extra = HashMap<String, Value>;
