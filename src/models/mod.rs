//! Wire models (DTOs) of the remote APIs.

#[allow(missing_docs)]
pub mod asserts;
pub mod frontend;

use serde::{Deserialize, Deserializer};

/// Deserialize `null` as the type's default value.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
