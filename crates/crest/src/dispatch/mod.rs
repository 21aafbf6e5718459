//! Response dispatch: turning a [`Response`] into the method's declared return type.

use std::any::Any;

use crest_common::{ClientError, ConfigError};

use crate::response::{EntityStream, Response};

mod deserializer;
mod return_type;

pub use deserializer::{
    Deserializer, JsonDeserializer, MimeRegistry, TypeRegistry, XmlDeserializer,
};
pub use return_type::ReturnType;

/// Picks the deserializer for a response.
///
/// In order:
/// 1. [`EntityStream`] return types get the body untouched.
/// 2. The method's explicit deserializers that can read the response, as one composite:
///    the first success wins, and if all fail the last error surfaces.
/// 3. The [`TypeRegistry`], by return type.
/// 4. The [`MimeRegistry`], by response content type.
#[derive(Debug, Clone, Default)]
pub struct ResponseDispatcher {
    types: TypeRegistry,
    mimes: MimeRegistry,
}

impl ResponseDispatcher {
    /// Dispatcher over custom registries.
    pub fn new(types: TypeRegistry, mimes: MimeRegistry) -> Self {
        Self { types, mimes }
    }

    /// Decode `response` into its declared return type, boxed.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip_all,
            fields(return_type = response.return_type().name())
        )
    )]
    pub fn dispatch(&self, mut response: Response) -> Result<Box<dyn Any + Send>, ClientError> {
        let return_type = *response.return_type();
        if return_type.is::<EntityStream>() {
            return Ok(Box::new(response.entity_stream()?));
        }

        let body = response.take_entity()?;
        let charset = response.charset();
        let content_type = response.content_type();

        let mut last_error = None;
        for deserializer in response.request().config().deserializers() {
            if !deserializer.can_read(&return_type, content_type) {
                continue;
            }
            match deserializer.deserialize(&return_type, &body, charset) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "explicit deserializer failed");
                    last_error = Some(e);
                }
            }
        }
        if let Some(e) = last_error {
            return Err(e.into());
        }

        if let Some(value) = self.types.read(&return_type, &body, charset) {
            return Ok(value?);
        }

        if let Some(deserializer) = content_type.and_then(|ct| self.mimes.lookup(ct)) {
            return Ok(deserializer.deserialize(&return_type, &body, charset)?);
        }

        Err(ConfigError::NoDeserializer {
            type_name: return_type.name(),
            content_type: content_type.map(Into::into),
        }
        .into())
    }
}
